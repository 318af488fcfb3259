//! Connection handling.
//!
//! # Responsibilities
//! - Accept connections from the bounded listener until shutdown
//! - Run one task per connection: parse, dispatch, write, repeat
//! - Apply the idle, request and write deadlines
//! - Keep every connection counted from accept until its task ends
//!
//! # Design Decisions
//! - The idle deadline covers only the wait for the next request line;
//!   headers and body fall under the request deadline
//! - Dispatch is synchronous and runs on the blocking pool
//! - A malformed request gets a minimal response and the connection closes

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::{Method, StatusCode};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::http::dispatch::Pipeline;
use crate::http::parser::{read_request, read_request_line, ParseLimits};
use crate::http::response::HttpResponse;
use crate::net::{Accepted, ConnectionTracker, Listener};

/// Pause after a failed accept before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Per-connection deadlines and parse limits.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub idle_timeout: Duration,
    pub request_timeout: Duration,
    pub write_timeout: Duration,
    pub limits: ParseLimits,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self::from(&ServerConfig::default())
    }
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            idle_timeout: config.timeouts.idle(),
            request_timeout: config.timeouts.request(),
            write_timeout: config.timeouts.write(),
            limits: ParseLimits::from(&config.limits),
        }
    }
}

/// Why a connection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closed {
    PeerClosed,
    Idle,
    Shutdown,
    ClientError,
    NotKeepAlive,
    WriteFailed,
}

/// Accept loop feeding connection tasks.
pub struct HttpServer {
    pipeline: Arc<Pipeline>,
    settings: ConnectionSettings,
    connections: ConnectionTracker,
}

impl HttpServer {
    pub fn new(pipeline: Arc<Pipeline>, settings: ConnectionSettings) -> Self {
        let connections = pipeline.state().connections().clone();
        Self {
            pipeline,
            settings,
            connections,
        }
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    /// Accept until `shutdown` fires. In-flight connections keep running;
    /// the caller decides how long to wait for them.
    pub async fn run(self, listener: Listener, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let accepted = tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("Listener stopped accepting");
                    break;
                }
                accepted = listener.accept() => accepted,
            };

            let Accepted { stream, peer, slot } = match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                tracing::debug!(peer = %peer, error = %e, "Could not set TCP_NODELAY");
            }

            let pipeline = Arc::clone(&self.pipeline);
            let settings = self.settings.clone();
            let guard = self.connections.track();
            let stop = shutdown.resubscribe();
            tokio::spawn(async move {
                let _slot = slot;
                let connection_id = guard.id();
                let closed = serve_connection(stream, Some(peer), pipeline, &settings, stop).await;
                tracing::debug!(connection_id = %connection_id, peer = %peer, reason = ?closed, "Connection finished");
                drop(guard);
            });
        }
    }
}

/// Serve requests on one connection until it should close.
async fn serve_connection<S>(
    stream: S,
    peer: Option<SocketAddr>,
    pipeline: Arc<Pipeline>,
    settings: &ConnectionSettings,
    mut shutdown: broadcast::Receiver<()>,
) -> Closed
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let closed = loop {
        let line = tokio::select! {
            _ = shutdown.recv() => break Closed::Shutdown,
            line = tokio::time::timeout(
                settings.idle_timeout,
                read_request_line(&mut reader, &settings.limits),
            ) => line,
        };

        let line = match line {
            Err(_) => break Closed::Idle,
            Ok(Ok(None)) => break Closed::PeerClosed,
            Ok(Ok(Some(line))) => line,
            Ok(Err(e)) => {
                reject(&mut writer, e.status(), &e, settings.write_timeout).await;
                break Closed::ClientError;
            }
        };

        let request = match tokio::time::timeout(
            settings.request_timeout,
            read_request(&mut reader, line, &settings.limits, peer),
        )
        .await
        {
            Ok(Ok(request)) => request,
            Ok(Err(e)) => {
                reject(&mut writer, e.status(), &e, settings.write_timeout).await;
                break Closed::ClientError;
            }
            Err(_) => {
                tracing::debug!(peer = ?peer, "Request not received in time");
                let response = HttpResponse::text(StatusCode::REQUEST_TIMEOUT, "Request Timeout");
                let _ = write_response(&mut writer, response, false, false, settings.write_timeout).await;
                break Closed::ClientError;
            }
        };

        let head_only = *request.method() == Method::HEAD;
        let client_keep_alive = request.wants_keep_alive();

        let worker = Arc::clone(&pipeline);
        let response = match tokio::task::spawn_blocking(move || worker.dispatch(request)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(error = %e, "Dispatch task failed");
                HttpResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        };

        let keep_alive = client_keep_alive && !response.wants_close();
        if !write_response(&mut writer, response, keep_alive, head_only, settings.write_timeout).await {
            break Closed::WriteFailed;
        }
        if !keep_alive {
            break Closed::NotKeepAlive;
        }
    };

    let _ = writer.shutdown().await;
    closed
}

/// Answer a request that could not be parsed, if the socket still works.
async fn reject<W>(
    writer: &mut W,
    status: Option<StatusCode>,
    error: &crate::http::error::ParseError,
    write_timeout: Duration,
) where
    W: AsyncWrite + Unpin,
{
    tracing::debug!(error = %error, "Rejecting malformed request");
    if let Some(status) = status {
        let reason = status.canonical_reason().unwrap_or("Bad Request");
        let response = HttpResponse::text(status, reason).close_connection();
        write_response(writer, response, false, false, write_timeout).await;
    }
}

async fn write_response<W>(
    writer: &mut W,
    response: HttpResponse,
    keep_alive: bool,
    head_only: bool,
    write_timeout: Duration,
) -> bool
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        response.write_to(writer, keep_alive, head_only).await?;
        writer.flush().await
    };
    match tokio::time::timeout(write_timeout, written).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Response write failed");
            false
        }
        Err(_) => {
            tracing::debug!("Response write timed out");
            false
        }
    }
}
