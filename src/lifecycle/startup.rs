//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Bind the listener before anything reports the port
//! - Build shared state, the route table and the middleware chain
//! - Start background work (document watcher, token housekeeping)
//! - Accept until shutdown, then drain
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The listener binds first so an ephemeral port (`:0`) is known to
//!   templates and the status API

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::validation::validate_config;
use crate::config::{ConfigError, ServerConfig};
use crate::controllers::{route_table, Controller};
use crate::http::dispatch::Pipeline;
use crate::http::middleware::{Cors, MiddlewareChain, RequestLogger, RequestValidation};
use crate::http::server::{ConnectionSettings, HttpServer};
use crate::http::state::AppState;
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::persistence::{Database, PersistenceError};
use crate::routing::{RouteError, RouteTable};
use crate::security::{RateLimiter, SessionMiddleware};
use crate::template::DocumentWatcher;

/// How long in-flight requests get to finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between expired-token purges.
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("listener: {0}")]
    Listener(#[from] ListenerError),
    #[error("routes: {0}")]
    Route(#[from] RouteError),
    #[error("database: {0}")]
    Database(#[from] PersistenceError),
}

/// The built-in middleware in their default order.
pub fn default_middleware(config: &ServerConfig, state: &AppState) -> MiddlewareChain {
    let mut chain = MiddlewareChain::new();
    chain.register("logging", 1, RequestLogger);
    if config.rate_limit.enabled {
        chain.register("rate_limit", 2, RateLimiter::from_config(&config.rate_limit));
    }
    if config.cors.enabled {
        chain.register("cors", 3, Cors::new(&config.cors));
    }
    chain.register("session", 4, SessionMiddleware::new(Arc::new(state.tokens().clone())));
    chain.register("validation", 5, RequestValidation);
    chain
}

/// A bound, fully wired server that has not started accepting yet.
pub struct Application {
    listener: Listener,
    local_addr: SocketAddr,
    pipeline: Arc<Pipeline>,
    settings: ConnectionSettings,
    shutdown: Shutdown,
    // Subscribed at bind time so a trigger sent before `run` is first
    // polled is still delivered.
    stop_accepting: broadcast::Receiver<()>,
    stop_housekeeping: broadcast::Receiver<()>,
}

impl Application {
    /// Bind with `controllers` and the default middleware.
    pub async fn bind(config: ServerConfig, controllers: &[Box<dyn Controller>]) -> Result<Self, StartupError> {
        let routes = route_table(controllers)?;
        Self::bind_with(config, routes, default_middleware).await
    }

    /// Bind with an explicit route table and middleware factory.
    pub async fn bind_with<F>(mut config: ServerConfig, routes: RouteTable, middleware: F) -> Result<Self, StartupError>
    where
        F: FnOnce(&ServerConfig, &AppState) -> MiddlewareChain,
    {
        validate_config(&config).map_err(ConfigError::Validation)?;

        let listener = Listener::bind(&config.listener).await?;
        let local_addr = listener.local_addr();
        config.listener.bind_address = local_addr.to_string();

        let settings = ConnectionSettings::from(&config);
        let state = AppState::from_config(config, ConnectionTracker::new());
        let chain = middleware(state.config(), &state);

        tracing::info!(
            address = %local_addr,
            routes = routes.len(),
            middleware = ?chain.names(),
            document_root = %state.config().documents.root.display(),
            "Application ready"
        );

        let shutdown = Shutdown::new();
        Ok(Self {
            listener,
            local_addr,
            pipeline: Arc::new(Pipeline::new(chain, routes, Arc::new(state))),
            settings,
            stop_accepting: shutdown.subscribe(),
            stop_housekeeping: shutdown.subscribe(),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connections(&self) -> ConnectionTracker {
        self.pipeline.state().connections().clone()
    }

    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(self.pipeline.state())
    }

    /// Open the persistence backend at `persistence.database_path` and
    /// hand it to the handlers.
    pub fn open_database<D, F>(&self, open: F) -> Result<(), StartupError>
    where
        D: Database + 'static,
        F: FnOnce(&Path) -> Result<D, PersistenceError>,
    {
        let state = self.pipeline.state();
        let path = &state.config().persistence.database_path;
        let database = open(path)?;
        if !state.attach_database(Arc::new(database)) {
            return Err(PersistenceError::Unavailable("a database is already attached".into()).into());
        }
        tracing::info!(path = %path.display(), "Database attached");
        Ok(())
    }

    /// Handle used to stop [`run`](Self::run).
    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Serve until shutdown is triggered, then wait (bounded) for
    /// in-flight connections.
    pub async fn run(self) {
        let state = Arc::clone(self.pipeline.state());

        let _watcher = if state.config().documents.watch {
            match DocumentWatcher::new(state.templates().cache().clone()).run() {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Document watcher unavailable, cache will not refresh");
                    None
                }
            }
        } else {
            None
        };

        let housekeeping = tokio::spawn(housekeeping(Arc::clone(&state), self.stop_housekeeping));

        let connections = state.connections().clone();
        let server = HttpServer::new(self.pipeline, self.settings);
        server.run(self.listener, self.stop_accepting).await;

        if connections.wait_for_idle(DRAIN_TIMEOUT).await {
            tracing::info!("All connections drained");
        } else {
            tracing::warn!(remaining = connections.active_count(), "Drain deadline passed");
        }
        housekeeping.abort();
    }
}

async fn housekeeping(state: Arc<AppState>, mut shutdown: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(HOUSEKEEPING_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            _ = ticker.tick() => {
                let purged = state.tokens().purge_expired();
                if purged > 0 {
                    tracing::debug!(purged, "Expired tokens purged");
                }
            }
        }
    }
}
