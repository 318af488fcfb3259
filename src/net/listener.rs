//! Bounded TCP acceptor.
//!
//! A connection slot is taken before `accept` is even called, so once
//! `max_connections` sockets are open new clients wait in the kernel
//! backlog instead of being accepted and starved.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::ListenerConfig;

#[derive(Debug)]
pub enum ListenerError {
    /// `bind_address` is not a socket address.
    Address { address: String, reason: String },
    Bind { address: SocketAddr, source: std::io::Error },
    Accept(std::io::Error),
    /// The slot pool was closed; no more connections will be admitted.
    Closed,
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Address { address, reason } => {
                write!(f, "invalid bind address '{address}': {reason}")
            }
            ListenerError::Bind { address, source } => write!(f, "cannot bind {address}: {source}"),
            ListenerError::Accept(e) => write!(f, "accept failed: {e}"),
            ListenerError::Closed => write!(f, "listener closed"),
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind { source, .. } => Some(source),
            ListenerError::Accept(e) => Some(e),
            _ => None,
        }
    }
}

/// One accepted socket together with the slot it occupies.
#[derive(Debug)]
pub struct Accepted {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    pub slot: ConnectionSlot,
}

pub struct Listener {
    socket: TcpListener,
    local_addr: SocketAddr,
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl Listener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self, ListenerError> {
        let address: SocketAddr = config
            .bind_address
            .parse()
            .map_err(|e: std::net::AddrParseError| ListenerError::Address {
                address: config.bind_address.clone(),
                reason: e.to_string(),
            })?;

        let socket = TcpListener::bind(address)
            .await
            .map_err(|source| ListenerError::Bind { address, source })?;
        let local_addr = socket
            .local_addr()
            .map_err(|source| ListenerError::Bind { address, source })?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listening"
        );

        Ok(Self {
            socket,
            local_addr,
            slots: Arc::new(Semaphore::new(config.max_connections)),
            capacity: config.max_connections,
        })
    }

    /// Wait for a free slot, then for a client.
    pub async fn accept(&self) -> Result<Accepted, ListenerError> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, peer) = self.socket.accept().await.map_err(ListenerError::Accept)?;
        tracing::debug!(peer = %peer, free_slots = self.slots.available_permits(), "Accepted");

        Ok(Accepted {
            stream,
            peer,
            slot: ConnectionSlot { _permit: permit },
        })
    }

    /// The bound address; the real port when configured with `:0`.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn free_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Held by a connection task; dropping it frees the slot.
#[derive(Debug)]
pub struct ConnectionSlot {
    _permit: OwnedSemaphorePermit,
}
