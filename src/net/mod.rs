//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (bounded accept: a slot is taken before each accept)
//!     → connection.rs (connection id, live-connection guard)
//!     → Hand off to HTTP layer (one task per connection)
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection is counted from accept until its task ends

pub mod connection;
pub mod listener;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
pub use listener::{Accepted, ConnectionSlot, Listener, ListenerError};
