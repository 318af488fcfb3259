//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Bind listener → Build state, routes, middleware
//!     → Start document watcher and housekeeping → Accept
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Close idle connections
//!     → Drain in-flight requests (bounded) → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{default_middleware, Application, StartupError};
