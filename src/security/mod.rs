//! Security middleware.
//!
//! # Data Flow
//! ```text
//! Incoming request (after logging):
//!     → rate_limit.rs (fixed window per client IP, 429 when exhausted)
//!     → cors (http::middleware)
//!     → session.rs (resolve token, attach Session)
//!     → validation (http::middleware)
//!     → Router (access check reads the Session)
//! ```
//!
//! # Design Decisions
//! - Rate limiting runs before any token work
//! - Session attachment never rejects; only routes marked as requiring a
//!   session answer 401

pub mod rate_limit;
pub mod session;

pub use rate_limit::{Decision, RateLimiter};
pub use session::SessionMiddleware;
