//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (segment-by-segment pattern match)
//!     → Return: Found(route, params) | MethodNotAllowed | NotFound
//!
//! NotFound on GET/HEAD:
//!     → static_files.rs (document root lookup)
//!
//! Route Compilation (at startup):
//!     Route[] from controllers
//!     → Validate and compile patterns, reject duplicates
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (literal and `:name` segments only)
//! - Deterministic: fewest parameters wins, then first registered
//! - Dynamic routes are always consulted before static files

pub mod matcher;
pub mod router;
pub mod static_files;

pub use matcher::{PathParams, PathPattern};
pub use router::{Access, ContentType, Handler, Route, RouteError, RouteMatch, RouteTable, RouteTableBuilder};
pub use static_files::{StaticFile, StaticFiles};
