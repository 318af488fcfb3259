//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection (net::Listener)
//!     → server.rs (connection task, deadlines, keep-alive)
//!     → parser.rs (request line, headers, Content-Length body)
//!     → dispatch.rs (middleware chain → router → handler or static file)
//!     → response.rs (defaults, serialization, file streaming)
//!     → back to the client
//! ```

pub mod api;
pub mod dispatch;
pub mod error;
pub mod middleware;
pub mod parser;
pub mod request;
pub mod response;
pub mod server;
pub mod state;

pub use api::{api_error, ApiResponse};
pub use dispatch::Pipeline;
pub use error::{HandlerError, ParseError};
pub use middleware::{Middleware, MiddlewareChain, Next, Outcome};
pub use parser::ParseLimits;
pub use request::{BodyFormat, HttpRequest, RequestId, X_REQUEST_ID};
pub use response::{Body, HttpResponse};
pub use server::{ConnectionSettings, HttpServer};
pub use state::{AppState, BASE_TEMPLATE};
