//! jaws: a small HTTP/1.1 application server.
//!
//! Requests flow from the bounded listener through a per-connection task,
//! an ordered middleware chain and the router, to a handler, a static file
//! or a template page rendered from the document root.

pub mod auth;
pub mod config;
pub mod controllers;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod persistence;
pub mod routing;
pub mod security;
pub mod template;

pub use config::ServerConfig;
pub use controllers::Controller;
pub use http::HttpServer;
pub use lifecycle::{Application, Shutdown};
