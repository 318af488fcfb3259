//! Route declarations.
//!
//! A controller is a group of routes registered together. The bundled
//! controllers serve the site pages, a small JSON API and a todo list
//! backed by the attached database. Applications embedding the library
//! add their own.

pub mod api;
pub mod site;
pub mod todo;

use crate::routing::{Route, RouteError, RouteTable};

pub use api::ApiController;
pub use site::SiteController;
pub use todo::TodoController;

/// Cookie carrying the access token for browser sessions.
pub const AUTH_COOKIE: &str = "auth_token";

pub trait Controller: Send + Sync {
    /// Routes in registration order.
    fn routes(&self) -> Vec<Route>;
}

/// The controllers shipped with the server binary.
pub fn default_controllers() -> Vec<Box<dyn Controller>> {
    vec![Box::new(SiteController), Box::new(ApiController), Box::new(TodoController)]
}

/// Build one route table from `controllers`, in order.
pub fn route_table(controllers: &[Box<dyn Controller>]) -> Result<RouteTable, RouteError> {
    let mut builder = RouteTable::builder();
    for controller in controllers {
        builder.routes(controller.routes())?;
    }
    Ok(builder.build())
}
