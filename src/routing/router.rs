//! Route table and lookup.
//!
//! # Responsibilities
//! - Hold the (verb, pattern) → handler bindings registered at startup
//! - Reject duplicate and malformed registrations
//! - Resolve a request to a route, a 405 (path known, verb not) or a 404
//!
//! # Design Decisions
//! - The table is frozen after `build()`; lookups take `&self` only
//! - Precedence: fewest parameter segments wins, then first registered
//! - `HEAD` falls back to the `GET` route for the same path

use std::fmt;
use std::sync::Arc;

use http::Method;

use crate::http::error::HandlerError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::http::state::AppState;
use crate::routing::matcher::{split_path, PathParams, PathPattern};

/// Errors raised while building the route table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("duplicate route {method} {pattern}")]
    Duplicate { method: Method, pattern: String },
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Who may call a route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Access {
    #[default]
    Public,
    /// A valid session must be attached to the request.
    Session,
}

/// What a route answers with; also decides how errors are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Html,
    Json,
}

/// Route handler signature.
pub type Handler =
    Arc<dyn Fn(&HttpRequest, &AppState) -> Result<HttpResponse, HandlerError> + Send + Sync>;

/// A route declaration: verb, pattern, access flag, content type and handler.
#[derive(Clone)]
pub struct Route {
    method: Method,
    pattern: String,
    access: Access,
    content_type: ContentType,
    handler: Handler,
}

impl Route {
    pub fn new<F>(method: Method, pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&HttpRequest, &AppState) -> Result<HttpResponse, HandlerError> + Send + Sync + 'static,
    {
        Self {
            method,
            pattern: pattern.into(),
            access: Access::Public,
            content_type: ContentType::Html,
            handler: Arc::new(handler),
        }
    }

    pub fn get<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&HttpRequest, &AppState) -> Result<HttpResponse, HandlerError> + Send + Sync + 'static,
    {
        Self::new(Method::GET, pattern, handler)
    }

    pub fn post<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&HttpRequest, &AppState) -> Result<HttpResponse, HandlerError> + Send + Sync + 'static,
    {
        Self::new(Method::POST, pattern, handler)
    }

    pub fn put<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&HttpRequest, &AppState) -> Result<HttpResponse, HandlerError> + Send + Sync + 'static,
    {
        Self::new(Method::PUT, pattern, handler)
    }

    pub fn delete<F>(pattern: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&HttpRequest, &AppState) -> Result<HttpResponse, HandlerError> + Send + Sync + 'static,
    {
        Self::new(Method::DELETE, pattern, handler)
    }

    /// Require a valid session.
    pub fn requires_session(mut self) -> Self {
        self.access = Access::Session;
        self
    }

    /// Declare a JSON route.
    pub fn json(mut self) -> Self {
        self.content_type = ContentType::Json;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn access(&self) -> Access {
        self.access
    }

    pub fn content_type(&self) -> ContentType {
        self.content_type
    }

    pub fn call(&self, request: &HttpRequest, state: &AppState) -> Result<HttpResponse, HandlerError> {
        (self.handler)(request, state)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("access", &self.access)
            .field("content_type", &self.content_type)
            .finish()
    }
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    route: Route,
    pattern: PathPattern,
}

/// Result of a table lookup.
#[derive(Debug)]
pub enum RouteMatch<'a> {
    Found { route: &'a Route, params: PathParams },
    /// The path exists but not for this verb.
    MethodNotAllowed { allowed: Vec<Method> },
    NotFound,
}

/// Collects routes before the table is frozen.
#[derive(Debug, Default)]
pub struct RouteTableBuilder {
    routes: Vec<CompiledRoute>,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one route.
    pub fn route(&mut self, route: Route) -> Result<&mut Self, RouteError> {
        let pattern = PathPattern::parse(route.pattern())?;
        let normalized = pattern.normalized();

        if self
            .routes
            .iter()
            .any(|c| c.route.method == route.method && c.pattern.normalized() == normalized)
        {
            return Err(RouteError::Duplicate {
                method: route.method.clone(),
                pattern: route.pattern.clone(),
            });
        }

        tracing::debug!(
            method = %route.method,
            pattern = %route.pattern,
            access = ?route.access,
            content_type = ?route.content_type,
            "Route registered"
        );
        self.routes.push(CompiledRoute { route, pattern });
        Ok(self)
    }

    /// Register several routes in order.
    pub fn routes(&mut self, routes: impl IntoIterator<Item = Route>) -> Result<&mut Self, RouteError> {
        for route in routes {
            self.route(route)?;
        }
        Ok(self)
    }

    pub fn build(self) -> RouteTable {
        tracing::info!(routes = self.routes.len(), "Route table built");
        RouteTable {
            routes: self.routes,
        }
    }
}

/// Immutable route table.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: Vec<CompiledRoute>,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter().map(|c| &c.route)
    }

    /// Find the route for `method` and `path`.
    pub fn lookup(&self, method: &Method, path: &str) -> RouteMatch<'_> {
        let segments = split_path(path);

        let mut best: Option<(&CompiledRoute, PathParams)> = None;
        let mut head_fallback: Option<(&CompiledRoute, PathParams)> = None;
        let mut allowed: Vec<Method> = Vec::new();

        for compiled in &self.routes {
            let Some(params) = compiled.pattern.matches(&segments) else {
                continue;
            };
            if !allowed.contains(&compiled.route.method) {
                allowed.push(compiled.route.method.clone());
            }

            let slot = if compiled.route.method == *method {
                &mut best
            } else if *method == Method::HEAD && compiled.route.method == Method::GET {
                &mut head_fallback
            } else {
                continue;
            };

            // Strictly fewer parameters replaces; ties keep the earlier route.
            let better = slot
                .as_ref()
                .map_or(true, |(current, _)| compiled.pattern.param_count() < current.pattern.param_count());
            if better {
                *slot = Some((compiled, params));
            }
        }

        // GET routes also answer HEAD.
        if let Some(get) = allowed.iter().position(|m| *m == Method::GET) {
            if !allowed.contains(&Method::HEAD) {
                allowed.insert(get + 1, Method::HEAD);
            }
        }

        match best.or(head_fallback) {
            Some((compiled, params)) => RouteMatch::Found {
                route: &compiled.route,
                params,
            },
            None if !allowed.is_empty() => RouteMatch::MethodNotAllowed { allowed },
            None => RouteMatch::NotFound,
        }
    }
}
