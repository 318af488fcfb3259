//! Ordered middleware chain.
//!
//! # Data Flow
//! ```text
//! request
//!     → entry[0] (lowest priority value)
//!         → entry[1]
//!             → ...
//!                 → endpoint (router + handler)
//!             ← response
//!         ← response (may add headers)
//!     ← response
//! ```
//!
//! Each entry either calls [`Next::run`] to continue, returns a response of
//! its own to short-circuit, or attaches context to the request's
//! extensions before continuing.
//!
//! # Design Decisions
//! - Entries are sorted by priority on registration; the sort is stable,
//!   so equal priorities keep registration order
//! - The chain is built once and only read afterwards
//! - Errors returned from a middleware are handled exactly like handler errors

pub mod cors;
pub mod logging;
pub mod validation;

use std::fmt;
use std::sync::Arc;

use crate::http::error::HandlerError;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;

pub use cors::Cors;
pub use logging::RequestLogger;
pub use validation::RequestValidation;

/// What every stage of the pipeline produces.
pub type Outcome = Result<HttpResponse, HandlerError>;

/// A request interceptor.
pub trait Middleware: Send + Sync {
    fn handle(&self, request: &mut HttpRequest, next: Next<'_>) -> Outcome;
}

/// Wrap a closure as a [`Middleware`].
pub fn from_fn<F>(f: F) -> FnMiddleware<F>
where
    F: Fn(&mut HttpRequest, Next<'_>) -> Outcome + Send + Sync,
{
    FnMiddleware(f)
}

/// Middleware backed by a closure, see [`from_fn`].
pub struct FnMiddleware<F>(F);

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut HttpRequest, Next<'_>) -> Outcome + Send + Sync,
{
    fn handle(&self, request: &mut HttpRequest, next: Next<'_>) -> Outcome {
        (self.0)(request, next)
    }
}

impl<M> Middleware for Arc<M>
where
    M: Middleware + ?Sized,
{
    fn handle(&self, request: &mut HttpRequest, next: Next<'_>) -> Outcome {
        (**self).handle(request, next)
    }
}

/// A named, prioritized middleware.
#[derive(Clone)]
pub struct MiddlewareEntry {
    name: String,
    priority: i32,
    middleware: Arc<dyn Middleware>,
}

impl MiddlewareEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

impl fmt::Debug for MiddlewareEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareEntry")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// The ordered sequence of middleware wrapped around the endpoint.
#[derive(Clone, Default, Debug)]
pub struct MiddlewareChain {
    entries: Vec<MiddlewareEntry>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `middleware`; lower `priority` runs first.
    pub fn register<M>(&mut self, name: impl Into<String>, priority: i32, middleware: M) -> &mut Self
    where
        M: Middleware + 'static,
    {
        let name = name.into();
        tracing::debug!(middleware = %name, priority, "Registering middleware");
        self.entries.push(MiddlewareEntry {
            name,
            priority,
            middleware: Arc::new(middleware),
        });
        self.entries.sort_by_key(|entry| entry.priority);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<M>(mut self, name: impl Into<String>, priority: i32, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.register(name, priority, middleware);
        self
    }

    pub fn entries(&self) -> &[MiddlewareEntry] {
        &self.entries
    }

    /// Entry names in execution order.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the chain around `endpoint`.
    pub fn run(&self, request: &mut HttpRequest, endpoint: &dyn Fn(&mut HttpRequest) -> Outcome) -> Outcome {
        Next {
            remaining: &self.entries,
            endpoint,
        }
        .run(request)
    }
}

/// The rest of the chain, handed to each middleware.
pub struct Next<'a> {
    remaining: &'a [MiddlewareEntry],
    endpoint: &'a dyn Fn(&mut HttpRequest) -> Outcome,
}

impl Next<'_> {
    /// Continue with the next entry, or the endpoint when none are left.
    pub fn run(self, request: &mut HttpRequest) -> Outcome {
        match self.remaining.split_first() {
            Some((entry, rest)) => {
                tracing::trace!(middleware = %entry.name, "Entering middleware");
                entry.middleware.handle(
                    request,
                    Next {
                        remaining: rest,
                        endpoint: self.endpoint,
                    },
                )
            }
            None => (self.endpoint)(request),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{Method, StatusCode};
    use std::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    struct Marker(u32);

    fn attach_marker() -> impl Middleware {
        from_fn(|req, next| {
            req.extensions_mut().insert(Marker(1));
            next.run(req)
        })
    }

    fn read_marker(seen: Arc<Mutex<Vec<Option<u32>>>>) -> impl Middleware {
        from_fn(move |req, next| {
            let value = req.extensions().get::<Marker>().map(|m| m.0);
            seen.lock().unwrap().push(value);
            next.run(req)
        })
    }

    fn ok_endpoint(_: &mut HttpRequest) -> Outcome {
        Ok(HttpResponse::text(StatusCode::OK, "endpoint"))
    }

    fn request() -> HttpRequest {
        HttpRequest::builder(Method::GET, "/").build()
    }

    #[test]
    fn test_priority_orders_execution() {
        for reversed in [false, true] {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let mut chain = MiddlewareChain::new();
            if reversed {
                chain.register("reader", 2, read_marker(seen.clone()));
                chain.register("attacher", 1, attach_marker());
            } else {
                chain.register("attacher", 1, attach_marker());
                chain.register("reader", 2, read_marker(seen.clone()));
            }

            for _ in 0..3 {
                chain.run(&mut request(), &ok_endpoint).unwrap();
            }
            assert_eq!(chain.names(), vec!["attacher", "reader"]);
            assert_eq!(*seen.lock().unwrap(), vec![Some(1), Some(1), Some(1)]);
        }
    }

    #[test]
    fn test_ties_keep_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut chain = MiddlewareChain::new();
        for name in ["first", "second", "third"] {
            let order = order.clone();
            chain.register(name, 5, from_fn(move |req, next| {
                order.lock().unwrap().push(name);
                next.run(req)
            }));
        }
        chain.register("early", 0, from_fn(|req, next| next.run(req)));

        chain.run(&mut request(), &ok_endpoint).unwrap();
        assert_eq!(chain.names(), vec!["early", "first", "second", "third"]);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_short_circuit_skips_rest() {
        let reached = Arc::new(Mutex::new(false));
        let flag = reached.clone();
        let chain = MiddlewareChain::new()
            .with("blocker", 1, from_fn(|_, _| {
                Ok(HttpResponse::text(StatusCode::TOO_MANY_REQUESTS, "slow down"))
            }))
            .with("after", 2, from_fn(move |req, next| {
                *flag.lock().unwrap() = true;
                next.run(req)
            }));

        let response = chain.run(&mut request(), &ok_endpoint).unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(!*reached.lock().unwrap());
    }

    #[test]
    fn test_wrapping_middleware_sees_response() {
        let chain = MiddlewareChain::new().with("tagger", 1, from_fn(|req, next| {
            next.run(req).map(|r| r.with_header("x-tagged", "yes"))
        }));
        let response = chain.run(&mut request(), &ok_endpoint).unwrap();
        assert_eq!(response.header("x-tagged"), Some("yes"));
        assert_eq!(response.body_bytes(), Some(&b"endpoint"[..]));
    }

    #[test]
    fn test_error_propagates() {
        let chain = MiddlewareChain::new().with("broken", 1, from_fn(|_, _| {
            Err(HandlerError::internal("boom"))
        }));
        let err = chain.run(&mut request(), &ok_endpoint).unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
