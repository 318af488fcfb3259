//! Request dispatch: middleware chain, route lookup, access check, handler,
//! static fallback, and error rendering.
//!
//! # Data Flow
//! ```text
//! HttpRequest
//!     → MiddlewareChain (may short-circuit)
//!     → RouteTable::lookup
//!         Found            → session check (401) → handler
//!         MethodNotAllowed → 405 + Allow
//!         NotFound         → static file (GET/HEAD) → 404 page
//!     → HttpResponse (+ X-Request-Id)
//! ```
//!
//! Every outcome, including handler panics, ends as a complete response.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use http::header::{ACCEPT, ALLOW};
use http::{Method, StatusCode};

use crate::auth::Session;
use crate::http::api::api_error;
use crate::http::error::HandlerError;
use crate::http::middleware::{MiddlewareChain, Outcome};
use crate::http::request::{HttpRequest, X_REQUEST_ID};
use crate::http::response::HttpResponse;
use crate::http::state::AppState;
use crate::routing::{Access, ContentType, RouteMatch, RouteTable, StaticFile, StaticFiles};
use crate::template::RenderContext;

/// Everything needed to turn a parsed request into a response. Built once,
/// shared read-only by every connection.
#[derive(Debug)]
pub struct Pipeline {
    chain: MiddlewareChain,
    routes: RouteTable,
    statics: StaticFiles,
    state: Arc<AppState>,
}

impl Pipeline {
    pub fn new(chain: MiddlewareChain, routes: RouteTable, state: Arc<AppState>) -> Self {
        let statics = StaticFiles::new(&state.config().documents.root);
        Self {
            chain,
            routes,
            statics,
            state,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    /// Produce the response for `request`. Never fails and never panics.
    pub fn dispatch(&self, mut request: HttpRequest) -> HttpResponse {
        let request_id = request.request_id().to_string();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            self.chain.run(&mut request, &|req| self.endpoint(req))
        }));

        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(error)) => {
                let content_type = preferred_content_type(&request);
                self.error_response(&request, error, content_type)
            }
            Err(panic) => {
                tracing::error!(
                    request_id = %request_id,
                    panic = panic_message(&*panic),
                    "Handler panicked"
                );
                self.error_response(
                    &request,
                    HandlerError::internal("handler panicked"),
                    preferred_content_type(&request),
                )
            }
        };

        response.with_header(X_REQUEST_ID, request_id)
    }

    fn endpoint(&self, request: &mut HttpRequest) -> Outcome {
        let method = request.method().clone();
        let path = request.path().to_string();

        match self.routes.lookup(&method, &path) {
            RouteMatch::Found { route, params } => {
                request.set_path_params(params);

                if route.access() == Access::Session && request.extensions().get::<Session>().is_none() {
                    tracing::info!(
                        request_id = %request.request_id(),
                        path = %path,
                        "Session required"
                    );
                    return Ok(self.unauthorized(request, route.content_type()));
                }

                match route.call(request, &self.state) {
                    Ok(response) => Ok(response),
                    Err(error) => Ok(self.error_response(request, error, route.content_type())),
                }
            }
            RouteMatch::MethodNotAllowed { allowed } => {
                let allow = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                let response = match preferred_content_type(request) {
                    ContentType::Json => api_error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
                    ContentType::Html => builtin_page(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed."),
                };
                Ok(response.with_header(ALLOW, allow))
            }
            RouteMatch::NotFound => {
                if method == Method::GET || method == Method::HEAD {
                    if let Some(file) = self.statics.resolve(&path) {
                        return self.serve_static(request, file);
                    }
                }
                Ok(self.not_found(request, preferred_content_type(request)))
            }
        }
    }

    fn serve_static(&self, request: &HttpRequest, file: StaticFile) -> Outcome {
        match file {
            StaticFile::Template(path) => {
                let context = RenderContext::from_request(request);
                let html = self.state.templates().render_path(&path, &context)?;
                Ok(HttpResponse::html(StatusCode::OK, html))
            }
            StaticFile::Asset {
                path,
                len,
                content_type,
            } => Ok(HttpResponse::file(path, len, content_type)),
        }
    }

    fn error_response(&self, request: &HttpRequest, error: HandlerError, content_type: ContentType) -> HttpResponse {
        match (content_type, error.status()) {
            (ContentType::Html, StatusCode::NOT_FOUND) => self.not_found(request, ContentType::Html),
            (ContentType::Html, StatusCode::UNAUTHORIZED) => self.unauthorized(request, ContentType::Html),
            _ => render_error(request, error, content_type),
        }
    }

    fn not_found(&self, request: &HttpRequest, content_type: ContentType) -> HttpResponse {
        match content_type {
            ContentType::Json => api_error(StatusCode::NOT_FOUND, "Not Found"),
            ContentType::Html => self.custom_page(
                request,
                StatusCode::NOT_FOUND,
                self.state.config().documents.not_found_page.as_deref(),
                "The page you are looking for does not exist.",
            ),
        }
    }

    fn unauthorized(&self, request: &HttpRequest, content_type: ContentType) -> HttpResponse {
        match content_type {
            ContentType::Json => api_error(StatusCode::UNAUTHORIZED, "Session required"),
            ContentType::Html => self.custom_page(
                request,
                StatusCode::UNAUTHORIZED,
                self.state.config().documents.unauthorized_page.as_deref(),
                "You need to log in to see this page.",
            ),
        }
    }

    fn custom_page(&self, request: &HttpRequest, status: StatusCode, page: Option<&str>, fallback: &str) -> HttpResponse {
        if let Some(page) = page {
            let context = RenderContext::from_request(request);
            match self.state.templates().render_file(page, &context) {
                Ok(html) => return HttpResponse::html(status, html),
                Err(e) => tracing::warn!(page, error = %e, "Custom error page unavailable"),
            }
        }
        builtin_page(status, fallback)
    }
}

/// Render `error` as a JSON envelope or the built-in error page, logging
/// internal errors. Used where the custom 404/401 pages are out of reach.
pub(crate) fn render_error(request: &HttpRequest, error: HandlerError, content_type: ContentType) -> HttpResponse {
    let status = error.status();
    if let HandlerError::Internal(source) = &error {
        tracing::error!(
            request_id = %request.request_id(),
            method = %request.method(),
            path = %request.path(),
            error = %source,
            "Request failed"
        );
    }
    match content_type {
        ContentType::Json => api_error(status, error.public_message()),
        ContentType::Html => builtin_page(status, &error.public_message()),
    }
}

fn builtin_page(status: StatusCode, message: &str) -> HttpResponse {
    let title = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );
    HttpResponse::html(
        status,
        format!(
            "<!DOCTYPE html><html><head><title>{title}</title></head>\
             <body><h1>{title}</h1><p>{}</p></body></html>",
            escape_html(message)
        ),
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// JSON when the client asks for it explicitly, HTML otherwise.
pub(crate) fn preferred_content_type(request: &HttpRequest) -> ContentType {
    match request.header(ACCEPT) {
        Some(accept) if accept.contains("application/json") && !accept.contains("text/html") => ContentType::Json,
        _ => ContentType::Html,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
