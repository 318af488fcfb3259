//! Request shape validation.
//!
//! Rejects, with 400, bodies that no handler could make sense of:
//! a `POST`/`PUT`/`PATCH` body without `Content-Type`, or a JSON body
//! that does not parse.

use http::Method;

use crate::http::error::HandlerError;
use crate::http::middleware::{Middleware, Next, Outcome};
use crate::http::request::{BodyFormat, HttpRequest};

#[derive(Debug, Default, Clone, Copy)]
pub struct RequestValidation;

impl Middleware for RequestValidation {
    fn handle(&self, request: &mut HttpRequest, next: Next<'_>) -> Outcome {
        let carries_body = matches!(*request.method(), Method::POST | Method::PUT | Method::PATCH);

        if carries_body && !request.body().is_empty() && request.content_type().is_none() {
            tracing::debug!(request_id = %request.request_id(), "Body without Content-Type");
            return Err(HandlerError::bad_request("Content-Type header is required"));
        }
        if let BodyFormat::Malformed(reason) = request.body_format() {
            tracing::debug!(request_id = %request.request_id(), reason = %reason, "Malformed JSON body");
            return Err(HandlerError::bad_request("Invalid JSON body"));
        }
        next.run(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::MiddlewareChain;
    use crate::http::response::HttpResponse;
    use http::StatusCode;

    fn run(request: HttpRequest) -> Result<StatusCode, StatusCode> {
        let chain = MiddlewareChain::new().with("validation", 5, RequestValidation);
        let mut request = request;
        chain
            .run(&mut request, &|_| Ok(HttpResponse::new(StatusCode::NO_CONTENT)))
            .map(|r| r.status())
            .map_err(|e| e.status())
    }

    #[test]
    fn test_missing_content_type() {
        let request = HttpRequest::builder(Method::POST, "/todos").body("x=1").build();
        assert_eq!(run(request), Err(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_malformed_json() {
        let request = HttpRequest::builder(Method::PUT, "/todos/1")
            .header("content-type", "application/json")
            .body("{\"title\":")
            .build();
        assert_eq!(run(request), Err(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_valid_requests_pass() {
        let request = HttpRequest::builder(Method::POST, "/todos")
            .header("content-type", "application/json")
            .body("{\"title\":\"milk\"}")
            .build();
        assert_eq!(run(request), Ok(StatusCode::NO_CONTENT));

        let request = HttpRequest::builder(Method::POST, "/logout").build();
        assert_eq!(run(request), Ok(StatusCode::NO_CONTENT));

        let request = HttpRequest::builder(Method::GET, "/").body("ignored").build();
        assert_eq!(run(request), Ok(StatusCode::NO_CONTENT));
    }
}
