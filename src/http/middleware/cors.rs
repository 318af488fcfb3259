//! CORS middleware.
//!
//! Adds `Access-Control-Allow-*` headers to every response and answers
//! `OPTIONS` preflight requests directly. Errors from later middleware are
//! rendered here so they carry the headers too.

use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_MAX_AGE,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use crate::config::CorsConfig;
use crate::http::dispatch::{preferred_content_type, render_error};
use crate::http::middleware::{Middleware, Next, Outcome};
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;

#[derive(Debug, Clone)]
pub struct Cors {
    headers: HeaderMap,
    max_age: HeaderValue,
}

impl Cors {
    pub fn new(config: &CorsConfig) -> Self {
        let mut headers = HeaderMap::new();
        let mut put = |name, value: &str| match HeaderValue::from_str(value) {
            Ok(value) => {
                headers.insert(name, value);
            }
            Err(_) => tracing::warn!(header = %name, value, "Ignoring invalid CORS setting"),
        };
        put(ACCESS_CONTROL_ALLOW_ORIGIN, &config.allowed_origin);
        put(ACCESS_CONTROL_ALLOW_METHODS, &config.allowed_methods);
        put(ACCESS_CONTROL_ALLOW_HEADERS, &config.allowed_headers);
        if config.allow_credentials {
            put(ACCESS_CONTROL_ALLOW_CREDENTIALS, "true");
        }

        Self {
            headers,
            max_age: HeaderValue::from(config.max_age_secs),
        }
    }

    fn decorate(&self, mut response: HttpResponse) -> HttpResponse {
        for (name, value) in &self.headers {
            response.headers_mut().insert(name.clone(), value.clone());
        }
        response
    }
}

impl Middleware for Cors {
    fn handle(&self, request: &mut HttpRequest, next: Next<'_>) -> Outcome {
        if request.method() == Method::OPTIONS {
            tracing::debug!(path = %request.path(), "Answering CORS preflight");
            let preflight = HttpResponse::new(StatusCode::OK)
                .with_header(ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
            return Ok(self.decorate(preflight));
        }
        let response = match next.run(request) {
            Ok(response) => response,
            Err(error) => render_error(request, error, preferred_content_type(request)),
        };
        Ok(self.decorate(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::error::HandlerError;
    use crate::http::middleware::MiddlewareChain;

    fn chain() -> MiddlewareChain {
        MiddlewareChain::new().with("cors", 3, Cors::new(&CorsConfig::default()))
    }

    #[test]
    fn test_preflight_short_circuits() {
        let mut request = HttpRequest::builder(Method::OPTIONS, "/api/v1/todos").build();
        let response = chain()
            .run(&mut request, &|_| panic!("endpoint must not run"))
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.header("access-control-max-age"), Some("3600"));
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        assert_eq!(
            response.header("access-control-allow-methods"),
            Some("GET, POST, PUT, PATCH, DELETE, OPTIONS")
        );
    }

    #[test]
    fn test_headers_added_to_normal_responses() {
        let mut request = HttpRequest::builder(Method::GET, "/").build();
        let response = chain()
            .run(&mut request, &|_| Ok(HttpResponse::text(StatusCode::OK, "hi")))
            .unwrap();
        assert_eq!(response.header("access-control-allow-credentials"), Some("true"));
        assert_eq!(
            response.header("access-control-allow-headers"),
            Some("Content-Type, Authorization")
        );
        assert!(response.header("access-control-max-age").is_none());
    }

    #[test]
    fn test_headers_added_to_later_errors() {
        let mut request = HttpRequest::builder(Method::POST, "/api/v1/todos")
            .header("accept", "application/json")
            .build();
        let response = chain()
            .run(&mut request, &|_| Err(HandlerError::bad_request("Malformed JSON body")))
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
        let body: serde_json::Value = serde_json::from_slice(response.body_bytes().unwrap()).unwrap();
        assert_eq!(body["success"], false);
    }
}
