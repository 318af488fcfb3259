//! Session attachment.

use std::sync::Arc;

use crate::auth::{Session, SessionValidator};
use crate::http::middleware::{Middleware, Next, Outcome};
use crate::http::request::HttpRequest;

/// Resolves the request token and attaches a [`Session`] when it is valid.
/// Never rejects: routes decide whether a session is required.
#[derive(Clone)]
pub struct SessionMiddleware {
    validator: Arc<dyn SessionValidator>,
}

impl SessionMiddleware {
    pub fn new(validator: Arc<dyn SessionValidator>) -> Self {
        Self { validator }
    }
}

impl Middleware for SessionMiddleware {
    fn handle(&self, request: &mut HttpRequest, next: Next<'_>) -> Outcome {
        let session = request.token().and_then(|token| self.validator.resolve(token));
        match session {
            Some(session) => {
                tracing::trace!(user_id = %session.user_id, "Session attached");
                request.extensions_mut().insert::<Session>(session);
            }
            None if request.token().is_some() => {
                tracing::debug!(request_id = %request.request_id(), "Ignoring invalid token");
            }
            None => {}
        }
        next.run(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::middleware::MiddlewareChain;
    use crate::http::response::HttpResponse;
    use http::{Method, StatusCode};

    struct OneToken;

    impl SessionValidator for OneToken {
        fn is_token_valid(&self, token: &str) -> bool {
            token == "good"
        }

        fn user_id_from_token(&self, _: &str) -> Option<String> {
            Some("5".into())
        }
    }

    fn user_of(request: HttpRequest) -> Option<String> {
        let chain = MiddlewareChain::new().with("session", 4, SessionMiddleware::new(Arc::new(OneToken)));
        let endpoint = |req: &mut HttpRequest| -> Outcome {
            let user = req
                .extensions()
                .get::<Session>()
                .map(|s| s.user_id.clone())
                .unwrap_or_default();
            Ok(HttpResponse::text(StatusCode::OK, user))
        };
        let mut request = request;
        let response = chain.run(&mut request, &endpoint).unwrap();
        let body = String::from_utf8(response.body_bytes().unwrap().to_vec()).unwrap();
        (!body.is_empty()).then_some(body)
    }

    #[test]
    fn test_bearer_and_cookie_tokens() {
        let bearer = HttpRequest::builder(Method::GET, "/")
            .header("authorization", "Bearer good")
            .build();
        assert_eq!(user_of(bearer).as_deref(), Some("5"));

        let cookie = HttpRequest::builder(Method::GET, "/")
            .header("cookie", "theme=dark; auth_token=good")
            .build();
        assert_eq!(user_of(cookie).as_deref(), Some("5"));
    }

    #[test]
    fn test_invalid_or_missing_token_attaches_nothing() {
        let bad = HttpRequest::builder(Method::GET, "/")
            .header("authorization", "Bearer bad")
            .build();
        assert_eq!(user_of(bad), None);
        assert_eq!(user_of(HttpRequest::builder(Method::GET, "/").build()), None);
    }
}
