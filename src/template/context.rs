//! Per-render variables and process-wide server facts.

use std::collections::HashMap;

use crate::auth::Session;
use crate::http::request::HttpRequest;
use crate::net::ConnectionTracker;

/// Name bound to the rendered body when assembling a page.
pub const BODY_CONTENT: &str = "_BODY_CONTENT_";

/// Variables and session state visible to one render.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
    vars: HashMap<String, String>,
    session: Option<Session>,
}

impl RenderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query parameters, then body parameters (later wins), plus the
    /// session attached by the session middleware.
    pub fn from_request(request: &HttpRequest) -> Self {
        let mut vars = HashMap::with_capacity(request.query().len() + request.body_params().len());
        vars.extend(request.query().iter().map(|(k, v)| (k.clone(), v.clone())));
        vars.extend(request.body_params().iter().map(|(k, v)| (k.clone(), v.clone())));
        Self {
            vars,
            session: request.extensions().get::<Session>().cloned(),
        }
    }

    /// Bind a variable, replacing any earlier value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn with_session(mut self, session: Option<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_some()
    }
}

/// Read-only server facts exposed to introspection commands.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub port: u16,
    pub public_url: String,
    pub connections: ConnectionTracker,
}

impl ServerInfo {
    /// `public_url` joined with `path`, with exactly one slash between them.
    pub fn path_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.public_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn test_body_params_override_query() {
        let request = HttpRequest::builder(Method::POST, "/form?name=query&page=2")
            .header("content-type", "application/x-www-form-urlencoded")
            .body("name=body")
            .build();
        let ctx = RenderContext::from_request(&request);
        assert_eq!(ctx.get("name"), Some("body"));
        assert_eq!(ctx.get("page"), Some("2"));
        assert!(!ctx.is_logged_in());
    }

    #[test]
    fn test_session_picked_up_from_extensions() {
        let mut request = HttpRequest::builder(Method::GET, "/").build();
        request.extensions_mut().insert(Session {
            user_id: "7".into(),
            token: "t".into(),
        });
        let ctx = RenderContext::from_request(&request).with("title", "Home");
        assert!(ctx.is_logged_in());
        assert_eq!(ctx.session().map(|s| s.user_id.as_str()), Some("7"));
        assert_eq!(ctx.get("title"), Some("Home"));
    }

    #[test]
    fn test_path_for_joins_once() {
        let info = ServerInfo {
            port: 15000,
            public_url: "http://localhost:15000/".into(),
            connections: ConnectionTracker::new(),
        };
        assert_eq!(info.path_for("/css/main.css"), "http://localhost:15000/css/main.css");
        assert_eq!(info.path_for("login"), "http://localhost:15000/login");
    }
}
