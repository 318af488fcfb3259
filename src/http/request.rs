//! Parsed request model.
//!
//! # Responsibilities
//! - Hold everything derived from one request on the wire
//! - Decode query strings and form/JSON bodies into key/value maps
//! - Extract the caller's token (bearer header or `auth_token` cookie)
//! - Assign a request ID as early as possible for tracing
//!
//! # Design Decisions
//! - Derived maps are computed once, at construction
//! - Only the router (path parameters) and middleware (extensions)
//!   mutate a request after parsing

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use http::header::{AUTHORIZATION, CONNECTION, CONTENT_TYPE, COOKIE};
use http::{Extensions, HeaderMap, HeaderName, HeaderValue, Method, Version};
use uuid::Uuid;

/// Header carrying the request ID in both directions.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Cookie consulted when no bearer token is present.
pub const AUTH_COOKIE: &str = "auth_token";

/// Unique identifier for a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the body was interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyFormat {
    Empty,
    Form,
    Json,
    /// A body with a content type we do not decode.
    Other,
    /// Declared as JSON but failed to parse.
    Malformed(String),
}

/// A fully read HTTP request.
#[derive(Debug)]
pub struct HttpRequest {
    method: Method,
    target: String,
    path: String,
    version: Version,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Vec<u8>,
    body_params: HashMap<String, String>,
    body_format: BodyFormat,
    cookies: HashMap<String, String>,
    path_params: HashMap<String, String>,
    token: Option<String>,
    peer: Option<SocketAddr>,
    request_id: RequestId,
    extensions: Extensions,
}

impl HttpRequest {
    /// Start building a request by hand (tests, internal dispatch).
    pub fn builder(method: Method, target: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Vec::new(),
            peer: None,
        }
    }

    /// Assemble a request from its wire parts, decoding all derived fields.
    pub fn from_parts(
        method: Method,
        target: String,
        version: Version,
        headers: HeaderMap,
        body: Vec<u8>,
        peer: Option<SocketAddr>,
    ) -> Self {
        let (path, query_string) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query)),
            None => (target.clone(), None),
        };
        let query = query_string.map(decode_form).unwrap_or_default();

        let content_type = header_str(&headers, CONTENT_TYPE).map(media_type);
        let (body_format, body_params) = decode_body(content_type.as_deref(), &body);

        let cookies = header_str(&headers, COOKIE)
            .map(parse_cookies)
            .unwrap_or_default();
        let token = bearer_token(&headers).or_else(|| cookies.get(AUTH_COOKIE).cloned());

        let request_id = header_str(&headers, HeaderName::from_static(X_REQUEST_ID))
            .filter(|id| !id.is_empty() && id.len() <= 128)
            .map(|id| RequestId(id.to_string()))
            .unwrap_or_default();

        Self {
            method,
            target,
            path,
            version,
            query,
            headers,
            body,
            body_params,
            body_format,
            cookies,
            path_params: HashMap::new(),
            token,
            peer,
            request_id,
            extensions: Extensions::new(),
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request target exactly as received (path plus query).
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Path component, still percent-encoded.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as a string, if present and visible ASCII.
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Media type of the body without parameters, lowercased.
    pub fn content_type(&self) -> Option<String> {
        header_str(&self.headers, CONTENT_TYPE).map(media_type)
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_format(&self) -> &BodyFormat {
        &self.body_format
    }

    pub fn body_params(&self) -> &HashMap<String, String> {
        &self.body_params
    }

    pub fn body_param(&self, key: &str) -> Option<&str> {
        self.body_params.get(key).map(String::as_str)
    }

    /// Deserialize a JSON body into `T`.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Path parameters bound by the router.
    pub fn path_params(&self) -> &HashMap<String, String> {
        &self.path_params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub(crate) fn set_path_params(&mut self, params: HashMap<String, String>) {
        self.path_params = params;
    }

    /// Token presented by the caller, if any. Not yet validated.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.peer.map(|addr| addr.ip())
    }

    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Context attached by middleware.
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.extensions
    }

    /// Whether the client allows the connection to stay open afterwards.
    pub fn wants_keep_alive(&self) -> bool {
        let tokens: Vec<String> = self
            .headers
            .get_all(CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .map(|t| t.trim().to_ascii_lowercase())
            .collect();

        if tokens.iter().any(|t| t == "close") {
            return false;
        }
        match self.version {
            Version::HTTP_10 => tokens.iter().any(|t| t == "keep-alive"),
            _ => true,
        }
    }
}

/// Builder for requests constructed outside the parser.
#[derive(Debug)]
pub struct RequestBuilder {
    method: Method,
    target: String,
    version: Version,
    headers: HeaderMap,
    body: Vec<u8>,
    peer: Option<SocketAddr>,
}

impl RequestBuilder {
    /// Append a header. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn build(self) -> HttpRequest {
        HttpRequest::from_parts(
            self.method,
            self.target,
            self.version,
            self.headers,
            self.body,
            self.peer,
        )
    }
}

fn header_str(headers: &HeaderMap, name: impl http::header::AsHeaderName) -> Option<&str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn media_type(value: &str) -> String {
    value
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Decode `a=1&b=2` pairs; the last value wins on duplicate keys.
fn decode_form(input: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(input.as_bytes())
        .into_owned()
        .collect()
}

fn decode_body(content_type: Option<&str>, body: &[u8]) -> (BodyFormat, HashMap<String, String>) {
    if body.is_empty() {
        return (BodyFormat::Empty, HashMap::new());
    }
    match content_type {
        Some("application/x-www-form-urlencoded") => (
            BodyFormat::Form,
            url::form_urlencoded::parse(body).into_owned().collect(),
        ),
        Some(ct) if ct == "application/json" || ct.ends_with("+json") => {
            match serde_json::from_slice::<serde_json::Value>(body) {
                Ok(serde_json::Value::Object(fields)) => {
                    let params = fields
                        .into_iter()
                        .map(|(key, value)| {
                            let value = match value {
                                serde_json::Value::String(s) => s,
                                other => other.to_string(),
                            };
                            (key, value)
                        })
                        .collect();
                    (BodyFormat::Json, params)
                }
                Ok(_) => (BodyFormat::Json, HashMap::new()),
                Err(e) => (BodyFormat::Malformed(e.to_string()), HashMap::new()),
            }
        }
        _ => (BodyFormat::Other, HashMap::new()),
    }
}

fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| {
            (
                name.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            )
        })
        .filter(|(name, _)| !name.is_empty())
        .collect()
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = header_str(headers, AUTHORIZATION)?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_last_value_wins() {
        let req = HttpRequest::builder(Method::GET, "/search?q=rust&page=1&q=tokio%20io").build();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_param("q"), Some("tokio io"));
        assert_eq!(req.query_param("page"), Some("1"));
    }

    #[test]
    fn test_form_body() {
        let req = HttpRequest::builder(Method::POST, "/login")
            .header("Content-Type", "application/x-www-form-urlencoded; charset=utf-8")
            .body("username=alice&password=p%40ss")
            .build();
        assert_eq!(req.body_format(), &BodyFormat::Form);
        assert_eq!(req.body_param("username"), Some("alice"));
        assert_eq!(req.body_param("password"), Some("p@ss"));
    }

    #[test]
    fn test_json_body_flattened() {
        let req = HttpRequest::builder(Method::POST, "/api")
            .header("content-type", "application/json")
            .body(r#"{"name":"todo","done":false,"count":3}"#)
            .build();
        assert_eq!(req.body_format(), &BodyFormat::Json);
        assert_eq!(req.body_param("name"), Some("todo"));
        assert_eq!(req.body_param("done"), Some("false"));
        assert_eq!(req.body_param("count"), Some("3"));
    }

    #[test]
    fn test_malformed_json_is_flagged() {
        let req = HttpRequest::builder(Method::POST, "/api")
            .header("content-type", "application/json")
            .body("{not json")
            .build();
        assert!(matches!(req.body_format(), BodyFormat::Malformed(_)));
        assert!(req.body_params().is_empty());
    }

    #[test]
    fn test_token_sources() {
        let req = HttpRequest::builder(Method::GET, "/")
            .header("Authorization", "Bearer abc123")
            .header("Cookie", "auth_token=fromcookie")
            .build();
        assert_eq!(req.token(), Some("abc123"));

        let req = HttpRequest::builder(Method::GET, "/")
            .header("Cookie", "theme=dark; auth_token=fromcookie")
            .build();
        assert_eq!(req.token(), Some("fromcookie"));
        assert_eq!(req.cookie("theme"), Some("dark"));

        let req = HttpRequest::builder(Method::GET, "/")
            .header("Authorization", "Basic Zm9vOmJhcg==")
            .build();
        assert_eq!(req.token(), None);
    }

    #[test]
    fn test_headers_case_insensitive() {
        let req = HttpRequest::builder(Method::GET, "/")
            .header("X-Custom-Thing", "yes")
            .build();
        assert_eq!(req.header("x-custom-thing"), Some("yes"));
        assert_eq!(req.header("X-CUSTOM-THING"), Some("yes"));
    }

    #[test]
    fn test_request_id_propagated_or_generated() {
        let req = HttpRequest::builder(Method::GET, "/")
            .header("X-Request-Id", "trace-42")
            .build();
        assert_eq!(req.request_id().as_str(), "trace-42");

        let a = HttpRequest::builder(Method::GET, "/").build();
        let b = HttpRequest::builder(Method::GET, "/").build();
        assert_ne!(a.request_id(), b.request_id());
    }

    #[test]
    fn test_keep_alive_rules() {
        let req = HttpRequest::builder(Method::GET, "/").build();
        assert!(req.wants_keep_alive());

        let req = HttpRequest::builder(Method::GET, "/")
            .header("Connection", "Close")
            .build();
        assert!(!req.wants_keep_alive());

        let req = HttpRequest::builder(Method::GET, "/")
            .version(Version::HTTP_10)
            .build();
        assert!(!req.wants_keep_alive());

        let req = HttpRequest::builder(Method::GET, "/")
            .version(Version::HTTP_10)
            .header("Connection", "keep-alive")
            .build();
        assert!(req.wants_keep_alive());
    }
}
