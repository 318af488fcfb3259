//! Response model and wire serialization.
//!
//! # Responsibilities
//! - Build responses incrementally (status, headers, body)
//! - Fill in default headers (Server, Date, Cache-Control, Content-Type)
//! - Compute Content-Length from the final body and set Connection
//! - Stream file bodies from disk instead of buffering them
//!
//! # Design Decisions
//! - Writing consumes the response, so it can only ever be written once
//! - A file body is opened before the head is written; a vanished file
//!   becomes a 500 instead of a half-written response

use std::path::PathBuf;

use http::header::{
    CACHE_CONTROL, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, DATE, LOCATION, SERVER,
};
use http::{HeaderMap, HeaderValue, StatusCode};
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const SERVER_NAME: &str = "jaws";
pub const HTML_UTF8: &str = "text/html; charset=utf-8";
pub const JSON_UTF8: &str = "application/json; charset=utf-8";
pub const TEXT_UTF8: &str = "text/plain; charset=utf-8";

/// Response payload.
#[derive(Debug, Clone)]
pub enum Body {
    Bytes(Vec<u8>),
    /// A file streamed from disk; `len` is taken when the response is built.
    File { path: PathBuf, len: u64 },
}

impl Body {
    pub fn len(&self) -> u64 {
        match self {
            Body::Bytes(bytes) => bytes.len() as u64,
            Body::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An HTTP response under construction.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Body,
    close: bool,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Body::Bytes(Vec::new()),
            close: false,
        }
    }

    pub fn html(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_content_type(HTML_UTF8)
            .with_body(body.into().into_bytes())
    }

    pub fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_content_type(TEXT_UTF8)
            .with_body(body.into().into_bytes())
    }

    /// Serialize `value` as the JSON body. A serialization failure yields a 500.
    pub fn json<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(bytes) => Self::new(status).with_content_type(JSON_UTF8).with_body(bytes),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize JSON response");
                Self::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
            }
        }
    }

    /// A file streamed from disk.
    pub fn file(path: PathBuf, len: u64, content_type: &'static str) -> Self {
        let mut response = Self::new(StatusCode::OK).with_content_type(content_type);
        response.body = Body::File { path, len };
        response
    }

    /// `303 See Other` to `location`.
    pub fn redirect(location: &str) -> Self {
        Self::new(StatusCode::SEE_OTHER).with_header(LOCATION, location)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    /// In-memory body bytes; `None` for file bodies.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        match &self.body {
            Body::Bytes(bytes) => Some(bytes),
            Body::File { .. } => None,
        }
    }

    /// Set a header, replacing existing values. Values that are not valid
    /// header text are dropped with a warning.
    pub fn with_header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: http::header::IntoHeaderName,
        V: TryInto<HeaderValue>,
    {
        match value.try_into() {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => tracing::warn!(status = %self.status, "Dropping invalid header value"),
        }
        self
    }

    /// Append a header, keeping existing values (e.g. several `Set-Cookie`).
    pub fn append_header<K, V>(mut self, name: K, value: V) -> Self
    where
        K: http::header::IntoHeaderName,
        V: TryInto<HeaderValue>,
    {
        if let Ok(value) = value.try_into() {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_content_type(self, content_type: &'static str) -> Self {
        self.with_header(CONTENT_TYPE, HeaderValue::from_static(content_type))
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Body::Bytes(body.into());
        self
    }

    /// Ask for the connection to be closed after this response.
    pub fn close_connection(mut self) -> Self {
        self.close = true;
        self
    }

    pub fn wants_close(&self) -> bool {
        self.close
    }

    /// Status line and headers, including the defaults.
    pub fn head_bytes(&mut self, keep_alive: bool) -> Vec<u8> {
        let length = self.body.len();
        let headers = &mut self.headers;
        headers
            .entry(SERVER)
            .or_insert(HeaderValue::from_static(SERVER_NAME));
        headers
            .entry(CACHE_CONTROL)
            .or_insert(HeaderValue::from_static("no-cache"));
        headers
            .entry(CONTENT_TYPE)
            .or_insert(HeaderValue::from_static(HTML_UTF8));
        if let Ok(date) = HeaderValue::from_str(&http_date()) {
            headers.insert(DATE, date);
        }
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));
        headers.insert(
            CONNECTION,
            HeaderValue::from_static(if keep_alive { "keep-alive" } else { "close" }),
        );

        let mut head = Vec::with_capacity(256);
        head.extend_from_slice(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason().unwrap_or("Unknown")
            )
            .as_bytes(),
        );
        for (name, value) in headers.iter() {
            head.extend_from_slice(name.as_str().as_bytes());
            head.extend_from_slice(b": ");
            head.extend_from_slice(value.as_bytes());
            head.extend_from_slice(b"\r\n");
        }
        head.extend_from_slice(b"\r\n");
        head
    }

    /// Write the complete response. `head_only` suppresses the body (HEAD).
    pub async fn write_to<W>(mut self, writer: &mut W, keep_alive: bool, head_only: bool) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut file = None;
        let mut vanished = false;
        if let (Body::File { path, .. }, false) = (&self.body, head_only) {
            match tokio::fs::File::open(path).await {
                Ok(opened) => file = Some(opened),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Static file vanished before write");
                    vanished = true;
                }
            }
        }
        if vanished {
            self = HttpResponse::text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
        }

        let head = self.head_bytes(keep_alive);
        writer.write_all(&head).await?;

        if !head_only {
            match (&self.body, file) {
                (Body::Bytes(bytes), _) => writer.write_all(bytes).await?,
                (Body::File { len, .. }, Some(file)) => {
                    let copied = tokio::io::copy(&mut file.take(*len), writer).await?;
                    if copied != *len {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "file shrank while streaming",
                        ));
                    }
                }
                (Body::File { .. }, None) => {}
            }
        }
        writer.flush().await
    }
}

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
fn http_date() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn serialize(response: HttpResponse, keep_alive: bool, head_only: bool) -> String {
        let mut out = Vec::new();
        response.write_to(&mut out, keep_alive, head_only).await.unwrap();
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn test_serialize_defaults() {
        let text = serialize(HttpResponse::html(StatusCode::OK, "<p>hi</p>"), true, false).await;
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("server: jaws\r\n"));
        assert!(text.contains("cache-control: no-cache\r\n"));
        assert!(text.contains("content-type: text/html; charset=utf-8\r\n"));
        assert!(text.contains("content-length: 9\r\n"));
        assert!(text.contains("connection: keep-alive\r\n"));
        assert!(text.contains("date: "));
        assert!(text.ends_with("\r\n\r\n<p>hi</p>"));
    }

    #[tokio::test]
    async fn test_close_and_head() {
        let text = serialize(HttpResponse::text(StatusCode::NOT_FOUND, "gone"), false, true).await;
        assert!(text.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert!(text.contains("connection: close\r\n"));
        assert!(text.contains("content-length: 4\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[tokio::test]
    async fn test_json_body() {
        let response = HttpResponse::json(StatusCode::CREATED, &serde_json::json!({"id": 7}));
        assert_eq!(response.header("content-type"), Some(JSON_UTF8));
        assert_eq!(response.body_bytes(), Some(&br#"{"id":7}"#[..]));
    }

    #[tokio::test]
    async fn test_file_body_streams() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.css");
        std::fs::write(&path, "body{}").unwrap();

        let text = serialize(HttpResponse::file(path, 6, "text/css"), true, false).await;
        assert!(text.contains("content-type: text/css\r\n"));
        assert!(text.contains("content-length: 6\r\n"));
        assert!(text.ends_with("body{}"));
    }

    #[tokio::test]
    async fn test_missing_file_becomes_500() {
        let response = HttpResponse::file(PathBuf::from("/definitely/not/here.css"), 10, "text/css");
        let text = serialize(response, true, false).await;
        assert!(text.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
    }

    #[test]
    fn test_invalid_header_value_dropped() {
        let response = HttpResponse::new(StatusCode::OK).with_header("x-bad", "line\nbreak");
        assert!(response.header("x-bad").is_none());
    }
}
