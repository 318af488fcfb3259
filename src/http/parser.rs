//! HTTP/1.x request parser.
//!
//! # Responsibilities
//! - Read the request line (`METHOD SP TARGET SP VERSION`)
//! - Read header lines until the blank line
//! - Read exactly `Content-Length` body bytes (absent ⇒ empty body)
//! - Enforce line, header-count and body limits
//!
//! # Design Decisions
//! - Reading the request line is split from the rest so the connection
//!   loop can apply the idle deadline to the first line only
//! - Works over any `AsyncBufRead`, so tests can feed byte slices
//! - Chunked transfer encoding is rejected rather than half-supported

use std::net::SocketAddr;

use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, Version};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::config::LimitsConfig;
use crate::http::error::ParseError;
use crate::http::request::HttpRequest;

/// Blank lines tolerated before a request line.
const MAX_LEADING_BLANK_LINES: usize = 8;

/// Size limits applied while parsing.
#[derive(Debug, Clone)]
pub struct ParseLimits {
    pub max_line_bytes: usize,
    pub max_headers: usize,
    pub max_body_bytes: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for ParseLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_line_bytes: config.max_line_bytes,
            max_headers: config.max_headers,
            max_body_bytes: config.max_body_bytes,
        }
    }
}

/// The first line of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: Method,
    pub target: String,
    pub version: Version,
}

/// Read the next request line. `Ok(None)` means the peer closed cleanly
/// between requests.
pub async fn read_request_line<R>(
    reader: &mut R,
    limits: &ParseLimits,
) -> Result<Option<RequestLine>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    for _ in 0..=MAX_LEADING_BLANK_LINES {
        let Some(line) = read_line(reader, limits.max_line_bytes).await? else {
            return Ok(None);
        };
        if line.is_empty() {
            continue;
        }
        return parse_request_line(&line).map(Some);
    }
    Err(ParseError::RequestLine("too many blank lines".into()))
}

/// Read headers and body following `line` and build the request.
pub async fn read_request<R>(
    reader: &mut R,
    line: RequestLine,
    limits: &ParseLimits,
    peer: Option<SocketAddr>,
) -> Result<HttpRequest, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let headers = read_headers(reader, limits).await?;

    if headers.contains_key(TRANSFER_ENCODING) {
        return Err(ParseError::TransferEncoding);
    }

    let len = content_length(&headers)?;
    if len > limits.max_body_bytes {
        return Err(ParseError::BodyTooLarge {
            len,
            limit: limits.max_body_bytes,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ParseError::UnexpectedEof
        } else {
            ParseError::Io(e)
        }
    })?;

    Ok(HttpRequest::from_parts(
        line.method,
        line.target,
        line.version,
        headers,
        body,
        peer,
    ))
}

/// Read one CRLF (or bare LF) terminated line without the terminator.
async fn read_line<R>(reader: &mut R, max: usize) -> Result<Option<Vec<u8>>, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    // Room for the line plus CRLF.
    let cap = max as u64 + 2;
    let n = (&mut *reader).take(cap).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        return if buf.len() as u64 >= cap {
            Err(ParseError::LineTooLong(max))
        } else {
            Err(ParseError::UnexpectedEof)
        };
    }
    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    if buf.len() > max {
        return Err(ParseError::LineTooLong(max));
    }
    Ok(Some(buf))
}

fn parse_request_line(line: &[u8]) -> Result<RequestLine, ParseError> {
    let text = std::str::from_utf8(line)
        .map_err(|_| ParseError::RequestLine("not valid UTF-8".into()))?;

    let parts: Vec<&str> = text.split(' ').collect();
    let [method, target, version] = parts.as_slice() else {
        return Err(ParseError::RequestLine(text.to_string()));
    };

    let method = Method::from_bytes(method.as_bytes())
        .map_err(|_| ParseError::RequestLine(format!("invalid method '{method}'")))?;

    if !target.starts_with('/') || target.bytes().any(|b| b.is_ascii_control()) {
        return Err(ParseError::RequestLine(format!("invalid target '{target}'")));
    }

    let version = match *version {
        "HTTP/1.1" => Version::HTTP_11,
        "HTTP/1.0" => Version::HTTP_10,
        other if other.starts_with("HTTP/") => return Err(ParseError::Version(other.to_string())),
        other => return Err(ParseError::RequestLine(format!("invalid version '{other}'"))),
    };

    Ok(RequestLine {
        method,
        target: target.to_string(),
        version,
    })
}

async fn read_headers<R>(reader: &mut R, limits: &ParseLimits) -> Result<HeaderMap, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    let mut headers = HeaderMap::new();
    loop {
        let line = read_line(reader, limits.max_line_bytes)
            .await?
            .ok_or(ParseError::UnexpectedEof)?;
        if line.is_empty() {
            return Ok(headers);
        }
        if headers.len() >= limits.max_headers {
            return Err(ParseError::TooManyHeaders(limits.max_headers));
        }
        let (name, value) = parse_header_line(&line)?;
        headers.append(name, value);
    }
}

fn parse_header_line(line: &[u8]) -> Result<(HeaderName, HeaderValue), ParseError> {
    let lossy = || String::from_utf8_lossy(line).into_owned();

    if matches!(line.first(), Some(b' ' | b'\t')) {
        return Err(ParseError::Header(format!("obsolete line folding: {}", lossy())));
    }
    let colon = line
        .iter()
        .position(|&b| b == b':')
        .ok_or_else(|| ParseError::Header(lossy()))?;

    let name = HeaderName::from_bytes(&line[..colon]).map_err(|_| ParseError::Header(lossy()))?;
    let value = trim_ows(&line[colon + 1..]);
    let value = HeaderValue::from_bytes(value).map_err(|_| ParseError::Header(lossy()))?;
    Ok((name, value))
}

fn trim_ows(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}

/// Content-Length, requiring all repeated values to agree.
fn content_length(headers: &HeaderMap) -> Result<usize, ParseError> {
    let mut length = None;
    for value in headers.get_all(CONTENT_LENGTH) {
        let text = value
            .to_str()
            .map_err(|_| ParseError::ContentLength("non-ASCII value".into()))?
            .trim();
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::ContentLength(text.to_string()));
        }
        let parsed: usize = text
            .parse()
            .map_err(|_| ParseError::ContentLength(text.to_string()))?;
        match length {
            Some(previous) if previous != parsed => {
                return Err(ParseError::ContentLength("conflicting values".into()));
            }
            _ => length = Some(parsed),
        }
    }
    Ok(length.unwrap_or(0))
}
