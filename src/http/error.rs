//! Error taxonomy for the request pipeline.
//!
//! - [`ParseError`]: the bytes on the wire are not an acceptable request.
//!   Answered with a minimal response (when the socket still works) and
//!   the connection is closed.
//! - [`HandlerError`]: raised by middleware or handlers. Client errors keep
//!   their status; everything else becomes a 500.

use http::StatusCode;

/// Failure while reading a request off the connection.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line: {0}")]
    RequestLine(String),
    #[error("unsupported HTTP version: {0}")]
    Version(String),
    #[error("malformed header: {0}")]
    Header(String),
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),
    #[error("more than {0} header fields")]
    TooManyHeaders(usize),
    #[error("invalid Content-Length: {0}")]
    ContentLength(String),
    #[error("body of {len} bytes exceeds limit of {limit}")]
    BodyTooLarge { len: usize, limit: usize },
    #[error("transfer encodings are not supported")]
    TransferEncoding,
    #[error("connection closed mid-request")]
    UnexpectedEof,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ParseError {
    /// Status to answer with, or `None` when the socket itself failed.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ParseError::RequestLine(_) | ParseError::Header(_) | ParseError::ContentLength(_) => {
                Some(StatusCode::BAD_REQUEST)
            }
            ParseError::LineTooLong(_) => Some(StatusCode::BAD_REQUEST),
            ParseError::Version(_) => Some(StatusCode::HTTP_VERSION_NOT_SUPPORTED),
            ParseError::TooManyHeaders(_) => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            ParseError::BodyTooLarge { .. } => Some(StatusCode::PAYLOAD_TOO_LARGE),
            ParseError::TransferEncoding => Some(StatusCode::NOT_IMPLEMENTED),
            ParseError::UnexpectedEof | ParseError::Io(_) => None,
        }
    }
}

/// Error produced by a middleware or route handler.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// A typed client error; the status is sent as-is.
    #[error("{message}")]
    Client { status: StatusCode, message: String },
    /// Anything unexpected. Logged and answered with 500.
    #[error("internal error: {0}")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    pub fn client(status: StatusCode, message: impl Into<String>) -> Self {
        HandlerError::Client {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::client(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::client(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::client(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::client(StatusCode::CONFLICT, message)
    }

    pub fn internal(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        HandlerError::Internal(error.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Client { status, .. } => *status,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client.
    pub fn public_message(&self) -> String {
        match self {
            HandlerError::Client { message, .. } => message.clone(),
            HandlerError::Internal(_) => "Internal Server Error".to_string(),
        }
    }
}

impl From<crate::template::TemplateError> for HandlerError {
    fn from(error: crate::template::TemplateError) -> Self {
        HandlerError::internal(error)
    }
}

impl From<crate::persistence::PersistenceError> for HandlerError {
    fn from(error: crate::persistence::PersistenceError) -> Self {
        HandlerError::internal(error)
    }
}
