use bytes::Bytes;
use std::fmt;
use thiserror::Error as ThisError;

/// The error type for signing and fetching operations.
#[derive(ThisError, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
    response: Option<Box<http::Response<Bytes>>>,
}

/// The kind of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Configuration error (missing fields, invalid values such as a negative
    /// retry count). Never retried.
    ConfigInvalid,

    /// Request cannot be signed or dispatched (missing authority, invalid
    /// header values, etc.). Never retried.
    RequestInvalid,

    /// A response was received but the caller's `is_response_ok` predicate
    /// rejected it. The triggering response is attached.
    ResponseNotOkay,

    /// The cancellation signal fired (caller token or per-call timeout).
    Cancelled,

    /// Unexpected errors (transport failures, I/O, etc.).
    Unexpected,
}

impl Error {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            response: None,
        }
    }

    /// Add a source error.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Check whether a retry loop should give up on this error immediately.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ConfigInvalid | ErrorKind::RequestInvalid | ErrorKind::Cancelled
        )
    }

    /// The response that triggered this error, if any.
    ///
    /// Only set for [`ErrorKind::ResponseNotOkay`].
    pub fn response(&self) -> Option<&http::Response<Bytes>> {
        self.response.as_deref()
    }

    /// Take the response that triggered this error, if any.
    pub fn into_response(self) -> Option<http::Response<Bytes>> {
        self.response.map(|v| *v)
    }
}

// Convenience constructors
impl Error {
    /// Create a config invalid error.
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create a request invalid error.
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RequestInvalid, message)
    }

    /// Create a cancelled error.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    /// Create an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create a response-not-okay error carrying the rejected response.
    pub fn response_not_okay(response: http::Response<Bytes>) -> Self {
        let mut err = Self::new(
            ErrorKind::ResponseNotOkay,
            format!("response not okay, status: {}", response.status()),
        );
        err.response = Some(Box::new(response));
        err
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::ConfigInvalid => write!(f, "invalid configuration"),
            ErrorKind::RequestInvalid => write!(f, "invalid request"),
            ErrorKind::ResponseNotOkay => write!(f, "response not okay"),
            ErrorKind::Cancelled => write!(f, "operation cancelled"),
            ErrorKind::Unexpected => write!(f, "unexpected error"),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, Error>;

// Common From implementations
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(err)
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUriParts> for Error {
    fn from(err: http::uri::InvalidUriParts) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::ToStrError> for Error {
    fn from(err: http::header::ToStrError) -> Self {
        Self::request_invalid(err.to_string()).with_source(anyhow::Error::from(err))
    }
}
