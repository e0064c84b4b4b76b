use std::error::Error as StdError;
use std::fmt::{self, Display};

/// The kind of error that occurred.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request could not be sent or the connection failed.
    Http,
    /// The catalog answered with a non-success status.
    Status,
    /// The response body was not what the catalog should return.
    Decode,
    /// The catalog reported an error in the response body.
    Remote,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Http => write!(f, "http"),
            ErrorKind::Status => write!(f, "status"),
            ErrorKind::Decode => write!(f, "decode"),
            ErrorKind::Remote => write!(f, "remote"),
        }
    }
}

/// Error type for [`crate::CatalogClient`].
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
}

impl Error {
    pub(crate) fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_status() {
            ErrorKind::Status
        } else if err.is_decode() {
            ErrorKind::Decode
        } else {
            ErrorKind::Http
        };
        Self::new(format!("{err}"), kind)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tool catalog {} error: {}", self.kind, self.message)
    }
}

impl StdError for Error {}
