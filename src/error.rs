//! Typed error hierarchy for fetchq
//!
//! Errors raised while a transfer executes never cross the queue boundary as
//! return values. They are rendered to a message and delivered through the
//! request's `on_error` hook and the `Failed` event instead.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the transfer engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Transport failures (connect, read, timeout, HTTP status)
    #[error("Network error: {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
        retryable: bool,
    },

    /// Filesystem failures on the temp or destination file
    #[error("Storage error at {path:?}: {message}")]
    Storage {
        kind: StorageErrorKind,
        path: PathBuf,
        message: String,
    },

    /// Invalid input from the caller
    #[error("Invalid input for '{field}': {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },

    /// The execution was stopped by its caller
    #[error("Cancelled")]
    Cancelled,

    /// The transport connected but produced no body to transfer
    #[error("Transport returned no body")]
    EmptyBody,

    /// The dispatcher's domain has been torn down by `cancel_all`
    #[error("Downloader has been shut down")]
    Shutdown,

    /// Internal error (bug or missing runtime)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkErrorKind {
    /// Connection refused or could not be established
    ConnectionRefused,
    /// Connection reset mid-transfer
    ConnectionReset,
    /// Connect or read timed out
    Timeout,
    /// Server answered with an error status
    HttpStatus(u16),
    /// Too many redirects
    TooManyRedirects,
    /// Body ended before the advertised length
    Incomplete,
    /// Other network error
    Other,
}

/// Storage error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// File/directory not found
    NotFound,
    /// Permission denied
    PermissionDenied,
    /// File name escapes the destination directory
    PathTraversal,
    /// File already exists
    AlreadyExists,
    /// I/O error
    Io,
}

impl EngineError {
    /// Check whether re-enqueueing the same request could plausibly succeed.
    ///
    /// Purely advisory: the engine never retries on its own.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { retryable, .. } => *retryable,
            Self::Storage { kind, .. } => matches!(kind, StorageErrorKind::Io),
            _ => false,
        }
    }

    /// True for errors caused by a stop signal rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Create a network error
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        let retryable = matches!(
            kind,
            NetworkErrorKind::Timeout
                | NetworkErrorKind::ConnectionReset
                | NetworkErrorKind::Incomplete
        ) || matches!(kind, NetworkErrorKind::HttpStatus(code) if code >= 500);
        Self::Network {
            kind,
            message: message.into(),
            retryable,
        }
    }

    /// Create a storage error
    pub fn storage(
        kind: StorageErrorKind,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::Storage {
            kind,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Wrap an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, context: &str, err: std::io::Error) -> Self {
        let path = path.into();
        match Self::from(err) {
            Self::Storage { kind, message, .. } => Self::Storage {
                kind,
                path,
                message: format!("{}: {}", context, message),
            },
            other => other,
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        // Body readers surface transport failures as io::Error
        match err.kind() {
            ErrorKind::TimedOut => {
                return Self::network(NetworkErrorKind::Timeout, err.to_string());
            }
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                return Self::network(NetworkErrorKind::ConnectionReset, err.to_string());
            }
            ErrorKind::ConnectionRefused => {
                return Self::network(NetworkErrorKind::ConnectionRefused, err.to_string());
            }
            _ => {}
        }
        let kind = match err.kind() {
            ErrorKind::NotFound => StorageErrorKind::NotFound,
            ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            ErrorKind::AlreadyExists => StorageErrorKind::AlreadyExists,
            _ => StorageErrorKind::Io,
        };
        Self::Storage {
            kind,
            path: PathBuf::new(),
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if err.is_connect() {
            NetworkErrorKind::ConnectionRefused
        } else if err.is_redirect() {
            NetworkErrorKind::TooManyRedirects
        } else if let Some(status) = err.status() {
            NetworkErrorKind::HttpStatus(status.as_u16())
        } else {
            NetworkErrorKind::Other
        };
        Self::network(kind, err.to_string())
    }
}

impl From<url::ParseError> for EngineError {
    fn from(err: url::ParseError) -> Self {
        Self::invalid_input("url", err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for EngineError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::network(NetworkErrorKind::Timeout, err.to_string())
    }
}
