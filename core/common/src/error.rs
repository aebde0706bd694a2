//! Common error types for drivestore.

use thiserror::Error;

/// Top-level error type for storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Required setting missing or malformed. Raised before any I/O.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credential signing or token exchange failed.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Transport-level failure (connect, timeout, broken body).
    #[error("Network error: {0}")]
    Network(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote service refused access to the resource.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The remote API rejected the request.
    #[error("Request failed with status {status}: {message}")]
    Request { status: u16, message: String },

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource already exists.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Operation is not implemented by this backend.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl Error {
    /// Whether this error is an API-level rejection of a request that
    /// reached the remote service, as opposed to a transport or
    /// authentication failure.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_) | Error::PermissionDenied(_) | Error::Request { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
