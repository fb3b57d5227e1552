//! Error types for synchronization operations

use thiserror::Error;

/// Result type for synchronization operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Comprehensive error type for synchronization operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Authentication failed (token exchange, or 401 after retry)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Identity provider returned a non-2xx response
    #[error("Identity provider error (status {status}): {message}")]
    Remote { status: u16, message: String },

    /// LMS store write failed
    #[error("Store operation failed: {0}")]
    Store(String),

    /// Required field missing or malformed on an IdP record
    #[error("Invalid record: {0}")]
    Validation(String),

    /// Uniqueness collision on create
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Cooperative cancellation between phases
    #[error("Sync cancelled")]
    Cancelled,

    /// Rate limit exceeded
    #[error("Rate limit exceeded. Retry after: {retry_after:?}")]
    RateLimited { retry_after: Option<u64> },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("Sync error: {0}")]
    Other(String),
}

impl SyncError {
    /// Create a new authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth(message.into())
    }

    /// Create a new remote error from a status code and a body hint
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: message.into(),
        }
    }

    /// Create a new store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a new conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Stable kind string recorded in job error details
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Auth(_) => "auth",
            Self::Remote { .. } => "remote",
            Self::Store(_) => "store",
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::Cancelled => "cancelled",
            Self::RateLimited { .. } => "rate_limited",
            Self::Serialization(_) => "serialization",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Io(_) => "io",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_is_stable_per_variant() {
        assert_eq!(SyncError::auth("bad secret").kind(), "auth");
        assert_eq!(SyncError::remote(502, "gateway").kind(), "remote");
        assert_eq!(SyncError::Cancelled.kind(), "cancelled");
    }

    #[test]
    fn remote_error_display_includes_status() {
        let err = SyncError::remote(404, "group missing");
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("group missing"));
    }
}
