//! Error types for the store client

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur when talking to the row store
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed (connection, timeout, TLS, ...)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Store answered with an error status code
    #[error("Store error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error body returned by the store
        message: String,
    },

    /// Response body or headers could not be understood
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Request could not be built from the given input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl StoreError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// The store rejected a conditional write because the row changed
    pub fn is_precondition_failed(&self) -> bool {
        matches!(self, Self::ApiError { status: 412, .. })
    }

    /// The store rejected our credentials
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::ApiError { status: 401 | 403, .. })
    }
}
