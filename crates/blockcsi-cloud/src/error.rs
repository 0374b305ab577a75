//! Block storage API error types

use thiserror::Error;

/// HTTP status the API uses for missing volumes and servers
pub const STATUS_NOT_FOUND: u16 = 404;

/// Error returned by a block storage API call
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    /// The API answered with a non-success status
    #[error("{detail} (status {status})")]
    Response {
        /// HTTP status code
        status: u16,
        /// Free-text detail message from the response body
        detail: String,
    },

    /// The call did not complete within the client timeout
    #[error("request timed out")]
    Timeout,

    /// The request could not be sent or the connection failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The response body could not be decoded
    #[error("invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Build a response error
    pub fn response(status: u16, detail: impl Into<String>) -> Self {
        Self::Response {
            status,
            detail: detail.into(),
        }
    }

    /// Build a not-found response error
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::response(STATUS_NOT_FOUND, detail)
    }

    /// Check if the API reported the resource as missing
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Response { status, .. } if *status == STATUS_NOT_FOUND)
    }

    /// HTTP status, when the API answered at all
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Result type for block storage API calls
pub type ApiResult<T> = Result<T, ApiError>;
