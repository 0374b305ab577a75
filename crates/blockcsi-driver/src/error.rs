//! Caller-facing error taxonomy
//!
//! Every controller operation fails with a [`CsiError`]. The gRPC layer turns
//! it into a [`tonic::Status`] with the matching code.

use blockcsi_cloud::ApiError;
use thiserror::Error;
use tonic::{Code, Status};

/// Controller operation error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CsiError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    ResourceExhausted(String),

    #[error("{0}")]
    Aborted(String),

    #[error("{0}")]
    OutOfRange(String),

    #[error("{0}")]
    Internal(String),

    #[error("{0}")]
    Unimplemented(String),

    /// Backend failure passed through without translation
    #[error(transparent)]
    Backend(#[from] ApiError),
}

impl CsiError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        Self::Internal(e.to_string())
    }

    /// gRPC status code for this error
    #[must_use]
    pub const fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::NotFound(_) => Code::NotFound,
            Self::AlreadyExists(_) => Code::AlreadyExists,
            Self::ResourceExhausted(_) => Code::ResourceExhausted,
            Self::Aborted(_) => Code::Aborted,
            Self::OutOfRange(_) => Code::OutOfRange,
            Self::Internal(_) => Code::Internal,
            Self::Unimplemented(_) => Code::Unimplemented,
            Self::Backend(_) => Code::Unknown,
        }
    }
}

impl From<CsiError> for Status {
    fn from(e: CsiError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

/// Result type for controller operations
pub type CsiResult<T> = Result<T, CsiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_conversion() {
        let status: Status = CsiError::invalid_argument("name must be provided").into();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert_eq!(status.message(), "name must be provided");

        let status: Status = CsiError::Backend(ApiError::response(500, "boom")).into();
        assert_eq!(status.code(), Code::Unknown);
        assert_eq!(status.message(), "boom (status 500)");
    }

    #[test]
    fn test_codes() {
        assert_eq!(CsiError::Aborted(String::new()).code(), Code::Aborted);
        assert_eq!(CsiError::OutOfRange(String::new()).code(), Code::OutOfRange);
        assert_eq!(
            CsiError::Unimplemented(String::new()).code(),
            Code::Unimplemented
        );
        assert_eq!(CsiError::internal("x").code(), Code::Internal);
    }
}
