//! Controller error types
//!
//! Every lifecycle failure ends up as one of these variants, each with a
//! fixed gRPC status code.

use thiserror::Error;
use tonic::{Code, Status};

/// Lifecycle operation error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Missing or malformed request field
    #[error("{0}")]
    InvalidArgument(String),

    /// Another operation holds the volume lock
    #[error("concurrent operation in progress for volume: {0}")]
    Aborted(String),

    /// Volume unknown or not in a usable state
    #[error("{0}")]
    NotFound(String),

    /// No device could be allocated
    #[error("no suitable device available: {0}")]
    ResourceExhausted(String),

    /// Collaborator failure
    #[error("{0}")]
    Internal(String),

    /// RPC not provided by this driver
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}

impl ControllerError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// gRPC status code for this error
    #[must_use]
    pub const fn code(&self) -> Code {
        match self {
            Self::InvalidArgument(_) => Code::InvalidArgument,
            Self::Aborted(_) => Code::Aborted,
            Self::NotFound(_) => Code::NotFound,
            Self::ResourceExhausted(_) => Code::ResourceExhausted,
            Self::Internal(_) => Code::Internal,
            Self::Unimplemented(_) => Code::Unimplemented,
        }
    }
}

impl From<ControllerError> for Status {
    fn from(e: ControllerError) -> Self {
        Self::new(e.code(), e.to_string())
    }
}

/// Result type for lifecycle operations
pub type ControllerResult<T> = Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let status: Status = ControllerError::Aborted("vol1".into()).into();
        assert_eq!(status.code(), Code::Aborted);
        assert_eq!(
            status.message(),
            "concurrent operation in progress for volume: vol1"
        );

        let status: Status = ControllerError::Unimplemented("ListVolumes").into();
        assert_eq!(status.code(), Code::Unimplemented);
        assert_eq!(status.message(), "ListVolumes is not implemented");

        assert_eq!(
            ControllerError::ResourceExhausted("none".into()).code(),
            Code::ResourceExhausted
        );
    }
}
