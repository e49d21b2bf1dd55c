//! Error types for the event log client.

use thiserror::Error;

/// Status codes reported by the streaming RPC transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

/// Main error type for read operations.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("connection unavailable: {message}")]
    ConnectionUnavailable { message: String },

    #[error("stream not found: {stream}")]
    StreamNotFound { stream: String },

    #[error("access denied")]
    AccessDenied,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("operation cancelled")]
    Cancelled,

    #[error("server error: {code:?} - {message}")]
    ServerError { code: StatusCode, message: String },

    #[error("decode error: {0}")]
    Decode(String),

    #[error("json error: {0}")]
    Json(String),

    #[error("messages may only be enumerated once")]
    AlreadyEnumerated,
}

impl StreamError {
    /// Create error from a transport status code.
    pub fn from_status(code: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            StatusCode::Cancelled => StreamError::Cancelled,
            StatusCode::DeadlineExceeded => StreamError::DeadlineExceeded,
            StatusCode::PermissionDenied => StreamError::AccessDenied,
            StatusCode::Unauthenticated => StreamError::NotAuthenticated,
            StatusCode::InvalidArgument => StreamError::InvalidArgument(message),
            StatusCode::Unavailable => StreamError::ConnectionUnavailable { message },
            _ => StreamError::ServerError { code, message },
        }
    }

    /// Whether this error is retryable.
    ///
    /// Only connection-level failures qualify; the read pipeline itself never
    /// retries, this is for resolvers and callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::ConnectionUnavailable { .. } => true,
            StreamError::ServerError { code, .. } => {
                matches!(code, StatusCode::Unavailable | StatusCode::Aborted)
            }
            _ => false,
        }
    }

    /// Whether the caller aborted the operation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StreamError::Cancelled)
    }

    /// Transport status code if applicable
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            StreamError::InvalidArgument(_) => Some(StatusCode::InvalidArgument),
            StreamError::ConnectionUnavailable { .. } => Some(StatusCode::Unavailable),
            StreamError::StreamNotFound { .. } => Some(StatusCode::NotFound),
            StreamError::AccessDenied => Some(StatusCode::PermissionDenied),
            StreamError::NotAuthenticated => Some(StatusCode::Unauthenticated),
            StreamError::DeadlineExceeded => Some(StatusCode::DeadlineExceeded),
            StreamError::Cancelled => Some(StatusCode::Cancelled),
            StreamError::ServerError { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        StreamError::InvalidArgument(message.into())
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Json(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_known_codes() {
        assert!(StreamError::from_status(StatusCode::Cancelled, "").is_cancelled());
        assert!(matches!(
            StreamError::from_status(StatusCode::PermissionDenied, "nope"),
            StreamError::AccessDenied
        ));
        assert!(matches!(
            StreamError::from_status(StatusCode::Unavailable, "leader gone"),
            StreamError::ConnectionUnavailable { .. }
        ));
        assert!(matches!(
            StreamError::from_status(StatusCode::Internal, "boom"),
            StreamError::ServerError {
                code: StatusCode::Internal,
                ..
            }
        ));
    }

    #[test]
    fn test_retryable() {
        assert!(StreamError::ConnectionUnavailable {
            message: "down".into()
        }
        .is_retryable());
        assert!(!StreamError::Cancelled.is_retryable());
        assert!(!StreamError::AlreadyEnumerated.is_retryable());
        assert!(!StreamError::StreamNotFound {
            stream: "orders".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_status_code_round_trips_through_from_status() {
        let err = StreamError::from_status(StatusCode::DeadlineExceeded, "late");
        assert_eq!(err.status_code(), Some(StatusCode::DeadlineExceeded));
    }
}
