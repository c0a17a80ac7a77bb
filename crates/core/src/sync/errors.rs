//! Dispatch error types
//!
//! Provides error classification for remote dispatch with retry metadata.

use thiserror::Error;

/// How a dispatch failure drives the operation state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeout, 5xx, reset, offline mid-call - retried with backoff
    Transient,
    /// 401/403 - refresh credentials, retry without burning an attempt
    AuthExpired,
    /// Non-auth 4xx, malformed payload - dead-lettered immediately
    Permanent,
}

/// Errors produced by operation executors
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Authentication expired: {0}")]
    AuthExpired(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Dispatch cancelled")]
    Cancelled,
}

impl DispatchError {
    /// Classify this error for the retry state machine
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_)
            | Self::Timeout(_)
            | Self::Server(_)
            | Self::RateLimit(_)
            | Self::Cancelled => FailureKind::Transient,
            Self::AuthExpired(_) => FailureKind::AuthExpired,
            Self::Client(_) | Self::Payload(_) => FailureKind::Permanent,
        }
    }

    /// Check if another attempt can ever succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() != FailureKind::Permanent
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kinds() {
        assert_eq!(DispatchError::Network("test".to_string()).kind(), FailureKind::Transient);
        assert_eq!(DispatchError::Server("test".to_string()).kind(), FailureKind::Transient);
        assert_eq!(DispatchError::RateLimit("test".to_string()).kind(), FailureKind::Transient);
        assert_eq!(
            DispatchError::Timeout(std::time::Duration::from_secs(30)).kind(),
            FailureKind::Transient
        );
        assert_eq!(DispatchError::AuthExpired("test".to_string()).kind(), FailureKind::AuthExpired);
        assert_eq!(DispatchError::Client("test".to_string()).kind(), FailureKind::Permanent);
        assert_eq!(DispatchError::Payload("test".to_string()).kind(), FailureKind::Permanent);
    }

    #[test]
    fn test_is_retryable() {
        assert!(DispatchError::Network("test".to_string()).is_retryable());
        assert!(DispatchError::AuthExpired("test".to_string()).is_retryable());
        assert!(!DispatchError::Client("test".to_string()).is_retryable());
        assert!(!DispatchError::Payload("test".to_string()).is_retryable());
    }
}
