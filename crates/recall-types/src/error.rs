use thiserror::Error;

/// Errors from index and document-store operations (used by trait definitions in recall-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("storage connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("corrupt document: {0}")]
    Corrupt(String),
}

/// Errors from the external embedding and generation providers.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("rate limited (retry after {retry_after_ms:?} ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("provider request timed out")]
    Timeout,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("provider error: {message}")]
    Provider { message: String },
}

impl ProviderError {
    /// Whether a failed call is worth repeating.
    ///
    /// Rate limits, timeouts, and transient unavailability are retryable.
    /// Authentication failures and malformed responses are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. } | ProviderError::Timeout | ProviderError::Unavailable(_)
        )
    }

    /// Server-requested backoff, when the provider supplied one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => *retry_after_ms,
            _ => None,
        }
    }
}

/// Errors surfaced by engine-level memory operations.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("memory rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::Query("bad filter".to_string());
        assert_eq!(err.to_string(), "query error: bad filter");
    }

    #[test]
    fn test_corrupt_error_display() {
        let err = RepositoryError::Corrupt("expected value at line 1".to_string());
        assert!(err.to_string().starts_with("corrupt document"));
    }

    #[test]
    fn test_provider_error_retry_classification() {
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::RateLimited { retry_after_ms: Some(10) }.is_retryable());
        assert!(ProviderError::Unavailable("503".into()).is_retryable());
        assert!(!ProviderError::AuthenticationFailed.is_retryable());
        assert!(!ProviderError::InvalidResponse("no json".into()).is_retryable());
        assert!(!ProviderError::Provider { message: "boom".into() }.is_retryable());
    }

    #[test]
    fn test_retry_after_only_for_rate_limit() {
        let err = ProviderError::RateLimited { retry_after_ms: Some(1500) };
        assert_eq!(err.retry_after_ms(), Some(1500));
        assert_eq!(ProviderError::Timeout.retry_after_ms(), None);
    }

    #[test]
    fn test_memory_error_from_provider() {
        let err: MemoryError = ProviderError::Timeout.into();
        assert_eq!(err.to_string(), "provider request timed out");
    }
}
