//! Error surface of the memory core.
//!
//! One enum covers every public operation. Backend errors (`StoreError`) are
//! converted at the service boundary; single-tier failures during search are
//! downgraded to a `partial` response instead of surfacing here.

use crate::store::StoreError;

/// Error type returned by the public service surface
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// No record with the given id in any tier
    #[error("Record not found: {0}")]
    NotFound(String),
    /// Caller-supplied input failed validation; never retried
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    /// A storage backend refused or failed the call
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
    /// The operation deadline elapsed before completion
    #[error("Deadline exceeded")]
    DeadlineExceeded,
    /// Concurrent modification or duplicate detected
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The record was expired for privacy reasons and is inside its
    /// tombstone grace window
    #[error("Record expired for privacy: {0}")]
    PrivacyExpired(String),
    /// Bug or unexpected internal condition
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result alias for the service surface
pub type Result<T> = std::result::Result<T, MemoryError>;

impl From<StoreError> for MemoryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => MemoryError::NotFound(id),
            StoreError::Conflict(msg) => MemoryError::Conflict(msg),
            StoreError::Unavailable(msg) => MemoryError::BackendUnavailable(msg),
            StoreError::Unsupported(what) => {
                MemoryError::Internal(format!("backend capability missing: {what}"))
            }
        }
    }
}

impl From<std::io::Error> for MemoryError {
    fn from(err: std::io::Error) -> Self {
        MemoryError::Internal(format!("io: {err}"))
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        MemoryError::Internal(format!("serialization: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_conversion() {
        let err: MemoryError = StoreError::NotFound("mem_1_abc".into()).into();
        assert!(matches!(err, MemoryError::NotFound(_)));

        let err: MemoryError = StoreError::Unavailable("warm down".into()).into();
        assert!(matches!(err, MemoryError::BackendUnavailable(_)));

        let err: MemoryError = StoreError::Conflict("stale put".into()).into();
        assert!(matches!(err, MemoryError::Conflict(_)));
    }

    #[test]
    fn test_display_messages() {
        let err = MemoryError::PrivacyExpired("mem_1_abc".into());
        assert!(err.to_string().contains("mem_1_abc"));

        assert_eq!(MemoryError::DeadlineExceeded.to_string(), "Deadline exceeded");
    }
}
