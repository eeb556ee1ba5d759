use atolye_core::ValidationError;
use atolye_storage::StoreError;

/// Why a coordinator mutation or refresh failed.
///
/// By the time a caller sees one of these the cache has already been rolled
/// back to its pre-mutation state.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
    /// Rejected locally or by the store. Retrying the same request is pointless.
    #[error("invalid mutation: {0}")]
    Validation(#[from] ValidationError),

    /// The store was unreachable or too slow. The caller may retry.
    #[error("store unavailable: {0}")]
    Transient(StoreError),

    /// Any other store failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl SyncError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(v) => SyncError::Validation(v),
            e if e.is_transient() => SyncError::Transient(e),
            e => SyncError::Store(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atolye_core::UnitId;

    #[test]
    fn store_rejection_becomes_validation() {
        let err = SyncError::from(StoreError::Rejected(ValidationError::SameUnit {
            unit: UnitId::Cila,
        }));
        assert!(matches!(err, SyncError::Validation(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn timeout_is_retryable() {
        let err = SyncError::from(StoreError::Timeout { millis: 10 });
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "store unavailable: store request timed out after 10 ms"
        );
    }

    #[test]
    fn backend_failure_is_not_retryable() {
        let err = SyncError::from(StoreError::Backend("disk full".into()));
        assert!(matches!(err, SyncError::Store(_)));
    }
}
