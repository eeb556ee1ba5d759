use atolye_core::ValidationError;

/// All errors that can be returned by a LedgerStore implementation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The store refused the mutation (same unit, non-positive amount, ...).
    #[error("rejected by store: {0}")]
    Rejected(#[from] ValidationError),

    /// The request did not reach the store or the connection failed mid-way.
    /// Safe to retry.
    #[error("store unreachable: {message}")]
    Transient { message: String },

    /// The request did not complete within the configured timeout.
    #[error("store request timed out after {millis} ms")]
    Timeout { millis: u64 },

    /// The store answered with something that is not a ledger response.
    #[error("malformed store response: {message}")]
    Malformed { message: String },

    /// A backend-specific storage error (serialization, internal failure, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the caller may retry the same request unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient { .. } | StoreError::Timeout { .. })
    }
}
