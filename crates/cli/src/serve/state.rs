//! Application state shared across request handlers.

use atolye_storage::MemoryStore;

pub(crate) struct AppState {
    /// The authoritative ledger.
    pub(crate) store: MemoryStore,
    /// Optional API key for authentication. None = no auth required.
    pub(crate) api_key: Option<String>,
}
