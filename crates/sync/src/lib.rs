//! Client side of the atolye ledger: an optimistic, eventually consistent
//! cache over any [`LedgerStore`](atolye_storage::LedgerStore), and an HTTP
//! store implementation.

pub mod config;
mod coordinator;
mod error;
mod http;
mod state;

pub use config::{ConfigError, SyncConfig};
pub use coordinator::{Ingest, SyncCoordinator};
pub use error::SyncError;
pub use http::{HttpStore, EVENTS_PATH, LAGGED_EVENT};
pub use state::{MutationOutcome, MutationPhase, SyncState};
