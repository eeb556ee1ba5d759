use async_trait::async_trait;

use atolye_core::{Ledger, NewTransfer, NewVaultTransaction, RecordId, TransferEvent, VaultTransaction};

use crate::error::StoreError;
use crate::push::PushSubscription;

/// The remote store contract the sync coordinator depends on.
///
/// A `LedgerStore` owns the authoritative transfer ledger and the external
/// vault ledger. Clients only ever list, create and delete records; nothing
/// is edited in place.
///
/// ## Validation
///
/// `create_transfer` must reject a request whose source and destination are
/// the same unit, whose source is an output-only unit, or whose amount is not
/// positive, returning
/// `Err(StoreError::Rejected(..))` and leaving the ledger unchanged.
///
/// ## Idempotent deletes
///
/// Deleting an id that does not exist (never created, or already deleted)
/// succeeds. Two clients deleting the same record concurrently both see `Ok`.
///
/// ## Push channel
///
/// A backend with a realtime channel returns a [`PushSubscription`] from
/// [`subscribe`](LedgerStore::subscribe); every committed create/delete is
/// then published to all subscribers as a full record. Backends without one
/// return `None` and clients fall back to polling.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared between the
/// coordinator's run loop, mutation callers and axum application state.
#[async_trait]
pub trait LedgerStore: Send + Sync + 'static {
    // ── Transfers ────────────────────────────────────────────────────────────

    /// Every transfer currently in the ledger, in store order.
    async fn list_transfers(&self) -> Result<Vec<TransferEvent>, StoreError>;

    /// Validate and append a transfer. Returns the store-assigned id.
    async fn create_transfer(&self, transfer: NewTransfer) -> Result<RecordId, StoreError>;

    /// Remove a transfer. Idempotent.
    async fn delete_transfer(&self, id: &str) -> Result<(), StoreError>;

    // ── External vault ───────────────────────────────────────────────────────

    async fn list_vault_transactions(&self) -> Result<Vec<VaultTransaction>, StoreError>;

    /// Validate and append a vault transaction. Returns the store-assigned id.
    async fn create_vault_transaction(
        &self,
        transaction: NewVaultTransaction,
    ) -> Result<RecordId, StoreError>;

    /// Remove a vault transaction. Idempotent.
    async fn delete_vault_transaction(&self, id: &str) -> Result<(), StoreError>;

    // ── Whole-ledger helpers ─────────────────────────────────────────────────

    /// Fetch both ledgers. Fails if either list fails; never returns half a ledger.
    async fn fetch_ledger(&self) -> Result<Ledger, StoreError> {
        let transfers = self.list_transfers().await?;
        let vault = self.list_vault_transactions().await?;
        Ok(Ledger::new(transfers, vault))
    }

    /// Open the push channel, if this backend has one.
    ///
    /// Returns once the channel is live: every commit after this call is
    /// delivered on the subscription.
    async fn subscribe(&self) -> Option<PushSubscription> {
        None
    }
}
