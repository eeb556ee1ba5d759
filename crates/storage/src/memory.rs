//! In-process `LedgerStore` with a broadcast push channel.
//!
//! Backs the reference HTTP server and every coordinator test. Ids are
//! sequential (`tr-000001`, `vt-000001`) and timestamps come from the wall clock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use time::format_description::well_known::Rfc3339;
use tokio::sync::broadcast;

use atolye_core::{
    Ledger, NewTransfer, NewVaultTransaction, RecordId, TransferEvent, VaultTransaction,
};

use crate::error::StoreError;
use crate::push::{PushEvent, PushSubscription};
use crate::traits::LedgerStore;

/// Buffered notifications per subscriber before it is reported as lagged.
const PUSH_CAPACITY: usize = 256;

#[derive(Default)]
struct Inner {
    ledger: Ledger,
    next_id: u64,
}

impl Inner {
    fn allocate_id(&mut self, prefix: &str) -> RecordId {
        loop {
            self.next_id += 1;
            let id = format!("{prefix}-{:06}", self.next_id);
            if !self.ledger.contains_transfer(&id) && !self.ledger.contains_vault_transaction(&id) {
                return id;
            }
        }
    }
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    push: Mutex<Option<broadcast::Sender<PushEvent>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with the push channel open.
    pub fn new() -> Self {
        Self::seeded(Ledger::default())
    }

    /// Empty store that never offers a push channel.
    pub fn without_push() -> Self {
        let store = Self::new();
        store.close_push();
        store
    }

    /// Store pre-loaded with `ledger`. Seed records keep their ids.
    pub fn seeded(ledger: Ledger) -> Self {
        let (tx, _) = broadcast::channel(PUSH_CAPACITY);
        MemoryStore {
            inner: Mutex::new(Inner { ledger, next_id: 0 }),
            push: Mutex::new(Some(tx)),
        }
    }

    /// Current contents, for inspection.
    pub fn snapshot(&self) -> Ledger {
        self.lock().ledger.clone()
    }

    /// Drop the push sender. Existing subscribers see `Closed`; new
    /// subscriptions get `None` until [`reopen_push`](Self::reopen_push).
    pub fn close_push(&self) {
        let mut push = self.push.lock().unwrap_or_else(PoisonError::into_inner);
        if push.take().is_some() {
            tracing::info!("memory store push channel closed");
        }
    }

    pub fn reopen_push(&self) {
        let mut push = self.push.lock().unwrap_or_else(PoisonError::into_inner);
        if push.is_none() {
            let (tx, _) = broadcast::channel(PUSH_CAPACITY);
            *push = Some(tx);
            tracing::info!("memory store push channel reopened");
        }
    }

    /// Number of live push subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.push
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |tx| tx.receiver_count())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: PushEvent) {
        let push = self.push.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = push.as_ref() {
            // No receivers is not an error: nobody is listening right now.
            let _ = tx.send(event);
        }
    }
}

pub(crate) fn now_rfc3339() -> Result<String, StoreError> {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| StoreError::Backend(format!("timestamp formatting failed: {e}")))
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn list_transfers(&self) -> Result<Vec<TransferEvent>, StoreError> {
        Ok(self.lock().ledger.transfers.clone())
    }

    async fn create_transfer(&self, transfer: NewTransfer) -> Result<RecordId, StoreError> {
        transfer.validate()?;
        let created_at = now_rfc3339()?;
        let mut inner = self.lock();
        let id = inner.allocate_id("tr");
        let event = transfer.into_event(id.clone(), created_at);
        tracing::debug!(%id, from = %event.from_unit, to = %event.to_unit, "transfer created");
        inner.ledger.insert_transfer(event.clone());
        // Published under the ledger lock so notification order is commit order.
        self.publish(PushEvent::TransferCreated { event });
        Ok(id)
    }

    async fn delete_transfer(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.ledger.remove_transfer(id) {
            tracing::debug!(%id, "transfer deleted");
            self.publish(PushEvent::TransferDeleted { id: id.to_string() });
        }
        Ok(())
    }

    async fn list_vault_transactions(&self) -> Result<Vec<VaultTransaction>, StoreError> {
        Ok(self.lock().ledger.vault.clone())
    }

    async fn create_vault_transaction(
        &self,
        transaction: NewVaultTransaction,
    ) -> Result<RecordId, StoreError> {
        transaction.validate()?;
        let created_at = now_rfc3339()?;
        let mut inner = self.lock();
        let id = inner.allocate_id("vt");
        let tx = transaction.into_transaction(id.clone(), created_at);
        tracing::debug!(%id, direction = ?tx.direction, "vault transaction created");
        inner.ledger.insert_vault_transaction(tx.clone());
        self.publish(PushEvent::VaultCreated { event: tx });
        Ok(id)
    }

    async fn delete_vault_transaction(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.ledger.remove_vault_transaction(id) {
            tracing::debug!(%id, "vault transaction deleted");
            self.publish(PushEvent::VaultDeleted { id: id.to_string() });
        }
        Ok(())
    }

    /// Both lists under one lock, so the pair is consistent.
    async fn fetch_ledger(&self) -> Result<Ledger, StoreError> {
        Ok(self.snapshot())
    }

    async fn subscribe(&self) -> Option<PushSubscription> {
        self.push
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|tx| PushSubscription::new(tx.subscribe()))
    }
}
