//! The client-side sync coordinator.
//!
//! Owns the ledger cache and is the only thing that writes to it. Local
//! mutations are applied optimistically, confirmed against the store, then
//! reconciled with a full authoritative refetch. Everything arriving from
//! outside (push notifications, poll snapshots, reconciliation snapshots)
//! enters through [`Ingest`] and is serialized with mutations by one lock, so
//! derived summaries are recomputed in exactly one place.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use time::format_description::well_known::Rfc3339;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use atolye_core::{Ledger, NewTransfer, NewVaultTransaction, RecordId, ValidationError};
use atolye_storage::{LedgerStore, PushEvent, PushRecv, PushSubscription, StoreError};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::state::{MutationOutcome, MutationPhase, SyncState};

/// Data entering the cache from the store rather than from a local action.
#[derive(Debug, Clone)]
pub enum Ingest {
    /// A full authoritative ledger (poll, refresh or reconciliation).
    Snapshot(Ledger),
    /// A single push notification.
    Push(PushEvent),
}

/// Derive the next cache state from `current` and `input`.
///
/// Returns `None` when the input changes nothing.
fn absorb(current: &SyncState, input: Ingest) -> Option<SyncState> {
    match input {
        Ingest::Snapshot(ledger) => {
            if ledger == current.ledger && !current.stale {
                return None;
            }
            let mut next = current.with_ledger(ledger);
            next.stale = false;
            Some(next)
        }
        Ingest::Push(event) => {
            let mut ledger = current.ledger.clone();
            if !event.apply(&mut ledger) {
                debug!(kind = event.kind(), id = event.record_id(), "push notification already reflected");
                return None;
            }
            debug!(kind = event.kind(), id = event.record_id(), "applied push notification");
            Some(current.with_ledger(ledger))
        }
    }
}

// ── Mutations ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum Target {
    Transfer,
    Vault,
}

enum Mutation {
    CreateTransfer(NewTransfer),
    DeleteTransfer(RecordId),
    CreateVault(NewVaultTransaction),
    DeleteVault(RecordId),
}

impl Mutation {
    fn describe(&self) -> &'static str {
        match self {
            Mutation::CreateTransfer(_) => "create transfer",
            Mutation::DeleteTransfer(_) => "delete transfer",
            Mutation::CreateVault(_) => "create vault transaction",
            Mutation::DeleteVault(_) => "delete vault transaction",
        }
    }

    fn target(&self) -> Target {
        match self {
            Mutation::CreateTransfer(_) | Mutation::DeleteTransfer(_) => Target::Transfer,
            Mutation::CreateVault(_) | Mutation::DeleteVault(_) => Target::Vault,
        }
    }

    fn is_create(&self) -> bool {
        matches!(self, Mutation::CreateTransfer(_) | Mutation::CreateVault(_))
    }

    fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Mutation::CreateTransfer(t) => t.validate(),
            Mutation::CreateVault(v) => v.validate(),
            Mutation::DeleteTransfer(_) | Mutation::DeleteVault(_) => Ok(()),
        }
    }

    /// The local guess at what the store will do.
    fn apply_optimistic(&self, ledger: &mut Ledger, provisional_id: &str, created_at: &str) {
        match self {
            Mutation::CreateTransfer(t) => {
                ledger.insert_transfer(
                    t.clone()
                        .into_event(provisional_id.to_string(), created_at.to_string()),
                );
            }
            Mutation::DeleteTransfer(id) => {
                ledger.remove_transfer(id);
            }
            Mutation::CreateVault(v) => {
                ledger.insert_vault_transaction(
                    v.clone()
                        .into_transaction(provisional_id.to_string(), created_at.to_string()),
                );
            }
            Mutation::DeleteVault(id) => {
                ledger.remove_vault_transaction(id);
            }
        }
    }

    async fn send<S: LedgerStore>(self, store: &S) -> Result<RecordId, StoreError> {
        match self {
            Mutation::CreateTransfer(t) => store.create_transfer(t).await,
            Mutation::DeleteTransfer(id) => {
                store.delete_transfer(&id).await?;
                Ok(id)
            }
            Mutation::CreateVault(v) => store.create_vault_transaction(v).await,
            Mutation::DeleteVault(id) => {
                store.delete_vault_transaction(&id).await?;
                Ok(id)
            }
        }
    }
}

/// Whether the authoritative `ledger` contradicts a confirmed mutation.
fn contradicts(ledger: &Ledger, target: Target, id: &str, created: bool) -> bool {
    let present = match target {
        Target::Transfer => ledger.contains_transfer(id),
        Target::Vault => ledger.contains_vault_transaction(id),
    };
    present != created
}

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

// ── Coordinator ──────────────────────────────────────────────────────────────

/// Single owner of a client's ledger cache.
///
/// Share it behind an `Arc`: one task drives [`run`](Self::run) while any
/// number of callers mutate and read snapshots.
pub struct SyncCoordinator<S: LedgerStore> {
    store: Arc<S>,
    state: watch::Sender<Arc<SyncState>>,
    /// Held for every mutation and ingestion; every publish happens under it.
    write: Mutex<()>,
    poll_interval: Duration,
    request_timeout: Duration,
    provisional: AtomicU64,
}

impl<S: LedgerStore> SyncCoordinator<S> {
    pub fn new(store: Arc<S>, config: &SyncConfig) -> Self {
        Self::with_timing(store, config.poll_interval(), config.request_timeout())
    }

    pub fn with_timing(store: Arc<S>, poll_interval: Duration, request_timeout: Duration) -> Self {
        // Nothing fetched yet.
        let initial = SyncState {
            stale: true,
            ..SyncState::default()
        };
        let (state, _) = watch::channel(Arc::new(initial));
        SyncCoordinator {
            store,
            state,
            write: Mutex::new(()),
            poll_interval,
            request_timeout,
            provisional: AtomicU64::new(0),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The current cache state.
    pub fn snapshot(&self) -> Arc<SyncState> {
        self.state.borrow().clone()
    }

    /// A receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SyncState>> {
        self.state.subscribe()
    }

    pub async fn create_transfer(&self, transfer: NewTransfer) -> Result<MutationOutcome, SyncError> {
        self.mutate(Mutation::CreateTransfer(transfer)).await
    }

    pub async fn delete_transfer(&self, id: &str) -> Result<MutationOutcome, SyncError> {
        self.mutate(Mutation::DeleteTransfer(id.to_string())).await
    }

    pub async fn create_vault_transaction(
        &self,
        transaction: NewVaultTransaction,
    ) -> Result<MutationOutcome, SyncError> {
        self.mutate(Mutation::CreateVault(transaction)).await
    }

    pub async fn delete_vault_transaction(&self, id: &str) -> Result<MutationOutcome, SyncError> {
        self.mutate(Mutation::DeleteVault(id.to_string())).await
    }

    /// Replace the cache with a fresh authoritative ledger.
    ///
    /// On failure the cache keeps its last known-good contents and is marked
    /// stale.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let _guard = self.write.lock().await;
        match self.call(self.store.fetch_ledger()).await {
            Ok(ledger) => {
                self.ingest_locked(Ingest::Snapshot(ledger));
                Ok(())
            }
            Err(err) => {
                self.mark_stale_locked();
                Err(err.into())
            }
        }
    }

    /// Apply externally sourced data. Returns whether the cache changed.
    pub async fn ingest(&self, input: Ingest) -> bool {
        let _guard = self.write.lock().await;
        self.ingest_locked(input)
    }

    /// Drive push ingestion and polling until `shutdown` resolves.
    ///
    /// While a push channel is connected, poll ticks only refetch if the cache
    /// is stale. When the channel closes, the coordinator polls and retries
    /// subscribing on every tick.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        // Subscribe before the first fetch so nothing committed in between is lost.
        let mut push = self.connect_push().await;
        self.refresh_logged().await;

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.reset();

        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            push = push.is_some(),
            "sync coordinator running"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("sync coordinator shutting down");
                    return;
                }
                received = next_push(&mut push) => match received {
                    PushRecv::Event(event) => {
                        self.ingest(Ingest::Push(event)).await;
                    }
                    PushRecv::Lagged(missed) => {
                        warn!(missed, "push subscriber lagged, refetching full ledger");
                        self.refresh_logged().await;
                    }
                    PushRecv::Closed => {
                        warn!("push channel closed, falling back to polling");
                        push = None;
                        self.set_push_connected(false).await;
                    }
                },
                _ = ticker.tick() => {
                    if push.is_none() {
                        push = self.connect_push().await;
                        self.refresh_logged().await;
                    } else if self.snapshot().stale {
                        self.refresh_logged().await;
                    }
                }
            }
        }
    }

    // ── Internals ────────────────────────────────────────────────────────────

    async fn mutate(&self, mutation: Mutation) -> Result<MutationOutcome, SyncError> {
        // Invalid requests never touch the cache.
        mutation.validate()?;

        let _guard = self.write.lock().await;
        let before = self.snapshot();
        let describe = mutation.describe();
        let target = mutation.target();
        let created = mutation.is_create();

        // Pending
        let provisional_id = format!(
            "pending-{}",
            self.provisional.fetch_add(1, Ordering::Relaxed) + 1
        );
        let mut optimistic = before.ledger.clone();
        mutation.apply_optimistic(&mut optimistic, &provisional_id, &now_rfc3339());
        let mut pending = before.with_ledger(optimistic);
        pending.phase = MutationPhase::Pending;
        self.publish(pending);
        debug!(mutation = describe, %provisional_id, "optimistic change applied");

        // Confirming
        self.set_phase_locked(MutationPhase::Confirming);
        let id = match self.call(mutation.send(self.store.as_ref())).await {
            Ok(id) => id,
            Err(err) => {
                warn!(mutation = describe, error = %err, "store refused mutation, rolling back");
                let mut restored = (*before).clone();
                restored.phase = MutationPhase::RolledBack;
                self.publish(restored);
                return Err(err.into());
            }
        };

        // Reconciling
        self.set_phase_locked(MutationPhase::Reconciling);
        match self.call(self.store.fetch_ledger()).await {
            Ok(ledger) => {
                let conflict = contradicts(&ledger, target, &id, created);
                if conflict {
                    info!(mutation = describe, %id, "authoritative ledger disagrees, adopting server state");
                }
                let current = self.snapshot();
                let mut next = absorb(&current, Ingest::Snapshot(ledger))
                    .unwrap_or_else(|| (*current).clone());
                next.phase = MutationPhase::Settled;
                self.publish(next);
                debug!(mutation = describe, %id, "mutation reconciled");
                Ok(MutationOutcome {
                    id,
                    reconciled: true,
                    conflict,
                })
            }
            Err(err) => {
                warn!(
                    mutation = describe,
                    %id,
                    error = %err,
                    "reconciliation refetch failed, keeping last known-good state"
                );
                let mut kept = (*before).clone();
                kept.phase = MutationPhase::Settled;
                kept.stale = true;
                self.publish(kept);
                Ok(MutationOutcome {
                    id,
                    reconciled: false,
                    conflict: false,
                })
            }
        }
    }

    fn ingest_locked(&self, input: Ingest) -> bool {
        match absorb(&self.snapshot(), input) {
            Some(next) => {
                self.publish(next);
                true
            }
            None => false,
        }
    }

    fn set_phase_locked(&self, phase: MutationPhase) {
        let mut next = (*self.snapshot()).clone();
        next.phase = phase;
        self.publish(next);
    }

    fn mark_stale_locked(&self) {
        let current = self.snapshot();
        if current.stale {
            return;
        }
        let mut next = (*current).clone();
        next.stale = true;
        self.publish(next);
    }

    async fn set_push_connected(&self, connected: bool) {
        let _guard = self.write.lock().await;
        let current = self.snapshot();
        if current.push_connected == connected {
            return;
        }
        let mut next = (*current).clone();
        next.push_connected = connected;
        self.publish(next);
    }

    async fn connect_push(&self) -> Option<PushSubscription> {
        let subscription = self.store.subscribe().await;
        if subscription.is_some() {
            info!("push channel connected");
        }
        self.set_push_connected(subscription.is_some()).await;
        subscription
    }

    async fn refresh_logged(&self) {
        if let Err(err) = self.refresh().await {
            warn!(error = %err, "ledger refetch failed");
        }
    }

    /// Replace the published state, bumping the revision.
    fn publish(&self, mut next: SyncState) {
        next.revision = self.state.borrow().revision + 1;
        self.state.send_replace(Arc::new(next));
    }

    async fn call<T>(
        &self,
        request: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                millis: u64::try_from(self.request_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

async fn next_push(push: &mut Option<PushSubscription>) -> PushRecv {
    match push {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}
