use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use atolye_core::{Ledger, RecordId, TransferEvent, VaultTransaction};

/// A server-originated ledger notification.
///
/// Notifications always carry the full record (never a diff), so a client
/// can apply them without re-deriving anything.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PushEvent {
    #[serde(rename = "transfer.created")]
    TransferCreated { event: TransferEvent },
    /// Full replacement of a record with the same id.
    #[serde(rename = "transfer.updated")]
    TransferUpdated { event: TransferEvent },
    #[serde(rename = "transfer.deleted")]
    TransferDeleted { id: RecordId },
    #[serde(rename = "vault.created")]
    VaultCreated { event: VaultTransaction },
    #[serde(rename = "vault.updated")]
    VaultUpdated { event: VaultTransaction },
    #[serde(rename = "vault.deleted")]
    VaultDeleted { id: RecordId },
}

impl PushEvent {
    /// Apply the notification to `ledger`. Returns whether the ledger changed.
    ///
    /// A `created` for an id already present and a `deleted` for an absent id
    /// are no-ops, so replaying a notification is harmless.
    pub fn apply(&self, ledger: &mut Ledger) -> bool {
        match self {
            PushEvent::TransferCreated { event } => ledger.insert_transfer(event.clone()),
            PushEvent::TransferUpdated { event } => {
                match ledger.transfers.iter_mut().find(|t| t.id == event.id) {
                    Some(existing) if existing == event => false,
                    Some(existing) => {
                        *existing = event.clone();
                        true
                    }
                    None => ledger.insert_transfer(event.clone()),
                }
            }
            PushEvent::TransferDeleted { id } => ledger.remove_transfer(id),
            PushEvent::VaultCreated { event } => ledger.insert_vault_transaction(event.clone()),
            PushEvent::VaultUpdated { event } => {
                match ledger.vault.iter_mut().find(|t| t.id == event.id) {
                    Some(existing) if existing == event => false,
                    Some(existing) => {
                        *existing = event.clone();
                        true
                    }
                    None => ledger.insert_vault_transaction(event.clone()),
                }
            }
            PushEvent::VaultDeleted { id } => ledger.remove_vault_transaction(id),
        }
    }

    /// Id of the record this notification is about.
    pub fn record_id(&self) -> &str {
        match self {
            PushEvent::TransferCreated { event } | PushEvent::TransferUpdated { event } => &event.id,
            PushEvent::VaultCreated { event } | PushEvent::VaultUpdated { event } => &event.id,
            PushEvent::TransferDeleted { id } | PushEvent::VaultDeleted { id } => id,
        }
    }

    /// The `type` tag as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::TransferCreated { .. } => "transfer.created",
            PushEvent::TransferUpdated { .. } => "transfer.updated",
            PushEvent::TransferDeleted { .. } => "transfer.deleted",
            PushEvent::VaultCreated { .. } => "vault.created",
            PushEvent::VaultUpdated { .. } => "vault.updated",
            PushEvent::VaultDeleted { .. } => "vault.deleted",
        }
    }
}

/// Outcome of waiting on a push subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushRecv {
    Event(PushEvent),
    /// The subscriber fell behind and `n` notifications were dropped.
    /// Incremental state can no longer be trusted; refetch.
    Lagged(u64),
    /// The channel is gone. Fall back to polling.
    Closed,
}

/// A live connection to a store's push channel.
#[derive(Debug)]
pub struct PushSubscription {
    source: Source,
}

#[derive(Debug)]
enum Source {
    /// In-process broadcast from the store itself.
    Broadcast(broadcast::Receiver<PushEvent>),
    /// Fed by a reader task for a remote channel. Dropping the sender closes it.
    Forwarded(mpsc::Receiver<PushRecv>),
}

impl PushSubscription {
    pub fn new(rx: broadcast::Receiver<PushEvent>) -> Self {
        PushSubscription {
            source: Source::Broadcast(rx),
        }
    }

    /// A subscription whose notifications arrive already classified, for
    /// transports that carry lag signals of their own.
    pub fn forwarded(rx: mpsc::Receiver<PushRecv>) -> Self {
        PushSubscription {
            source: Source::Forwarded(rx),
        }
    }

    pub async fn recv(&mut self) -> PushRecv {
        match &mut self.source {
            Source::Broadcast(rx) => match rx.recv().await {
                Ok(event) => PushRecv::Event(event),
                Err(broadcast::error::RecvError::Lagged(n)) => PushRecv::Lagged(n),
                Err(broadcast::error::RecvError::Closed) => PushRecv::Closed,
            },
            Source::Forwarded(rx) => rx.recv().await.unwrap_or(PushRecv::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atolye_core::{Karat, NewTransfer, UnitId};

    fn event(id: &str) -> TransferEvent {
        NewTransfer::new(UnitId::Kasa, UnitId::Cila, "2".parse().unwrap(), Karat::K14)
            .into_event(id.to_string(), "2026-01-01T00:00:00Z".to_string())
    }

    #[test]
    fn wire_format_is_type_tagged() {
        let json = serde_json::to_value(PushEvent::TransferDeleted { id: "tr-9".into() }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "transfer.deleted", "id": "tr-9"}));

        let parsed: PushEvent = serde_json::from_value(serde_json::json!({
            "type": "transfer.created",
            "event": serde_json::to_value(event("tr-1")).unwrap(),
        }))
        .unwrap();
        assert_eq!(parsed.kind(), "transfer.created");
        assert_eq!(parsed.record_id(), "tr-1");
    }

    #[test]
    fn duplicate_created_is_ignored() {
        let mut once = Ledger::default();
        let push = PushEvent::TransferCreated { event: event("tr-1") };
        assert!(push.apply(&mut once));
        let mut twice = once.clone();
        assert!(!push.apply(&mut twice));
        assert_eq!(once, twice);
    }

    #[test]
    fn delete_of_absent_id_is_a_no_op() {
        let mut ledger = Ledger::default();
        assert!(!PushEvent::TransferDeleted { id: "nope".into() }.apply(&mut ledger));
    }

    #[test]
    fn updated_replaces_record() {
        let mut ledger = Ledger::default();
        PushEvent::TransferCreated { event: event("tr-1") }.apply(&mut ledger);
        let mut changed = event("tr-1");
        changed.notes = Some("tartım düzeltildi".into());
        assert!(PushEvent::TransferUpdated { event: changed.clone() }.apply(&mut ledger));
        assert_eq!(ledger.transfers, vec![changed]);
    }

    #[tokio::test]
    async fn forwarded_subscription_closes_with_its_sender() {
        let (tx, rx) = mpsc::channel(4);
        let mut sub = PushSubscription::forwarded(rx);
        tx.send(PushRecv::Lagged(3)).await.unwrap();
        drop(tx);
        assert_eq!(sub.recv().await, PushRecv::Lagged(3));
        assert_eq!(sub.recv().await, PushRecv::Closed);
    }

    #[tokio::test]
    async fn broadcast_overflow_reports_lag() {
        let (tx, rx) = broadcast::channel(1);
        let mut sub = PushSubscription::new(rx);
        tx.send(PushEvent::TransferDeleted { id: "a".into() }).unwrap();
        tx.send(PushEvent::TransferDeleted { id: "b".into() }).unwrap();
        assert_eq!(sub.recv().await, PushRecv::Lagged(1));
        assert_eq!(
            sub.recv().await,
            PushRecv::Event(PushEvent::TransferDeleted { id: "b".into() })
        );
    }
}
