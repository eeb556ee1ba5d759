use std::fmt;

use serde::Serialize;

use atolye_core::{IntegrityWarning, Ledger, RecordId, WorkshopSummary};

/// Where the most recent local mutation stands.
///
/// ```text
/// Pending ──► Confirming ──► Reconciling ──► Settled
///    │             │
///    └─────────────┴──► RolledBack
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPhase {
    /// Validated and applied to the cache; not yet sent.
    Pending,
    /// Sent to the store, awaiting its answer.
    Confirming,
    /// Store accepted it; refetching the authoritative ledger.
    Reconciling,
    /// Store refused it or never answered; the cache was restored.
    RolledBack,
    /// No mutation in flight.
    #[default]
    Settled,
}

impl MutationPhase {
    pub fn in_flight(self) -> bool {
        matches!(
            self,
            MutationPhase::Pending | MutationPhase::Confirming | MutationPhase::Reconciling
        )
    }
}

impl fmt::Display for MutationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MutationPhase::Pending => "pending",
            MutationPhase::Confirming => "confirming",
            MutationPhase::Reconciling => "reconciling",
            MutationPhase::RolledBack => "rolled back",
            MutationPhase::Settled => "settled",
        };
        f.write_str(s)
    }
}

/// An immutable view of the client cache. Consumers hold it behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub ledger: Ledger,
    pub summary: WorkshopSummary,
    pub warnings: Vec<IntegrityWarning>,
    /// Bumped on every published change.
    pub revision: u64,
    pub phase: MutationPhase,
    pub push_connected: bool,
    /// The cache may be behind the store; the next run-loop tick refetches.
    pub stale: bool,
}

impl SyncState {
    pub fn new(ledger: Ledger) -> Self {
        let summary = ledger.summarize();
        let warnings = ledger.audit();
        SyncState {
            ledger,
            summary,
            warnings,
            revision: 0,
            phase: MutationPhase::Settled,
            push_connected: false,
            stale: false,
        }
    }

    /// Same flags and revision as `self`, derived data recomputed for `ledger`.
    pub(crate) fn with_ledger(&self, ledger: Ledger) -> Self {
        SyncState {
            revision: self.revision,
            phase: self.phase,
            push_connected: self.push_connected,
            stale: self.stale,
            ..SyncState::new(ledger)
        }
    }

    /// Whether the ledger, and therefore every derived number, matches `other`.
    pub fn same_data(&self, other: &SyncState) -> bool {
        self.ledger == other.ledger
    }
}

impl Default for SyncState {
    fn default() -> Self {
        SyncState::new(Ledger::default())
    }
}

/// What a successful mutation ended up as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationOutcome {
    /// Store-assigned id for creates; the target id for deletes.
    pub id: RecordId,
    /// The cache was replaced with a fresh authoritative snapshot.
    pub reconciled: bool,
    /// The authoritative snapshot disagreed with the mutation (the created
    /// record was missing, or the deleted one still present). Server wins.
    pub conflict: bool,
}
