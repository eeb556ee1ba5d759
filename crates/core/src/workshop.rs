use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::engine::{audit_tally, IntegrityWarning, Tally, UnitSummary};
use crate::record::{TransferEvent, VaultTransaction};
use crate::unit::UnitId;
use crate::vault::{audit_vault, summarize_vault, VaultSummary};

/// Both ledgers as one immutable value: the unit of caching and recomputation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    #[serde(default)]
    pub transfers: Vec<TransferEvent>,
    #[serde(default)]
    pub vault: Vec<VaultTransaction>,
}

impl Ledger {
    pub fn new(transfers: Vec<TransferEvent>, vault: Vec<VaultTransaction>) -> Self {
        Ledger { transfers, vault }
    }

    pub fn contains_transfer(&self, id: &str) -> bool {
        self.transfers.iter().any(|t| t.id == id)
    }

    pub fn contains_vault_transaction(&self, id: &str) -> bool {
        self.vault.iter().any(|t| t.id == id)
    }

    /// Append unless a transfer with the same id is present. Returns whether it was added.
    pub fn insert_transfer(&mut self, event: TransferEvent) -> bool {
        if self.contains_transfer(&event.id) {
            return false;
        }
        self.transfers.push(event);
        true
    }

    /// Returns whether anything was removed.
    pub fn remove_transfer(&mut self, id: &str) -> bool {
        let before = self.transfers.len();
        self.transfers.retain(|t| t.id != id);
        self.transfers.len() != before
    }

    pub fn insert_vault_transaction(&mut self, tx: VaultTransaction) -> bool {
        if self.contains_vault_transaction(&tx.id) {
            return false;
        }
        self.vault.push(tx);
        true
    }

    pub fn remove_vault_transaction(&mut self, id: &str) -> bool {
        let before = self.vault.len();
        self.vault.retain(|t| t.id != id);
        self.vault.len() != before
    }

    /// Recompute every unit and the external vault from scratch.
    pub fn summarize(&self) -> WorkshopSummary {
        summarize_workshop(&self.transfers, &self.vault)
    }

    pub fn audit(&self) -> Vec<IntegrityWarning> {
        let mut warnings = audit_tally(&Tally::from_transfers(&self.transfers));
        warnings.extend(audit_vault(&self.vault));
        warnings
    }
}

/// Derived state of the whole workshop. Holds a summary for every unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkshopSummary {
    pub units: BTreeMap<UnitId, UnitSummary>,
    pub vault: VaultSummary,
    /// Transfers and vault transactions excluded as malformed.
    pub skipped_records: usize,
}

impl WorkshopSummary {
    pub fn unit(&self, unit: UnitId) -> Option<&UnitSummary> {
        self.units.get(&unit)
    }
}

pub fn summarize_workshop(
    transfers: &[TransferEvent],
    vault: &[VaultTransaction],
) -> WorkshopSummary {
    for event in transfers.iter().filter(|e| !e.is_well_formed()) {
        tracing::warn!(
            id = %event.id,
            from = %event.from_unit,
            to = %event.to_unit,
            amount = %event.amount_grams,
            "excluding malformed transfer from aggregation"
        );
    }
    for tx in vault.iter().filter(|t| !t.is_well_formed()) {
        tracing::warn!(id = %tx.id, amount = %tx.amount_grams, "excluding malformed vault transaction from aggregation");
    }

    let tally = Tally::from_transfers(transfers);
    let units = UnitId::ALL
        .into_iter()
        .map(|u| (u, tally.summarize(u, u.role())))
        .collect();
    let skipped_vault = vault.iter().filter(|t| !t.is_well_formed()).count();

    WorkshopSummary {
        units,
        vault: summarize_vault(vault),
        skipped_records: tally.skipped() + skipped_vault,
    }
}
