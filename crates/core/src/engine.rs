//! Unit accounting engine.
//!
//! Derives stock, fire and has figures for a unit from the whole transfer
//! ledger. Nothing here is incremental: every call tallies the ledger from
//! scratch, so the same ledger always yields the same summary no matter which
//! consumer asks or in what order events arrived.
//!
//! Per unit and karat `k`, with `input(k)` the grams received and
//! `output(k)` the grams sent:
//!
//! | role            | stock                 | fire                  | has            |
//! |-----------------|-----------------------|-----------------------|----------------|
//! | Storage         | `max(0, in − out)`    | 0                     | stock × ratio  |
//! | SemiFinished    | `max(0, in − out)`    | 0                     | stock × ratio  |
//! | ProcessingFire  | 0                     | `max(0, in − out)`    | 0              |
//! | InputOnly       | `max(0, in − out)`    | 0                     | stock × ratio  |
//! | OutputOnly      | 0                     | 0                     | 0              |
//!
//! InputOnly units also report `processed = in + out`; OutputOnly units
//! report `received = in`.

use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::karat::Karat;
use crate::record::TransferEvent;
use crate::unit::{UnitId, UnitRole};

/// Decimal places kept on has-equivalents (0.1 mg).
pub const HAS_SCALE: u32 = 4;

/// Derived figures for one karat within one unit. All fields are `>= 0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KaratSummary {
    pub current_stock: Decimal,
    pub fire: Decimal,
    pub has_equivalent: Decimal,
    /// InputOnly throughput (`input + output`); zero for other roles.
    pub processed: Decimal,
    /// OutputOnly headline figure (`input`); zero for other roles.
    pub received: Decimal,
}

/// Derived state of one unit. Never persisted; rebuilt on every ledger change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitSummary {
    pub unit_id: UnitId,
    pub role: UnitRole,
    pub total_stock: Decimal,
    pub total_fire: Decimal,
    pub has_equivalent: Decimal,
    pub total_processed: Decimal,
    pub total_received: Decimal,
    /// Only karats the unit has ever moved appear here.
    pub stock_by_karat: BTreeMap<Karat, KaratSummary>,
}

impl UnitSummary {
    fn empty(unit_id: UnitId, role: UnitRole) -> Self {
        UnitSummary {
            unit_id,
            role,
            total_stock: Decimal::ZERO,
            total_fire: Decimal::ZERO,
            has_equivalent: Decimal::ZERO,
            total_processed: Decimal::ZERO,
            total_received: Decimal::ZERO,
            stock_by_karat: BTreeMap::new(),
        }
    }
}

/// Gross movement through a unit for one karat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flow {
    pub input: Decimal,
    pub output: Decimal,
}

impl Flow {
    /// Signed `input − output`, before clamping.
    pub fn net(&self) -> Decimal {
        self.input - self.output
    }
}

/// Gross input/output per unit and karat, built in one pass over a ledger.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    flows: BTreeMap<UnitId, BTreeMap<Karat, Flow>>,
    skipped: usize,
}

impl Tally {
    pub fn from_transfers(ledger: &[TransferEvent]) -> Self {
        let mut tally = Tally::default();
        for event in ledger {
            if !event.is_well_formed() {
                tracing::debug!(id = %event.id, "skipping malformed transfer in tally");
                tally.skipped += 1;
                continue;
            }
            tally.record(event.to_unit, event.karat, event.amount_grams, Decimal::ZERO);
            tally.record(event.from_unit, event.karat, Decimal::ZERO, event.amount_grams);
        }
        tally
    }

    pub(crate) fn record(&mut self, unit: UnitId, karat: Karat, input: Decimal, output: Decimal) {
        let flow = self
            .flows
            .entry(unit)
            .or_default()
            .entry(karat)
            .or_default();
        flow.input += input;
        flow.output += output;
    }

    /// Number of ledger records excluded as malformed.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn flows(&self, unit: UnitId) -> impl Iterator<Item = (Karat, Flow)> + '_ {
        self.flows
            .get(&unit)
            .into_iter()
            .flat_map(|by_karat| by_karat.iter().map(|(k, f)| (*k, *f)))
    }

    pub fn summarize(&self, unit: UnitId, role: UnitRole) -> UnitSummary {
        let mut summary = UnitSummary::empty(unit, role);
        for (karat, flow) in self.flows(unit) {
            let ks = apply_role(role, karat, flow);
            summary.total_stock += ks.current_stock;
            summary.total_fire += ks.fire;
            summary.has_equivalent += ks.has_equivalent;
            summary.total_processed += ks.processed;
            summary.total_received += ks.received;
            summary.stock_by_karat.insert(karat, ks);
        }
        summary
    }
}

/// Summarize `unit` using the role the classifier assigns it.
pub fn summarize(ledger: &[TransferEvent], unit: UnitId) -> UnitSummary {
    summarize_with_role(ledger, unit, unit.role())
}

/// Summarize `unit` under an explicit role.
pub fn summarize_with_role(ledger: &[TransferEvent], unit: UnitId, role: UnitRole) -> UnitSummary {
    Tally::from_transfers(ledger).summarize(unit, role)
}

/// The single role dispatch. Every derived number in the workspace comes from here.
pub fn apply_role(role: UnitRole, karat: Karat, flow: Flow) -> KaratSummary {
    let remaining = flow.net().max(Decimal::ZERO);
    match role {
        UnitRole::Storage | UnitRole::SemiFinished => KaratSummary {
            current_stock: remaining,
            has_equivalent: has_of(remaining, karat),
            ..KaratSummary::default()
        },
        UnitRole::ProcessingFire => KaratSummary {
            fire: remaining,
            ..KaratSummary::default()
        },
        UnitRole::InputOnly => KaratSummary {
            current_stock: remaining,
            has_equivalent: has_of(remaining, karat),
            processed: flow.input + flow.output,
            ..KaratSummary::default()
        },
        UnitRole::OutputOnly => KaratSummary {
            received: flow.input,
            ..KaratSummary::default()
        },
    }
}

/// Pure-gold content of `grams` at `karat`, rounded to [`HAS_SCALE`] places.
pub fn has_of(grams: Decimal, karat: Karat) -> Decimal {
    (grams * karat.has_ratio())
        .round_dp_with_strategy(HAS_SCALE, RoundingStrategy::MidpointNearestEven)
        .normalize()
}

// ── Integrity audit ──────────────────────────────────────────────────────────

/// What an integrity warning is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "unit", rename_all = "snake_case")]
pub enum AuditScope {
    Unit(UnitId),
    ExternalVault,
}

/// A unit/karat whose outputs exceed its inputs.
///
/// Summaries clamp this to zero; the warning keeps the raw numbers visible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityWarning {
    pub scope: AuditScope,
    pub karat: Karat,
    pub input: Decimal,
    pub output: Decimal,
    /// `output − input`, always positive.
    pub deficit: Decimal,
}

impl IntegrityWarning {
    pub(crate) fn from_flow(scope: AuditScope, karat: Karat, flow: Flow) -> Option<Self> {
        if flow.net() >= Decimal::ZERO {
            return None;
        }
        Some(IntegrityWarning {
            scope,
            karat,
            input: flow.input,
            output: flow.output,
            deficit: flow.output - flow.input,
        })
    }
}

/// Every (unit, karat) with a negative balance before clamping.
///
/// InputOnly units are not audited since material enters the workshop through
/// them without a recorded inbound. OutputOnly units never send.
pub fn audit(ledger: &[TransferEvent]) -> Vec<IntegrityWarning> {
    audit_tally(&Tally::from_transfers(ledger))
}

fn audited(role: UnitRole) -> bool {
    matches!(
        role,
        UnitRole::Storage | UnitRole::SemiFinished | UnitRole::ProcessingFire
    )
}

pub(crate) fn audit_tally(tally: &Tally) -> Vec<IntegrityWarning> {
    UnitId::ALL
        .into_iter()
        .filter(|u| audited(u.role()))
        .flat_map(|unit| {
            tally
                .flows(unit)
                .filter_map(move |(k, f)| IntegrityWarning::from_flow(AuditScope::Unit(unit), k, f))
        })
        .collect()
}
