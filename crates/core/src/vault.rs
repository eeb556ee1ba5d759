//! External vault accounting.
//!
//! The external vault is one logical unit, so its ledger is keyed by karat
//! only. Deposits count as input and withdrawals as output under the Storage
//! rule from [`crate::engine`]. Counterparty balances are tracked alongside for
//! reporting.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::engine::{apply_role, has_of, AuditScope, Flow, IntegrityWarning};
use crate::karat::Karat;
use crate::record::{RecordId, VaultDirection, VaultTransaction};
use crate::unit::UnitRole;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultKaratSummary {
    pub current_stock: Decimal,
    pub has_equivalent: Decimal,
    pub deposited: Decimal,
    pub withdrawn: Decimal,
}

/// Signed position against one counterparty. Positive means the vault holds
/// more from them than it has returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterpartyBalance {
    pub balance_by_karat: BTreeMap<Karat, Decimal>,
    pub has_balance: Decimal,
    pub transaction_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultSummary {
    pub total_stock: Decimal,
    pub has_equivalent: Decimal,
    pub stock_by_karat: BTreeMap<Karat, VaultKaratSummary>,
    pub counterparties: BTreeMap<String, CounterpartyBalance>,
}

fn vault_flows(transactions: &[VaultTransaction]) -> BTreeMap<Karat, Flow> {
    let mut flows: BTreeMap<Karat, Flow> = BTreeMap::new();
    for tx in transactions.iter().filter(|t| t.is_well_formed()) {
        let flow = flows.entry(tx.karat).or_default();
        match tx.direction {
            VaultDirection::Deposit => flow.input += tx.amount_grams,
            VaultDirection::Withdrawal => flow.output += tx.amount_grams,
        }
    }
    flows
}

pub fn summarize_vault(transactions: &[VaultTransaction]) -> VaultSummary {
    let mut summary = VaultSummary::default();

    for (karat, flow) in vault_flows(transactions) {
        let ks = apply_role(UnitRole::Storage, karat, flow);
        summary.total_stock += ks.current_stock;
        summary.has_equivalent += ks.has_equivalent;
        summary.stock_by_karat.insert(
            karat,
            VaultKaratSummary {
                current_stock: ks.current_stock,
                has_equivalent: ks.has_equivalent,
                deposited: flow.input,
                withdrawn: flow.output,
            },
        );
    }

    for tx in transactions.iter().filter(|t| t.is_well_formed()) {
        let Some(name) = tx.counterparty_key() else {
            continue;
        };
        let entry = summary.counterparties.entry(name.to_string()).or_default();
        *entry.balance_by_karat.entry(tx.karat).or_default() +=
            tx.direction.sign() * tx.amount_grams;
        entry.transaction_count += 1;
    }
    for balance in summary.counterparties.values_mut() {
        balance.has_balance = balance
            .balance_by_karat
            .iter()
            .map(|(k, grams)| signed_has(*grams, *k))
            .sum();
    }

    summary
}

/// Karats where withdrawals exceed deposits.
pub fn audit_vault(transactions: &[VaultTransaction]) -> Vec<IntegrityWarning> {
    vault_flows(transactions)
        .into_iter()
        .filter_map(|(k, f)| IntegrityWarning::from_flow(AuditScope::ExternalVault, k, f))
        .collect()
}

fn signed_has(grams: Decimal, karat: Karat) -> Decimal {
    if grams.is_sign_negative() {
        -has_of(-grams, karat)
    } else {
        has_of(grams, karat)
    }
}

// ── Counterparty statement ───────────────────────────────────────────────────

/// One line of a counterparty statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementLine {
    pub id: RecordId,
    pub created_at: String,
    pub direction: VaultDirection,
    pub karat: Karat,
    pub amount_grams: Decimal,
    /// Has-grams of this line, negative for withdrawals.
    pub signed_has: Decimal,
    /// Running has balance after this line.
    pub running_has: Decimal,
}

/// Transactions with `counterparty`, oldest first, with a running has balance.
///
/// Ties on `created_at` are broken by id so the statement is stable.
pub fn counterparty_statement(
    transactions: &[VaultTransaction],
    counterparty: &str,
) -> Vec<StatementLine> {
    let wanted = counterparty.trim();
    let mut matching: Vec<&VaultTransaction> = transactions
        .iter()
        .filter(|t| t.is_well_formed() && t.counterparty_key() == Some(wanted))
        .collect();
    matching.sort_by(|a, b| (&a.created_at, &a.id).cmp(&(&b.created_at, &b.id)));

    let mut running = Decimal::ZERO;
    matching
        .into_iter()
        .map(|tx| {
            let signed = signed_has(tx.direction.sign() * tx.amount_grams, tx.karat);
            running += signed;
            StatementLine {
                id: tx.id.clone(),
                created_at: tx.created_at.clone(),
                direction: tx.direction,
                karat: tx.karat,
                amount_grams: tx.amount_grams,
                signed_has: signed,
                running_has: running,
            }
        })
        .collect()
}
