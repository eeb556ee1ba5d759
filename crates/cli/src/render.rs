//! Plain-text rendering of summaries for `--output text`.

use std::fmt::Write;

use atolye_core::{
    AuditScope, Decimal, IntegrityWarning, StatementLine, UnitRole, UnitSummary, VaultDirection,
    VaultSummary, WorkshopSummary,
};
use atolye_sync::MutationOutcome;

fn g(d: Decimal) -> String {
    d.normalize().to_string()
}

/// One line for a unit, phrased for its role.
pub(crate) fn unit_line(u: &UnitSummary) -> String {
    let head = format!("{} ({}, {})", u.unit_id.label(), u.unit_id, u.role);
    match u.role {
        UnitRole::Storage | UnitRole::SemiFinished => format!(
            "{head}: stock {} g, has {} g",
            g(u.total_stock),
            g(u.has_equivalent)
        ),
        UnitRole::InputOnly => format!(
            "{head}: stock {} g, has {} g, processed {} g",
            g(u.total_stock),
            g(u.has_equivalent),
            g(u.total_processed)
        ),
        UnitRole::ProcessingFire => format!("{head}: fire {} g", g(u.total_fire)),
        UnitRole::OutputOnly => format!("{head}: received {} g", g(u.total_received)),
    }
}

fn karat_lines(u: &UnitSummary, out: &mut String) {
    for (karat, ks) in &u.stock_by_karat {
        let detail = match u.role {
            UnitRole::Storage | UnitRole::SemiFinished => {
                format!("stock {} g, has {} g", g(ks.current_stock), g(ks.has_equivalent))
            }
            UnitRole::InputOnly => format!(
                "stock {} g, has {} g, processed {} g",
                g(ks.current_stock),
                g(ks.has_equivalent),
                g(ks.processed)
            ),
            UnitRole::ProcessingFire => format!("fire {} g", g(ks.fire)),
            UnitRole::OutputOnly => format!("received {} g", g(ks.received)),
        };
        let _ = writeln!(out, "  {karat}: {detail}");
    }
}

pub(crate) fn unit_text(u: &UnitSummary) -> String {
    let mut out = unit_line(u);
    out.push('\n');
    karat_lines(u, &mut out);
    out
}

pub(crate) fn workshop_text(summary: &WorkshopSummary) -> String {
    let mut out = String::new();
    for u in summary.units.values() {
        out.push_str(&unit_text(u));
    }

    let vault = &summary.vault;
    out.push_str(&vault_line(vault));
    out.push('\n');
    for (karat, ks) in &vault.stock_by_karat {
        let _ = writeln!(
            out,
            "  {karat}: stock {} g, has {} g (deposited {} g, withdrawn {} g)",
            g(ks.current_stock),
            g(ks.has_equivalent),
            g(ks.deposited),
            g(ks.withdrawn)
        );
    }
    for (name, balance) in &vault.counterparties {
        let _ = writeln!(
            out,
            "  {name}: has balance {} g over {} transaction(s)",
            g(balance.has_balance),
            balance.transaction_count
        );
    }

    if summary.skipped_records > 0 {
        let _ = writeln!(
            out,
            "Skipped {} malformed record(s)",
            summary.skipped_records
        );
    }
    out
}

pub(crate) fn warnings_text(warnings: &[IntegrityWarning]) -> String {
    if warnings.is_empty() {
        return "No integrity warnings\n".to_string();
    }
    let mut out = String::new();
    for w in warnings {
        let scope = match w.scope {
            AuditScope::Unit(unit) => unit.to_string(),
            AuditScope::ExternalVault => "external vault".to_string(),
        };
        let _ = writeln!(
            out,
            "{scope} {}: output {} g exceeds input {} g by {} g",
            w.karat,
            g(w.output),
            g(w.input),
            g(w.deficit)
        );
    }
    out
}

pub(crate) fn statement_text(counterparty: &str, lines: &[StatementLine]) -> String {
    let mut out = format!(
        "Statement for {} ({} transaction(s))\n",
        counterparty.trim(),
        lines.len()
    );
    for line in lines {
        let direction = match line.direction {
            VaultDirection::Deposit => "deposit",
            VaultDirection::Withdrawal => "withdrawal",
        };
        let _ = writeln!(
            out,
            "{}  {}  {:<10} {} g {}  has {}  balance {}",
            line.created_at,
            line.id,
            direction,
            g(line.amount_grams),
            line.karat,
            g(line.signed_has),
            g(line.running_has)
        );
    }
    out
}

fn vault_line(vault: &VaultSummary) -> String {
    format!(
        "External vault: stock {} g, has {} g",
        g(vault.total_stock),
        g(vault.has_equivalent)
    )
}

pub(crate) fn outcome_text(
    verb: &str,
    outcome: &MutationOutcome,
    units: &[&UnitSummary],
    vault: Option<&VaultSummary>,
) -> String {
    let mut out = format!("{verb} {}\n", outcome.id);
    if outcome.conflict {
        let _ = writeln!(
            out,
            "warning: the store disagrees with this change; its state was adopted"
        );
    }
    if !outcome.reconciled {
        let _ = writeln!(
            out,
            "warning: could not refetch the ledger; figures below may be stale"
        );
    }
    for u in units {
        out.push_str(&unit_line(u));
        out.push('\n');
    }
    if let Some(vault) = vault {
        out.push_str(&vault_line(vault));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use atolye_core::{Karat, Ledger, NewTransfer, UnitId};

    fn workshop() -> WorkshopSummary {
        let mut ledger = Ledger::default();
        for (i, (from, to, grams)) in [
            (UnitId::Tedarik, UnitId::Kasa, "100"),
            (UnitId::Kasa, UnitId::LazerKesim, "10"),
            (UnitId::LazerKesim, UnitId::Satis, "7"),
        ]
        .into_iter()
        .enumerate()
        {
            ledger.insert_transfer(
                NewTransfer::new(from, to, grams.parse().unwrap(), Karat::K18)
                    .into_event(format!("tr-{i}"), "2026-01-01T00:00:00Z".into()),
            );
        }
        ledger.summarize()
    }

    #[test]
    fn storage_line_shows_stock_and_has() {
        let s = workshop();
        assert_eq!(
            unit_line(s.unit(UnitId::Kasa).unwrap()),
            "Kasa (kasa, storage): stock 90 g, has 67.5 g"
        );
    }

    #[test]
    fn processing_line_shows_fire_only() {
        let s = workshop();
        let text = unit_text(s.unit(UnitId::LazerKesim).unwrap());
        assert!(text.starts_with("Lazer Kesim (lazer-kesim, processing_fire): fire 3 g\n"));
        assert!(text.contains("  18K: fire 3 g"));
    }

    #[test]
    fn output_only_line_shows_received() {
        let s = workshop();
        assert!(unit_line(s.unit(UnitId::Satis).unwrap()).ends_with("received 7 g"));
    }

    #[test]
    fn conflicting_outcome_is_flagged() {
        let s = workshop();
        let outcome = MutationOutcome {
            id: "tr-9".into(),
            reconciled: true,
            conflict: true,
        };
        let text = outcome_text(
            "created transfer",
            &outcome,
            &[s.unit(UnitId::Kasa).unwrap()],
            Some(&s.vault),
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "created transfer tr-9");
        assert!(lines[1].starts_with("warning: the store disagrees"));
        assert!(lines[2].starts_with("Kasa (kasa, storage)"));
        assert_eq!(lines[3], "External vault: stock 0 g, has 0 g");
    }

    #[test]
    fn no_warnings_message() {
        assert_eq!(warnings_text(&[]), "No integrity warnings\n");
    }
}
