//! Offline reports over a ledger file: summarize, audit, statement.

use std::path::Path;
use std::process;

use atolye_core::{counterparty_statement, decode_ledger, Ledger, UnitId};

use crate::render;
use crate::{report_error, OutputFormat};

/// Read and decode a ledger file. Malformed records are dropped with a warning;
/// a file that is not a ledger document at all is fatal.
pub(crate) fn load_ledger(path: &Path, output: OutputFormat, quiet: bool) -> Ledger {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    match decode_ledger(&text) {
        Ok((ledger, rejected)) => {
            if !rejected.is_empty() {
                tracing::warn!(
                    file = %path.display(),
                    dropped = rejected.len(),
                    "ledger file contained malformed records"
                );
            }
            ledger
        }
        Err(e) => {
            let msg = format!("error decoding ledger '{}': {}", path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    let pretty =
        serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("serialization error: {}", e));
    println!("{}", pretty);
}

pub(crate) fn cmd_summarize(path: &Path, unit: Option<UnitId>, output: OutputFormat, quiet: bool) {
    let ledger = load_ledger(path, output, quiet);
    let summary = ledger.summarize();

    match unit {
        Some(unit) => {
            let Some(u) = summary.unit(unit) else {
                report_error(&format!("no summary for unit '{}'", unit), output, quiet);
                process::exit(1);
            };
            match output {
                OutputFormat::Text => print!("{}", render::unit_text(u)),
                OutputFormat::Json => print_json(u),
            }
        }
        None => match output {
            OutputFormat::Text => print!("{}", render::workshop_text(&summary)),
            OutputFormat::Json => print_json(&summary),
        },
    }
}

/// Warnings are informational; the command succeeds whether or not any are found.
pub(crate) fn cmd_audit(path: &Path, output: OutputFormat, quiet: bool) {
    let ledger = load_ledger(path, output, quiet);
    let warnings = ledger.audit();
    match output {
        OutputFormat::Text => {
            if !(quiet && warnings.is_empty()) {
                print!("{}", render::warnings_text(&warnings));
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({ "warnings": warnings })),
    }
}

pub(crate) fn cmd_statement(path: &Path, counterparty: &str, output: OutputFormat, quiet: bool) {
    let ledger = load_ledger(path, output, quiet);
    let lines = counterparty_statement(&ledger.vault, counterparty);
    match output {
        OutputFormat::Text => print!("{}", render::statement_text(counterparty, &lines)),
        OutputFormat::Json => print_json(&serde_json::json!({
            "counterparty": counterparty.trim(),
            "lines": lines,
        })),
    }
}
