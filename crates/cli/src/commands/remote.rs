//! Mutations against a remote store through the sync coordinator.

use std::path::Path;
use std::process;
use std::sync::Arc;

use atolye_core::{NewTransfer, NewVaultTransaction, UnitId, UnitSummary};
use atolye_sync::{HttpStore, MutationOutcome, SyncConfig, SyncCoordinator, SyncError};

use crate::render;
use crate::{report_error, OutputFormat};

/// A coordinator over the configured HTTP store, plus the runtime that drives it.
pub(crate) struct Remote {
    pub(crate) runtime: tokio::runtime::Runtime,
    pub(crate) coordinator: Arc<SyncCoordinator<HttpStore>>,
}

/// Load configuration and connect. Exits on a bad config.
pub(crate) fn connect(config: Option<&Path>, output: OutputFormat, quiet: bool) -> Remote {
    let config = match SyncConfig::load(config) {
        Ok(c) => c,
        Err(e) => {
            report_error(&format!("configuration error: {}", e), output, quiet);
            process::exit(1);
        }
    };
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to start runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };
    tracing::debug!(store_url = %config.store_url, "connecting to ledger store");
    let store = Arc::new(HttpStore::from_config(&config));
    Remote {
        runtime,
        coordinator: Arc::new(SyncCoordinator::new(store, &config)),
    }
}

fn sync_failure(err: &SyncError) -> String {
    match err {
        SyncError::Validation(e) => format!("rejected: {}", e),
        other if other.is_retryable() => format!("{} (retry later)", other),
        other => other.to_string(),
    }
}

impl Remote {
    /// Fetch the authoritative ledger into the cache. Exits if the store is unreachable.
    fn load(&self, output: OutputFormat, quiet: bool) {
        if let Err(e) = self.runtime.block_on(self.coordinator.refresh()) {
            report_error(&sync_failure(&e), output, quiet);
            process::exit(1);
        }
    }

    fn mutate<F, Fut>(&self, mutation: F, output: OutputFormat, quiet: bool) -> MutationOutcome
    where
        F: FnOnce(Arc<SyncCoordinator<HttpStore>>) -> Fut,
        Fut: std::future::Future<Output = Result<MutationOutcome, SyncError>>,
    {
        match self.runtime.block_on(mutation(self.coordinator.clone())) {
            Ok(outcome) => outcome,
            Err(e) => {
                report_error(&sync_failure(&e), output, quiet);
                process::exit(1);
            }
        }
    }
}

fn print_outcome(
    verb: &str,
    outcome: &MutationOutcome,
    units: &[UnitId],
    show_vault: bool,
    remote: &Remote,
    output: OutputFormat,
    quiet: bool,
) {
    let state = remote.coordinator.snapshot();
    let summaries: Vec<&UnitSummary> = units
        .iter()
        .filter_map(|u| state.summary.unit(*u))
        .collect();
    let vault = show_vault.then_some(&state.summary.vault);

    if quiet {
        println!("{}", outcome.id);
        return;
    }
    match output {
        OutputFormat::Text => print!("{}", render::outcome_text(verb, outcome, &summaries, vault)),
        OutputFormat::Json => {
            let mut json = serde_json::json!({
                "id": outcome.id,
                "reconciled": outcome.reconciled,
                "conflict": outcome.conflict,
                "units": summaries,
            });
            if let Some(vault) = vault {
                json["vault"] = serde_json::json!(vault);
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&json).unwrap_or_default()
            );
        }
    }
}

pub(crate) fn cmd_transfer(
    config: Option<&Path>,
    transfer: NewTransfer,
    output: OutputFormat,
    quiet: bool,
) {
    // Invalid requests fail before any network traffic.
    if let Err(e) = transfer.validate() {
        report_error(&format!("rejected: {}", e), output, quiet);
        process::exit(1);
    }
    let units = [transfer.from_unit, transfer.to_unit];
    let remote = connect(config, output, quiet);
    remote.load(output, quiet);
    let outcome = remote.mutate(
        |c| async move { c.create_transfer(transfer).await },
        output,
        quiet,
    );
    print_outcome("created transfer", &outcome, &units, false, &remote, output, quiet);
}

pub(crate) fn cmd_vault(
    config: Option<&Path>,
    transaction: NewVaultTransaction,
    output: OutputFormat,
    quiet: bool,
) {
    if let Err(e) = transaction.validate() {
        report_error(&format!("rejected: {}", e), output, quiet);
        process::exit(1);
    }
    let remote = connect(config, output, quiet);
    remote.load(output, quiet);
    let outcome = remote.mutate(
        |c| async move { c.create_vault_transaction(transaction).await },
        output,
        quiet,
    );
    print_outcome(
        "created vault transaction",
        &outcome,
        &[],
        true,
        &remote,
        output,
        quiet,
    );
}

/// Deletes are idempotent: an unknown id succeeds.
pub(crate) fn cmd_delete(
    config: Option<&Path>,
    id: &str,
    vault: bool,
    output: OutputFormat,
    quiet: bool,
) {
    let remote = connect(config, output, quiet);
    let target = id.to_string();

    remote.load(output, quiet);

    // Units touched by the record, looked up before it is gone.
    let units: Vec<UnitId> = if vault {
        Vec::new()
    } else {
        remote
            .coordinator
            .snapshot()
            .ledger
            .transfers
            .iter()
            .find(|t| t.id == id)
            .map(|t| vec![t.from_unit, t.to_unit])
            .unwrap_or_default()
    };

    let outcome = if vault {
        remote.mutate(
            |c| async move { c.delete_vault_transaction(&target).await },
            output,
            quiet,
        )
    } else {
        remote.mutate(
            |c| async move { c.delete_transfer(&target).await },
            output,
            quiet,
        )
    };
    let verb = if vault {
        "deleted vault transaction"
    } else {
        "deleted transfer"
    };
    print_outcome(verb, &outcome, &units, vault, &remote, output, quiet);
}
