//! Conformance test suite for `LedgerStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any `LedgerStore`
//! implementation can run to verify it honours the contract the sync
//! coordinator relies on. The suite covers:
//!
//! - **Transfers**: create/list/delete round trips, distinct ids
//! - **Vault**: the same for external vault transactions
//! - **Validation**: rejected mutations leave the ledger untouched
//! - **Idempotency**: deleting unknown or already-deleted ids succeeds
//! - **Push**: committed mutations reach subscribers as full records
//! - **Concurrency**: parallel creates and deletes from many tasks
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use atolye_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn http_store_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         connect_to_empty_test_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod idempotency;
mod push;
mod transfers;
mod validation;
mod vault;

use std::fmt;
use std::future::Future;

use atolye_core::{
    Decimal, Karat, NewTransfer, NewVaultTransaction, UnitId, VaultDirection,
};

use crate::LedgerStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "transfers", "push").
    pub category: String,
    /// Test name (e.g. "create_then_list_contains_record").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store instance, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(transfers::run_transfer_tests(&factory).await);
    results.extend(vault::run_vault_tests(&factory).await);
    results.extend(validation::run_validation_tests(&factory).await);
    results.extend(idempotency::run_idempotency_tests(&factory).await);
    results.extend(push::run_push_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: request constructors with sensible defaults ─────────────────────

fn grams(value: &str) -> Decimal {
    value.parse().unwrap_or(Decimal::ONE)
}

fn make_transfer(from: UnitId, to: UnitId, amount: &str) -> NewTransfer {
    NewTransfer::new(from, to, grams(amount), Karat::K18)
        .with_cinsi("yüzük")
        .with_notes("conformance")
}

fn make_deposit(amount: &str, counterparty: &str) -> NewVaultTransaction {
    NewVaultTransaction::new(VaultDirection::Deposit, grams(amount), Karat::K22)
        .with_counterparty(counterparty)
}
