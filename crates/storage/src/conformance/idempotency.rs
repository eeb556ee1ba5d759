use std::future::Future;

use atolye_core::UnitId;

use super::{make_deposit, make_transfer, TestResult};
use crate::LedgerStore;

pub(super) async fn run_idempotency_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "idempotency",
        "delete_unknown_transfer_succeeds",
        delete_unknown_transfer_succeeds(factory).await,
    ));
    results.push(TestResult::from_result(
        "idempotency",
        "double_delete_transfer_succeeds",
        double_delete_transfer_succeeds(factory).await,
    ));
    results.push(TestResult::from_result(
        "idempotency",
        "double_delete_vault_transaction_succeeds",
        double_delete_vault_transaction_succeeds(factory).await,
    ));

    results
}

async fn delete_unknown_transfer_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.delete_transfer("tr-does-not-exist")
        .await
        .map_err(|e| format!("delete of unknown id failed: {e}"))?;
    s.delete_vault_transaction("vt-does-not-exist")
        .await
        .map_err(|e| format!("delete of unknown vault id failed: {e}"))
}

async fn double_delete_transfer_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let id = s
        .create_transfer(make_transfer(UnitId::Kasa, UnitId::Cila, "2"))
        .await
        .map_err(|e| e.to_string())?;
    s.delete_transfer(&id)
        .await
        .map_err(|e| format!("first delete: {e}"))?;
    s.delete_transfer(&id)
        .await
        .map_err(|e| format!("second delete: {e}"))?;
    let remaining = s.list_transfers().await.map_err(|e| e.to_string())?.len();
    if remaining != 0 {
        return Err(format!("expected empty ledger, got {remaining} transfers"));
    }
    Ok(())
}

async fn double_delete_vault_transaction_succeeds<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let id = s
        .create_vault_transaction(make_deposit("4", "Kuyumcu"))
        .await
        .map_err(|e| e.to_string())?;
    s.delete_vault_transaction(&id)
        .await
        .map_err(|e| format!("first delete: {e}"))?;
    s.delete_vault_transaction(&id)
        .await
        .map_err(|e| format!("second delete: {e}"))
}
