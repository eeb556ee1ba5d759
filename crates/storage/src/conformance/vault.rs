use std::future::Future;

use atolye_core::{Karat, NewVaultTransaction, UnitId, VaultDirection};

use super::{grams, make_deposit, make_transfer, TestResult};
use crate::LedgerStore;

pub(super) async fn run_vault_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "vault",
        "new_store_lists_no_vault_transactions",
        new_store_lists_no_vault_transactions(factory).await,
    ));
    results.push(TestResult::from_result(
        "vault",
        "create_preserves_direction_and_counterparty",
        create_preserves_direction_and_counterparty(factory).await,
    ));
    results.push(TestResult::from_result(
        "vault",
        "delete_removes_vault_transaction",
        delete_removes_vault_transaction(factory).await,
    ));
    results.push(TestResult::from_result(
        "vault",
        "vault_ids_do_not_collide_with_transfers",
        vault_ids_do_not_collide_with_transfers(factory).await,
    ));

    results
}

async fn new_store_lists_no_vault_transactions<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let list = s.list_vault_transactions().await.map_err(|e| e.to_string())?;
    if !list.is_empty() {
        return Err(format!("expected no vault transactions, got {}", list.len()));
    }
    Ok(())
}

async fn create_preserves_direction_and_counterparty<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let id = s
        .create_vault_transaction(
            NewVaultTransaction::new(VaultDirection::Withdrawal, grams("7.25"), Karat::K14)
                .with_counterparty("Ahmet Usta"),
        )
        .await
        .map_err(|e| e.to_string())?;
    let list = s.list_vault_transactions().await.map_err(|e| e.to_string())?;
    let tx = list
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| format!("vault transaction {id} not listed"))?;
    if tx.direction != VaultDirection::Withdrawal {
        return Err(format!("expected withdrawal, got {:?}", tx.direction));
    }
    if tx.amount_grams != grams("7.25") || tx.karat != Karat::K14 {
        return Err(format!("amount/karat changed: {} g {}", tx.amount_grams, tx.karat));
    }
    if tx.counterparty.as_deref() != Some("Ahmet Usta") {
        return Err(format!("counterparty not preserved: {:?}", tx.counterparty));
    }
    Ok(())
}

async fn delete_removes_vault_transaction<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let id = s
        .create_vault_transaction(make_deposit("3", "Kuyumcu"))
        .await
        .map_err(|e| e.to_string())?;
    s.delete_vault_transaction(&id)
        .await
        .map_err(|e| e.to_string())?;
    let list = s.list_vault_transactions().await.map_err(|e| e.to_string())?;
    if list.iter().any(|t| t.id == id) {
        return Err(format!("vault transaction {id} still listed after delete"));
    }
    Ok(())
}

/// Transfers and vault transactions share one id space on the client side.
async fn vault_ids_do_not_collide_with_transfers<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let tr = s
        .create_transfer(make_transfer(UnitId::Kasa, UnitId::Dokum, "1"))
        .await
        .map_err(|e| e.to_string())?;
    let vt = s
        .create_vault_transaction(make_deposit("1", "Kuyumcu"))
        .await
        .map_err(|e| e.to_string())?;
    if tr == vt {
        return Err(format!("transfer and vault transaction share id {tr}"));
    }
    Ok(())
}
