use std::collections::HashSet;
use std::future::Future;

use atolye_core::{Karat, UnitId};

use super::{grams, make_deposit, make_transfer, TestResult};
use crate::LedgerStore;

pub(super) async fn run_transfer_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "transfers",
        "new_store_lists_no_transfers",
        new_store_lists_no_transfers(factory).await,
    ));
    results.push(TestResult::from_result(
        "transfers",
        "create_then_list_contains_record",
        create_then_list_contains_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "transfers",
        "created_record_matches_request",
        created_record_matches_request(factory).await,
    ));
    results.push(TestResult::from_result(
        "transfers",
        "create_assigns_distinct_ids",
        create_assigns_distinct_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "transfers",
        "delete_removes_only_that_record",
        delete_removes_only_that_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "transfers",
        "fetch_ledger_includes_both_sides",
        fetch_ledger_includes_both_sides(factory).await,
    ));

    results
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn new_store_lists_no_transfers<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let list = s.list_transfers().await.map_err(|e| e.to_string())?;
    if !list.is_empty() {
        return Err(format!("expected empty ledger, got {} transfers", list.len()));
    }
    Ok(())
}

async fn create_then_list_contains_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let id = s
        .create_transfer(make_transfer(UnitId::Kasa, UnitId::LazerKesim, "10"))
        .await
        .map_err(|e| e.to_string())?;
    let list = s.list_transfers().await.map_err(|e| e.to_string())?;
    if !list.iter().any(|t| t.id == id) {
        return Err(format!("created transfer {id} missing from list"));
    }
    Ok(())
}

/// Every field of the request survives the round trip; the store only adds
/// id and timestamp.
async fn created_record_matches_request<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let request = make_transfer(UnitId::Yarimamul, UnitId::Cila, "3.125");
    let id = s
        .create_transfer(request.clone())
        .await
        .map_err(|e| e.to_string())?;
    let list = s.list_transfers().await.map_err(|e| e.to_string())?;
    let rec = list
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| format!("transfer {id} not listed"))?;

    if rec.from_unit != UnitId::Yarimamul || rec.to_unit != UnitId::Cila {
        return Err(format!(
            "expected yarimamul -> cila, got {} -> {}",
            rec.from_unit, rec.to_unit
        ));
    }
    if rec.amount_grams != grams("3.125") {
        return Err(format!("expected 3.125 g, got {}", rec.amount_grams));
    }
    if rec.karat != Karat::K18 {
        return Err(format!("expected 18K, got {}", rec.karat));
    }
    if rec.cinsi != request.cinsi || rec.notes != request.notes {
        return Err(format!(
            "cinsi/notes not preserved: {:?}/{:?}",
            rec.cinsi, rec.notes
        ));
    }
    if rec.created_at.is_empty() {
        return Err("created_at is empty".to_string());
    }
    Ok(())
}

async fn create_assigns_distinct_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut ids = HashSet::new();
    for _ in 0..5 {
        let id = s
            .create_transfer(make_transfer(UnitId::Kasa, UnitId::Tezgah, "1"))
            .await
            .map_err(|e| e.to_string())?;
        if !ids.insert(id.clone()) {
            return Err(format!("id {id} assigned twice"));
        }
    }
    let listed = s.list_transfers().await.map_err(|e| e.to_string())?.len();
    if listed != 5 {
        return Err(format!("expected 5 transfers, got {listed}"));
    }
    Ok(())
}

async fn delete_removes_only_that_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let keep = s
        .create_transfer(make_transfer(UnitId::Kasa, UnitId::Tezgah, "4"))
        .await
        .map_err(|e| e.to_string())?;
    let drop = s
        .create_transfer(make_transfer(UnitId::Tezgah, UnitId::Cila, "3"))
        .await
        .map_err(|e| e.to_string())?;
    s.delete_transfer(&drop).await.map_err(|e| e.to_string())?;

    let ids: Vec<String> = s
        .list_transfers()
        .await
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|t| t.id)
        .collect();
    if ids != vec![keep.clone()] {
        return Err(format!("expected only [{keep}] after delete, got {ids:?}"));
    }
    Ok(())
}

async fn fetch_ledger_includes_both_sides<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.create_transfer(make_transfer(UnitId::Tedarik, UnitId::Kasa, "8"))
        .await
        .map_err(|e| e.to_string())?;
    s.create_vault_transaction(make_deposit("2", "Kuyumcu"))
        .await
        .map_err(|e| e.to_string())?;
    let ledger = s.fetch_ledger().await.map_err(|e| e.to_string())?;
    if ledger.transfers.len() != 1 || ledger.vault.len() != 1 {
        return Err(format!(
            "expected 1 transfer + 1 vault transaction, got {} + {}",
            ledger.transfers.len(),
            ledger.vault.len()
        ));
    }
    Ok(())
}
