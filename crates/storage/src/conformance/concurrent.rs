use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use atolye_core::UnitId;

use super::{make_transfer, TestResult};
use crate::{LedgerStore, StoreError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_creates_get_distinct_ids",
        concurrent_creates_get_distinct_ids(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_deletes_of_same_id_all_succeed",
        concurrent_deletes_of_same_id_all_succeed(factory).await,
    ));

    results
}

// ── Concurrent creates: no lost writes, no shared ids ───────────────────────

async fn concurrent_creates_get_distinct_ids<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = store.clone();
        handles.push(tokio::spawn(async move {
            let amount = format!("{}", i + 1);
            s.create_transfer(make_transfer(UnitId::Kasa, UnitId::Tezgah, &amount))
                .await
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        let id = handle
            .await
            .map_err(|e| format!("task panicked: {e}"))?
            .map_err(|e: StoreError| format!("create failed: {e}"))?;
        if !ids.insert(id.clone()) {
            return Err(format!("id {id} handed out twice"));
        }
    }

    let listed = store.list_transfers().await.map_err(|e| e.to_string())?;
    if listed.len() != N {
        return Err(format!("expected {N} transfers, got {}", listed.len()));
    }
    Ok(())
}

// ── Concurrent deletes: idempotent under contention ─────────────────────────

async fn concurrent_deletes_of_same_id_all_succeed<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let store = Arc::new(factory().await);
    let id = store
        .create_transfer(make_transfer(UnitId::Cila, UnitId::Satis, "2"))
        .await
        .map_err(|e| e.to_string())?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = store.clone();
        let id = id.clone();
        handles.push(tokio::spawn(async move { s.delete_transfer(&id).await }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panicked: {e}"))?
            .map_err(|e| format!("delete failed: {e}"))?;
    }

    let listed = store.list_transfers().await.map_err(|e| e.to_string())?;
    if !listed.is_empty() {
        return Err(format!("expected empty ledger, got {} transfers", listed.len()));
    }
    Ok(())
}
