use std::future::Future;
use std::time::Duration;

use atolye_core::UnitId;

use super::{make_deposit, make_transfer, TestResult};
use crate::push::{PushEvent, PushRecv, PushSubscription};
use crate::LedgerStore;

/// How long to wait for a notification before declaring it lost.
const RECV_TIMEOUT: Duration = Duration::from_secs(2);

pub(super) async fn run_push_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "push",
        "created_notification_carries_full_record",
        created_notification_carries_full_record(factory).await,
    ));
    results.push(TestResult::from_result(
        "push",
        "notifications_follow_commit_order",
        notifications_follow_commit_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "push",
        "rejected_mutation_is_not_published",
        rejected_mutation_is_not_published(factory).await,
    ));

    results
}

async fn next_event(sub: &mut PushSubscription) -> Result<PushEvent, String> {
    match tokio::time::timeout(RECV_TIMEOUT, sub.recv()).await {
        Ok(PushRecv::Event(event)) => Ok(event),
        Ok(other) => Err(format!("expected an event, got {other:?}")),
        Err(_) => Err(format!("no notification within {RECV_TIMEOUT:?}")),
    }
}

// Stores without a push channel pass trivially: the coordinator polls them.

async fn created_notification_carries_full_record<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let Some(mut sub) = s.subscribe().await else {
        return Ok(());
    };
    let id = s
        .create_transfer(make_transfer(UnitId::Kasa, UnitId::Cila, "6"))
        .await
        .map_err(|e| e.to_string())?;

    match next_event(&mut sub).await? {
        PushEvent::TransferCreated { event } => {
            let listed = s.list_transfers().await.map_err(|e| e.to_string())?;
            let stored = listed
                .iter()
                .find(|t| t.id == id)
                .ok_or_else(|| format!("transfer {id} not listed"))?;
            if &event != stored {
                return Err(format!("notification {event:?} differs from stored {stored:?}"));
            }
            Ok(())
        }
        other => Err(format!("expected transfer.created, got {}", other.kind())),
    }
}

async fn notifications_follow_commit_order<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let Some(mut sub) = s.subscribe().await else {
        return Ok(());
    };
    let tr = s
        .create_transfer(make_transfer(UnitId::Dokum, UnitId::Yarimamul, "9"))
        .await
        .map_err(|e| e.to_string())?;
    let vt = s
        .create_vault_transaction(make_deposit("1.5", "Kuyumcu"))
        .await
        .map_err(|e| e.to_string())?;
    s.delete_transfer(&tr).await.map_err(|e| e.to_string())?;

    let mut seen = Vec::new();
    for _ in 0..3 {
        let event = next_event(&mut sub).await?;
        seen.push((event.kind(), event.record_id().to_string()));
    }
    let expected = vec![
        ("transfer.created", tr.clone()),
        ("vault.created", vt),
        ("transfer.deleted", tr),
    ];
    if seen != expected {
        return Err(format!("expected {expected:?}, got {seen:?}"));
    }
    Ok(())
}

async fn rejected_mutation_is_not_published<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let Some(mut sub) = s.subscribe().await else {
        return Ok(());
    };
    let _ = s
        .create_transfer(make_transfer(UnitId::Satis, UnitId::Kasa, "1"))
        .await;
    let ok = s
        .create_transfer(make_transfer(UnitId::Kasa, UnitId::Satis, "1"))
        .await
        .map_err(|e| e.to_string())?;

    let first = next_event(&mut sub).await?;
    if first.record_id() != ok {
        return Err(format!(
            "first notification is for {}, expected {ok}",
            first.record_id()
        ));
    }
    Ok(())
}
