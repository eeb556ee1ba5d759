use std::future::Future;

use atolye_core::{
    Decimal, Karat, NewTransfer, NewVaultTransaction, UnitId, ValidationError, VaultDirection,
    MAX_AMOUNT_GRAMS,
};

use super::{make_transfer, TestResult};
use crate::{LedgerStore, StoreError};

pub(super) async fn run_validation_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "validation",
        "same_unit_transfer_rejected",
        same_unit_transfer_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "validation",
        "non_positive_amount_rejected",
        non_positive_amount_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "validation",
        "oversized_amount_rejected",
        oversized_amount_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "validation",
        "output_only_source_rejected",
        output_only_source_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "validation",
        "zero_vault_amount_rejected",
        zero_vault_amount_rejected(factory).await,
    ));
    results.push(TestResult::from_result(
        "validation",
        "rejection_leaves_ledger_untouched",
        rejection_leaves_ledger_untouched(factory).await,
    ));

    results
}

// ── Helper: expect a Rejected error carrying a specific validation failure ──

fn expect_rejected<T: std::fmt::Debug>(
    result: Result<T, StoreError>,
    matches: impl Fn(&ValidationError) -> bool,
) -> Result<(), String> {
    match result {
        Err(StoreError::Rejected(ref v)) if matches(v) => Ok(()),
        Err(other) => Err(format!("expected matching Rejected error, got: {other}")),
        Ok(value) => Err(format!("expected rejection, got Ok({value:?})")),
    }
}

async fn same_unit_transfer_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let result = s
        .create_transfer(make_transfer(UnitId::Tezgah, UnitId::Tezgah, "2"))
        .await;
    expect_rejected(result, |v| matches!(v, ValidationError::SameUnit { .. }))
}

async fn non_positive_amount_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for amount in [Decimal::ZERO, Decimal::NEGATIVE_ONE] {
        let result = s
            .create_transfer(NewTransfer::new(UnitId::Kasa, UnitId::Cila, amount, Karat::K18))
            .await;
        expect_rejected(result, |v| {
            matches!(v, ValidationError::NonPositiveAmount { .. })
        })?;
    }
    Ok(())
}

async fn oversized_amount_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let over = MAX_AMOUNT_GRAMS + Decimal::ONE;
    let result = s
        .create_transfer(NewTransfer::new(UnitId::Tedarik, UnitId::Kasa, over, Karat::K18))
        .await;
    expect_rejected(result, |v| matches!(v, ValidationError::AmountTooLarge { .. }))?;
    let result = s
        .create_vault_transaction(NewVaultTransaction::new(
            VaultDirection::Deposit,
            over,
            Karat::K24,
        ))
        .await;
    expect_rejected(result, |v| matches!(v, ValidationError::AmountTooLarge { .. }))?;

    let ledger = s.fetch_ledger().await.map_err(|e| e.to_string())?;
    if !ledger.transfers.is_empty() || !ledger.vault.is_empty() {
        return Err("oversized records reached the ledger".into());
    }
    Ok(())
}

async fn output_only_source_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let result = s
        .create_transfer(make_transfer(UnitId::Satis, UnitId::Kasa, "1"))
        .await;
    expect_rejected(result, |v| {
        matches!(v, ValidationError::OutputOnlySource { unit: UnitId::Satis })
    })
}

async fn zero_vault_amount_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let result = s
        .create_vault_transaction(NewVaultTransaction::new(
            VaultDirection::Deposit,
            Decimal::ZERO,
            Karat::K24,
        ))
        .await;
    expect_rejected(result, |v| {
        matches!(v, ValidationError::NonPositiveAmount { .. })
    })
}

async fn rejection_leaves_ledger_untouched<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: LedgerStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.create_transfer(make_transfer(UnitId::Kasa, UnitId::Tezgah, "5"))
        .await
        .map_err(|e| e.to_string())?;
    let before = s.fetch_ledger().await.map_err(|e| e.to_string())?;

    let _ = s
        .create_transfer(make_transfer(UnitId::Cila, UnitId::Cila, "5"))
        .await;
    let _ = s
        .create_vault_transaction(NewVaultTransaction::new(
            VaultDirection::Withdrawal,
            Decimal::NEGATIVE_ONE,
            Karat::K22,
        ))
        .await;

    let after = s.fetch_ledger().await.map_err(|e| e.to_string())?;
    if before != after {
        return Err("rejected mutations changed the ledger".to_string());
    }
    Ok(())
}
