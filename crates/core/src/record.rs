use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::karat::Karat;
use crate::unit::{UnitId, UnitRole};

/// Store-assigned identifier of a transfer or vault transaction.
pub type RecordId = String;

/// Largest single movement the ledger accepts, in grams.
///
/// Sums of bounded amounts cannot overflow `Decimal` for any ledger that fits
/// in memory.
pub const MAX_AMOUNT_GRAMS: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

fn check_amount(amount: Decimal) -> Result<(), ValidationError> {
    if amount <= Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount { amount });
    }
    if amount > MAX_AMOUNT_GRAMS {
        return Err(ValidationError::AmountTooLarge {
            amount,
            max: MAX_AMOUNT_GRAMS,
        });
    }
    Ok(())
}

/// A movement of gold between two production units.
///
/// Accepted events are never edited; an edit is a delete followed by a create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub id: RecordId,
    pub from_unit: UnitId,
    pub to_unit: UnitId,
    pub amount_grams: Decimal,
    pub karat: Karat,
    /// Free-form product category; not used in accounting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cinsi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl TransferEvent {
    /// Whether the event may take part in aggregation.
    ///
    /// Records that slipped past store validation (amount out of range,
    /// self-transfer) are skipped instead of failing the whole pass.
    pub fn is_well_formed(&self) -> bool {
        check_amount(self.amount_grams).is_ok() && self.from_unit != self.to_unit
    }
}

/// A request to create a [`TransferEvent`]. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransfer {
    pub from_unit: UnitId,
    pub to_unit: UnitId,
    pub amount_grams: Decimal,
    pub karat: Karat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cinsi: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl NewTransfer {
    pub fn new(from_unit: UnitId, to_unit: UnitId, amount_grams: Decimal, karat: Karat) -> Self {
        NewTransfer {
            from_unit,
            to_unit,
            amount_grams,
            karat,
            cinsi: None,
            notes: None,
            created_by: None,
        }
    }

    pub fn with_cinsi(mut self, cinsi: impl Into<String>) -> Self {
        self.cinsi = Some(cinsi.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_amount(self.amount_grams)?;
        if self.from_unit == self.to_unit {
            return Err(ValidationError::SameUnit {
                unit: self.from_unit,
            });
        }
        if self.from_unit.role() == UnitRole::OutputOnly {
            return Err(ValidationError::OutputOnlySource {
                unit: self.from_unit,
            });
        }
        Ok(())
    }

    pub fn into_event(self, id: RecordId, created_at: String) -> TransferEvent {
        TransferEvent {
            id,
            from_unit: self.from_unit,
            to_unit: self.to_unit,
            amount_grams: self.amount_grams,
            karat: self.karat,
            cinsi: self.cinsi,
            notes: self.notes,
            created_at,
            created_by: self.created_by,
        }
    }
}

/// Direction of an external vault movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaultDirection {
    Deposit,
    Withdrawal,
}

impl VaultDirection {
    /// `+1` for deposits, `-1` for withdrawals.
    pub fn sign(self) -> Decimal {
        match self {
            VaultDirection::Deposit => Decimal::ONE,
            VaultDirection::Withdrawal => Decimal::NEGATIVE_ONE,
        }
    }
}

/// A deposit into or withdrawal from the external vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultTransaction {
    pub id: RecordId,
    pub direction: VaultDirection,
    pub amount_grams: Decimal,
    pub karat: Karat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl VaultTransaction {
    pub fn is_well_formed(&self) -> bool {
        check_amount(self.amount_grams).is_ok()
    }

    /// Counterparty name with surrounding whitespace removed, if non-empty.
    pub fn counterparty_key(&self) -> Option<&str> {
        self.counterparty
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// A request to create a [`VaultTransaction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVaultTransaction {
    pub direction: VaultDirection,
    pub amount_grams: Decimal,
    pub karat: Karat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
}

impl NewVaultTransaction {
    pub fn new(direction: VaultDirection, amount_grams: Decimal, karat: Karat) -> Self {
        NewVaultTransaction {
            direction,
            amount_grams,
            karat,
            counterparty: None,
            notes: None,
            created_by: None,
        }
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        check_amount(self.amount_grams)
    }

    pub fn into_transaction(self, id: RecordId, created_at: String) -> VaultTransaction {
        VaultTransaction {
            id,
            direction: self.direction,
            amount_grams: self.amount_grams,
            karat: self.karat,
            counterparty: self.counterparty,
            notes: self.notes,
            created_at,
            created_by: self.created_by,
        }
    }
}
