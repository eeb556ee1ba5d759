use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::unit::UnitId;

/// A mutation request that must be rejected before it touches any ledger.
///
/// Serializable so a store can hand the exact rejection back over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// Source and destination are the same unit.
    #[error("transfer source and destination are both '{unit}'")]
    SameUnit { unit: UnitId },

    /// Amount is zero or negative.
    #[error("amount must be positive, got {amount} g")]
    NonPositiveAmount { amount: Decimal },

    /// Amount exceeds the largest single movement the ledger accepts.
    #[error("amount {amount} g exceeds the {max} g limit")]
    AmountTooLarge { amount: Decimal, max: Decimal },

    /// Karat grade outside 14/18/22/24.
    #[error("unknown karat '{value}' (expected 14, 18, 22 or 24)")]
    UnknownKarat { value: String },

    /// Unit identifier outside the workshop's closed set.
    #[error("unknown unit '{value}'")]
    UnknownUnit { value: String },

    /// The unit is a terminal destination and cannot send transfers.
    #[error("unit '{unit}' only receives transfers and cannot be a source")]
    OutputOnlySource { unit: UnitId },
}

/// A ledger record or document that failed shape validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A single record was dropped; the rest of the ledger is still usable.
    #[error("malformed ledger record at index {index}{}: {message}", id_suffix(.id))]
    MalformedRecord {
        index: usize,
        id: Option<String>,
        message: String,
    },

    /// The enclosing document is unusable (not JSON, wrong top-level shape).
    #[error("malformed ledger document: {message}")]
    Document { message: String },
}

fn id_suffix(id: &Option<String>) -> String {
    id.as_ref().map(|i| format!(" (id {i})")).unwrap_or_default()
}
