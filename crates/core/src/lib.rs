//! atolye-core: gold ledger model and unit accounting engine.
//!
//! Everything in this crate is pure: given a ledger snapshot it derives
//! per-unit, per-karat stock, fire and has figures. There is no I/O and no
//! hidden state, so any number of consumers can summarize the same snapshot
//! and get identical answers.
//!
//! # Public API
//!
//! - [`Karat`] and [`UnitId`] / [`UnitRole`] -- the closed lookup tables
//! - [`TransferEvent`], [`VaultTransaction`] -- ledger records
//! - [`summarize`] / [`summarize_with_role`] -- one unit
//! - [`Ledger::summarize`] -- every unit plus the external vault
//! - [`summarize_vault`], [`counterparty_statement`] -- external vault
//! - [`audit`] -- balances that were clamped to zero
//! - [`decode_ledger`] -- lenient JSON decoding

pub mod decode;
pub mod engine;
pub mod error;
pub mod karat;
pub mod record;
pub mod unit;
pub mod vault;
pub mod workshop;

pub use decode::{decode_array, decode_ledger, decode_records, Decoded};
pub use engine::{
    audit, has_of, summarize, summarize_with_role, AuditScope, IntegrityWarning, KaratSummary,
    UnitSummary,
};
pub use error::{DecodeError, ValidationError};
pub use karat::Karat;
pub use record::{
    NewTransfer, NewVaultTransaction, RecordId, TransferEvent, VaultDirection, VaultTransaction,
    MAX_AMOUNT_GRAMS,
};
pub use unit::{UnitId, UnitRole};
pub use vault::{
    audit_vault, counterparty_statement, summarize_vault, CounterpartyBalance, StatementLine,
    VaultKaratSummary, VaultSummary,
};
pub use workshop::{summarize_workshop, Ledger, WorkshopSummary};

/// Re-exported so downstream crates name amounts without a direct dependency.
pub use rust_decimal::Decimal;
