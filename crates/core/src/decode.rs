//! Record-by-record decoding of ledger JSON.
//!
//! A store may hand back a record this client cannot understand (an unknown
//! karat, a unit added by a newer client, a truncated row). Such a record is
//! dropped and reported; it never poisons the rest of the ledger.

use serde::de::DeserializeOwned;

use crate::error::DecodeError;
use crate::record::{TransferEvent, VaultTransaction};
use crate::workshop::Ledger;

/// Records that decoded cleanly, plus one error per dropped record.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub records: Vec<T>,
    pub rejected: Vec<DecodeError>,
}

pub fn decode_records<T: DeserializeOwned>(values: Vec<serde_json::Value>) -> Decoded<T> {
    let mut records = Vec::with_capacity(values.len());
    let mut rejected = Vec::new();
    for (index, value) in values.into_iter().enumerate() {
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        match serde_json::from_value::<T>(value) {
            Ok(record) => records.push(record),
            Err(e) => {
                let err = DecodeError::MalformedRecord {
                    index,
                    id,
                    message: e.to_string(),
                };
                tracing::warn!(error = %err, "dropping malformed ledger record");
                rejected.push(err);
            }
        }
    }
    Decoded { records, rejected }
}

/// Decode a JSON array of records, tolerating bad elements.
pub fn decode_array<T: DeserializeOwned>(value: serde_json::Value) -> Result<Decoded<T>, DecodeError> {
    match value {
        serde_json::Value::Array(items) => Ok(decode_records(items)),
        other => Err(DecodeError::Document {
            message: format!("expected a JSON array of records, got {}", json_kind(&other)),
        }),
    }
}

/// Decode a ledger document `{ "transfers": [...], "vault": [...] }`.
///
/// Either key may be missing. Returns the ledger and the dropped records.
pub fn decode_ledger(text: &str) -> Result<(Ledger, Vec<DecodeError>), DecodeError> {
    let doc: serde_json::Value = serde_json::from_str(text).map_err(|e| DecodeError::Document {
        message: e.to_string(),
    })?;
    let mut obj = match doc {
        serde_json::Value::Object(map) => map,
        other => {
            return Err(DecodeError::Document {
                message: format!("expected a JSON object, got {}", json_kind(&other)),
            })
        }
    };

    let transfers: Decoded<TransferEvent> = match obj.remove("transfers") {
        Some(v) => decode_array(v)?,
        None => Decoded {
            records: Vec::new(),
            rejected: Vec::new(),
        },
    };
    let vault: Decoded<VaultTransaction> = match obj.remove("vault") {
        Some(v) => decode_array(v)?,
        None => Decoded {
            records: Vec::new(),
            rejected: Vec::new(),
        },
    };

    let mut rejected = transfers.rejected;
    rejected.extend(vault.rejected);
    Ok((Ledger::new(transfers.records, vault.records), rejected))
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
