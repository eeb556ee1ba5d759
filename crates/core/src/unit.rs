//! Workshop production units and the accounting role each one plays.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How a unit's movements are turned into stock, fire and has figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitRole {
    /// Vault-like: holds stock, never loses mass.
    Storage,
    /// Processing step: whatever is not passed on is fire.
    ProcessingFire,
    /// Intermediate stock, accounted like storage but kept apart.
    SemiFinished,
    /// Receives raw material and forwards it; throughput matters.
    InputOnly,
    /// Terminal destination; gold leaves the workshop here.
    OutputOnly,
}

impl UnitRole {
    /// Whether stock left in the unit is reported (and converted to has).
    pub fn holds_stock(self) -> bool {
        matches!(
            self,
            UnitRole::Storage | UnitRole::SemiFinished | UnitRole::InputOnly
        )
    }
}

impl fmt::Display for UnitRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnitRole::Storage => "storage",
            UnitRole::ProcessingFire => "processing_fire",
            UnitRole::SemiFinished => "semi_finished",
            UnitRole::InputOnly => "input_only",
            UnitRole::OutputOnly => "output_only",
        };
        f.write_str(s)
    }
}

/// A production unit. The set is closed; adding a unit means adding a variant
/// and giving it a role in [`UnitId::role`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum UnitId {
    /// Main vault.
    #[serde(alias = "vault")]
    Kasa,
    /// Casting.
    Dokum,
    /// Semi-finished goods.
    Yarimamul,
    /// Laser cutting.
    #[serde(alias = "laser-kesim")]
    LazerKesim,
    /// Bench work.
    Tezgah,
    /// Polishing.
    Cila,
    /// Raw material supply.
    Tedarik,
    /// Sales.
    Satis,
    /// External vault.
    DisKasa,
}

impl UnitId {
    pub const ALL: [UnitId; 9] = [
        UnitId::Kasa,
        UnitId::Dokum,
        UnitId::Yarimamul,
        UnitId::LazerKesim,
        UnitId::Tezgah,
        UnitId::Cila,
        UnitId::Tedarik,
        UnitId::Satis,
        UnitId::DisKasa,
    ];

    pub fn role(self) -> UnitRole {
        match self {
            UnitId::Kasa | UnitId::Dokum | UnitId::DisKasa => UnitRole::Storage,
            UnitId::Yarimamul => UnitRole::SemiFinished,
            UnitId::LazerKesim | UnitId::Tezgah | UnitId::Cila => UnitRole::ProcessingFire,
            UnitId::Tedarik => UnitRole::InputOnly,
            UnitId::Satis => UnitRole::OutputOnly,
        }
    }

    /// Stable wire identifier.
    pub fn as_str(self) -> &'static str {
        match self {
            UnitId::Kasa => "kasa",
            UnitId::Dokum => "dokum",
            UnitId::Yarimamul => "yarimamul",
            UnitId::LazerKesim => "lazer-kesim",
            UnitId::Tezgah => "tezgah",
            UnitId::Cila => "cila",
            UnitId::Tedarik => "tedarik",
            UnitId::Satis => "satis",
            UnitId::DisKasa => "dis-kasa",
        }
    }

    /// Display name used by the workshop.
    pub fn label(self) -> &'static str {
        match self {
            UnitId::Kasa => "Kasa",
            UnitId::Dokum => "Döküm",
            UnitId::Yarimamul => "Yarı Mamul",
            UnitId::LazerKesim => "Lazer Kesim",
            UnitId::Tezgah => "Tezgah",
            UnitId::Cila => "Cila",
            UnitId::Tedarik => "Tedarik",
            UnitId::Satis => "Satış",
            UnitId::DisKasa => "Dış Kasa",
        }
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        match wanted {
            "vault" => return Ok(UnitId::Kasa),
            "laser-kesim" => return Ok(UnitId::LazerKesim),
            _ => {}
        }
        UnitId::ALL
            .into_iter()
            .find(|u| u.as_str() == wanted)
            .ok_or_else(|| ValidationError::UnknownUnit {
                value: s.to_string(),
            })
    }
}
