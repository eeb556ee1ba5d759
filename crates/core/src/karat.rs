//! Purity grades and their has (24K-equivalent) conversion ratios.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A gold purity grade.
///
/// On the wire a karat is the bare integer `14|18|22|24`, never `"14K"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Karat {
    K14,
    K18,
    K22,
    K24,
}

impl Karat {
    /// Every grade, in ascending purity.
    pub const ALL: [Karat; 4] = [Karat::K14, Karat::K18, Karat::K22, Karat::K24];

    /// The numeric grade (14, 18, 22 or 24).
    pub fn grade(self) -> u32 {
        match self {
            Karat::K14 => 14,
            Karat::K18 => 18,
            Karat::K22 => 22,
            Karat::K24 => 24,
        }
    }

    pub fn from_grade(grade: u32) -> Option<Karat> {
        match grade {
            14 => Some(Karat::K14),
            18 => Some(Karat::K18),
            22 => Some(Karat::K22),
            24 => Some(Karat::K24),
            _ => None,
        }
    }

    /// Fraction of pure gold in one gram of this grade: `grade / 24`.
    ///
    /// Always in `(0, 1]`; 24K is exactly one.
    pub fn has_ratio(self) -> Decimal {
        match self {
            Karat::K24 => Decimal::ONE,
            k => Decimal::from(k.grade()) / Decimal::from(24u32),
        }
    }
}

impl TryFrom<u32> for Karat {
    type Error = ValidationError;

    fn try_from(grade: u32) -> Result<Self, Self::Error> {
        Karat::from_grade(grade).ok_or_else(|| ValidationError::UnknownKarat {
            value: grade.to_string(),
        })
    }
}

impl From<Karat> for u32 {
    fn from(k: Karat) -> u32 {
        k.grade()
    }
}

impl fmt::Display for Karat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}K", self.grade())
    }
}

/// Accepts `18`, `18K` and `18k`.
impl FromStr for Karat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_suffix('K')
            .or_else(|| trimmed.strip_suffix('k'))
            .unwrap_or(trimmed);
        digits
            .parse::<u32>()
            .ok()
            .and_then(Karat::from_grade)
            .ok_or_else(|| ValidationError::UnknownKarat {
                value: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratios_are_grade_over_24() {
        assert_eq!(Karat::K18.has_ratio(), Decimal::new(75, 2));
        assert_eq!(Karat::K24.has_ratio(), Decimal::ONE);
        for k in Karat::ALL {
            let r = k.has_ratio();
            assert!(r > Decimal::ZERO && r <= Decimal::ONE, "{k}: {r}");
        }
    }

    #[test]
    fn serializes_as_bare_integer() {
        assert_eq!(serde_json::to_string(&Karat::K22).unwrap(), "22");
        let k: Karat = serde_json::from_str("14").unwrap();
        assert_eq!(k, Karat::K14);
    }

    #[test]
    fn rejects_unknown_grade_on_the_wire() {
        assert!(serde_json::from_str::<Karat>("10").is_err());
        assert!(serde_json::from_str::<Karat>("\"14K\"").is_err());
    }

    #[test]
    fn parses_human_forms() {
        assert_eq!("18".parse::<Karat>().unwrap(), Karat::K18);
        assert_eq!("22K".parse::<Karat>().unwrap(), Karat::K22);
        assert_eq!(" 24k ".parse::<Karat>().unwrap(), Karat::K24);
        assert!(matches!(
            "9K".parse::<Karat>(),
            Err(ValidationError::UnknownKarat { .. })
        ));
    }
}
