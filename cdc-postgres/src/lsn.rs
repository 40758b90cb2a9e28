use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_postgres::types::PgLsn;

/// Error returned when a textual LSN is not of the form `X/X`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid log sequence number `{0}`")]
pub struct ParseLsnError(String);

/// A Postgres log sequence number, a 64-bit position in the write-ahead log.
///
/// The textual form is two upper-case hexadecimal numbers separated by a slash, the high and
/// low 32 bits respectively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(u64);

impl Lsn {
    /// The zero position, used by Postgres to mean "no position".
    pub const INVALID: Lsn = Lsn(0);

    pub const fn new(value: u64) -> Lsn {
        Lsn(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Formats a raw 64-bit WAL position in the `X/X` notation.
pub fn format_lsn(value: u64) -> String {
    Lsn(value).to_string()
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:X}", self.0 >> 32, self.0 & 0xffff_ffff)
    }
}

impl FromStr for Lsn {
    type Err = ParseLsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s.split_once('/').ok_or_else(|| ParseLsnError(s.to_owned()))?;
        let hi = u32::from_str_radix(hi, 16).map_err(|_| ParseLsnError(s.to_owned()))?;
        let lo = u32::from_str_radix(lo, 16).map_err(|_| ParseLsnError(s.to_owned()))?;

        Ok(Lsn((u64::from(hi) << 32) | u64::from(lo)))
    }
}

impl From<u64> for Lsn {
    fn from(value: u64) -> Self {
        Lsn(value)
    }
}

impl From<Lsn> for u64 {
    fn from(lsn: Lsn) -> Self {
        lsn.0
    }
}

impl From<PgLsn> for Lsn {
    fn from(lsn: PgLsn) -> Self {
        Lsn(u64::from(lsn))
    }
}

impl From<Lsn> for PgLsn {
    fn from(lsn: Lsn) -> Self {
        PgLsn::from(lsn.0)
    }
}

impl Serialize for Lsn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Lsn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_high_and_low_halves() {
        assert_eq!(Lsn::new(0x16_B374_D848).to_string(), "16/B374D848");
        assert_eq!(format_lsn(0), "0/0");
    }

    #[test]
    fn parses_textual_form() {
        assert_eq!("16/B374D848".parse::<Lsn>().unwrap(), Lsn::new(0x16_B374_D848));
        assert!("16B374D848".parse::<Lsn>().is_err());
        assert!("zz/1".parse::<Lsn>().is_err());
    }

    #[test]
    fn ordering_follows_numeric_value() {
        assert!(Lsn::new(10) < Lsn::new(11));
        assert!(!Lsn::INVALID.is_valid());
    }

    #[test]
    fn serializes_as_string() {
        let json = serde_json::to_string(&Lsn::new(0x1_0000_0010)).unwrap();
        assert_eq!(json, "\"1/10\"");
        let lsn: Lsn = serde_json::from_str(&json).unwrap();
        assert_eq!(lsn, Lsn::new(0x1_0000_0010));
    }
}
