use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::DomainError;

pub const QUOTE_NUMBER_PREFIX: &str = "QT";
const SEQUENCE_WIDTH: usize = 4;

/// Human-readable, year-scoped quote identifier: `QT-<year>-<seq>`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QuoteNumber {
    year: i32,
    sequence: u32,
}

impl QuoteNumber {
    pub fn new(year: i32, sequence: u32) -> Result<Self, DomainError> {
        if sequence == 0 {
            return Err(DomainError::validation("quote_number", "sequence starts at 1"));
        }
        if !(1000..=9999).contains(&year) {
            return Err(DomainError::validation("quote_number", "year must have four digits"));
        }
        Ok(Self { year, sequence })
    }

    pub fn first(year: i32) -> Result<Self, DomainError> {
        Self::new(year, 1)
    }

    /// Number that follows the highest sequence already used in `year`.
    /// A year with no history starts at 1, whatever the previous year reached.
    pub fn following(year: i32, highest_sequence: Option<u32>) -> Result<Self, DomainError> {
        let next = highest_sequence.unwrap_or(0).checked_add(1).ok_or_else(|| {
            DomainError::InvariantViolation(format!("quote sequence exhausted for {year}"))
        })?;
        Self::new(year, next)
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Prefix shared by every number issued in `year`, e.g. `QT-2026-`.
    pub fn year_prefix(year: i32) -> String {
        format!("{QUOTE_NUMBER_PREFIX}-{year}-")
    }
}

impl fmt::Display for QuoteNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{QUOTE_NUMBER_PREFIX}-{}-{:0width$}",
            self.year,
            self.sequence,
            width = SEQUENCE_WIDTH
        )
    }
}

impl FromStr for QuoteNumber {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || {
            DomainError::validation("quote_number", format!("`{value}` is not QT-<year>-<seq>"))
        };

        let mut parts = value.trim().splitn(3, '-');
        let (Some(prefix), Some(year), Some(sequence)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        if prefix != QUOTE_NUMBER_PREFIX
            || year.len() != 4
            || sequence.len() < SEQUENCE_WIDTH
            || !sequence.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let sequence = sequence.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, sequence)
    }
}

impl Serialize for QuoteNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for QuoteNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
