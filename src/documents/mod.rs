//! Decoders for the two published document formats.
//!
//! Both decoders are pure: they take raw bytes and return either a complete
//! document or a [`ParseError`]. A document is never returned half-parsed.

pub mod archive;
pub mod snapshot;

use crate::core::error::ParseError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::str::FromStr;

pub use archive::{ArchiveColumn, ArchiveDocument, ArchiveRow, parse_archive, split_header_token};
pub use snapshot::{SnapshotDocument, SnapshotEntry, parse_snapshot};

/// Parses a number written with a decimal comma, e.g. `"4,0512"`.
pub fn parse_decimal_comma(raw: &str) -> Result<Decimal, ParseError> {
    let normalized = raw.trim().replace(',', ".");
    if normalized.is_empty() {
        return Err(ParseError::Decimal(raw.to_string()));
    }
    Decimal::from_str(&normalized).map_err(|_| ParseError::Decimal(raw.to_string()))
}

/// Like [`parse_decimal_comma`] but rejects zero and negative values.
pub fn parse_positive_decimal(raw: &str) -> Result<Decimal, ParseError> {
    let value = parse_decimal_comma(raw)?;
    if value <= Decimal::ZERO {
        return Err(ParseError::NotPositive(raw.to_string()));
    }
    Ok(value)
}

pub(crate) fn parse_date(raw: &str, format: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(raw.trim(), format).map_err(|_| ParseError::Date(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_decimal_comma() {
        assert_eq!(parse_decimal_comma("4,0512").unwrap(), Decimal::new(40512, 4));
        assert_eq!(parse_decimal_comma(" 100 ").unwrap(), Decimal::new(100, 0));
        assert_eq!(parse_decimal_comma("0.5").unwrap(), Decimal::new(5, 1));
        assert!(parse_decimal_comma("").is_err());
        assert!(parse_decimal_comma("4,05,12").is_err());
        assert!(parse_decimal_comma("abc").is_err());
    }

    #[test]
    fn test_parse_positive_decimal() {
        assert!(parse_positive_decimal("0,0").is_err());
        assert!(parse_positive_decimal("-1,5").is_err());
        assert!(parse_positive_decimal("0,0001").is_ok());
    }
}
