//! Entity model persisted by the reconciliation engine.

use crate::core::error::StoreError;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Display;
use std::str::FromStr;

/// One of the two independent table series published by the bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum TableLabel {
    A,
    B,
}

impl TableLabel {
    pub const ALL: [TableLabel; 2] = [TableLabel::A, TableLabel::B];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableLabel::A => "A",
            TableLabel::B => "B",
        }
    }

    /// Lower-case form used in archive file names.
    pub fn as_lower(&self) -> &'static str {
        match self {
            TableLabel::A => "a",
            TableLabel::B => "b",
        }
    }
}

impl Display for TableLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TableLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "A" => Ok(TableLabel::A),
            "B" => Ok(TableLabel::B),
            _ => Err(anyhow::anyhow!("Invalid table label: {}", s)),
        }
    }
}

/// A single average price observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyPrice {
    pub date: NaiveDate,
    pub price: Decimal,
}

impl CurrencyPrice {
    pub fn new(date: NaiveDate, price: Decimal) -> Self {
        Self { date, price }
    }

    /// `(epoch millis, price)` pair consumed by the trend engine.
    pub fn as_point(&self) -> Option<(f64, f64)> {
        let millis = self
            .date
            .and_hms_opt(0, 0, 0)?
            .and_utc()
            .timestamp_millis() as f64;
        Some((millis, self.price.to_f64()?))
    }
}

/// A currency and its price history, ordered by date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    pub code: String,
    pub name: String,
    pub converter: Decimal,
    #[serde(default)]
    prices: Vec<CurrencyPrice>,
}

impl Currency {
    pub fn new(code: impl Into<String>, name: impl Into<String>, converter: Decimal) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            converter,
            prices: Vec::new(),
        }
    }

    pub fn prices(&self) -> &[CurrencyPrice] {
        &self.prices
    }

    pub fn has_price_on(&self, date: NaiveDate) -> bool {
        self.prices.binary_search_by_key(&date, |p| p.date).is_ok()
    }

    /// Records a price, keeping the history sorted. A second price for the
    /// same date is rejected.
    pub fn add_price(&mut self, date: NaiveDate, price: Decimal) -> Result<(), StoreError> {
        match self.prices.binary_search_by_key(&date, |p| p.date) {
            Ok(_) => Err(StoreError::DuplicatePrice {
                code: self.code.clone(),
                date,
            }),
            Err(pos) => {
                self.prices.insert(pos, CurrencyPrice::new(date, price));
                Ok(())
            }
        }
    }

    pub fn latest_price(&self) -> Option<&CurrencyPrice> {
        self.prices.last()
    }

    /// Prices observed on or after `since`.
    pub fn prices_since(&self, since: NaiveDate) -> &[CurrencyPrice] {
        let start = self.prices.partition_point(|p| p.date < since);
        &self.prices[start..]
    }
}

/// Anchor for one published table series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceTable {
    pub label: TableLabel,
    pub publication_date: NaiveDate,
    #[serde(default)]
    pub table_number: Option<String>,
    /// Codes of the currencies first introduced through this table.
    #[serde(default)]
    pub currency_codes: BTreeSet<String>,
}

impl PriceTable {
    pub fn new(label: TableLabel, publication_date: NaiveDate) -> Self {
        Self {
            label,
            publication_date,
            table_number: None,
            currency_codes: BTreeSet::new(),
        }
    }
}
