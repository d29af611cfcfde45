use super::{parse_date, parse_positive_decimal};
use crate::core::error::ParseError;
use crate::core::model::TableLabel;
use chrono::NaiveDate;
use encoding_rs::ISO_8859_2;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::debug;

/// A "latest values" table, e.g. `LastA.xml`.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotDocument {
    /// Table identifier from the `typ` attribute, when present.
    pub table_type: Option<String>,
    pub table_number: Option<String>,
    pub publication_date: NaiveDate,
    pub entries: Vec<SnapshotEntry>,
}

impl SnapshotDocument {
    /// Fails when the `typ` attribute names a table other than `label`.
    /// Documents without the attribute are accepted.
    pub fn ensure_label(&self, label: TableLabel) -> Result<(), ParseError> {
        match &self.table_type {
            Some(found) if !found.eq_ignore_ascii_case(label.as_str()) => {
                Err(ParseError::LabelMismatch {
                    expected: label,
                    found: found.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub name: String,
    pub code: String,
    pub converter: Decimal,
    pub average_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct RawTable {
    #[serde(rename = "@typ", default)]
    table_type: Option<String>,
    #[serde(rename = "numer_tabeli", default)]
    table_number: Option<String>,
    #[serde(rename = "data_publikacji")]
    publication_date: String,
    #[serde(rename = "pozycja", default)]
    entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "nazwa_waluty")]
    name: String,
    #[serde(rename = "przelicznik")]
    converter: String,
    #[serde(rename = "kod_waluty")]
    code: String,
    #[serde(rename = "kurs_sredni")]
    average_price: String,
}

/// Decodes an ISO-8859-2 encoded snapshot table.
pub fn parse_snapshot(bytes: &[u8]) -> Result<SnapshotDocument, ParseError> {
    let (text, _, had_errors) = ISO_8859_2.decode(bytes);
    if had_errors {
        debug!("Snapshot contained bytes outside ISO-8859-2, replaced");
    }

    let raw: RawTable =
        quick_xml::de::from_str(&text).map_err(|e| ParseError::Xml(e.to_string()))?;

    let publication_date = parse_date(&raw.publication_date, "%Y-%m-%d")?;
    if raw.entries.is_empty() {
        return Err(ParseError::NoEntries);
    }

    let mut seen = HashSet::new();
    let entries = raw
        .entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let entry = decode_entry(entry).map_err(|e| ParseError::Entry {
                index,
                message: e.to_string(),
            })?;
            if !seen.insert(entry.code.clone()) {
                return Err(ParseError::DuplicateCode(entry.code));
            }
            Ok(entry)
        })
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        "Parsed snapshot {:?} from {} with {} entries",
        raw.table_number,
        publication_date,
        entries.len()
    );

    Ok(SnapshotDocument {
        table_type: raw.table_type.map(|t| t.trim().to_string()),
        table_number: raw.table_number.map(|n| n.trim().to_string()),
        publication_date,
        entries,
    })
}

fn decode_entry(raw: RawEntry) -> Result<SnapshotEntry, ParseError> {
    let code = raw.code.trim().to_uppercase();
    if code.is_empty() {
        return Err(ParseError::Xml("empty currency code".to_string()));
    }
    Ok(SnapshotEntry {
        name: raw.name.trim().to_string(),
        code,
        converter: parse_positive_decimal(&raw.converter)?,
        average_price: parse_positive_decimal(&raw.average_price)?,
    })
}
