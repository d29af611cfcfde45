use super::{parse_date, parse_positive_decimal};
use crate::core::error::ParseError;
use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use encoding_rs::WINDOWS_1250;
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::debug;

/// A yearly archive table, e.g. `archiwum_tab_a_2024.csv`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveDocument {
    pub columns: Vec<ArchiveColumn>,
    pub rows: Vec<ArchiveRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveColumn {
    pub code: String,
    pub name: String,
    pub converter: Decimal,
}

/// One publication day. `prices[i]` belongs to `columns[i]`; ragged rows
/// carry fewer prices than there are columns.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRow {
    pub date: NaiveDate,
    pub prices: Vec<Decimal>,
}

impl ArchiveDocument {
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.rows.iter().map(|row| row.date).max()
    }

    /// Iterates `(column, date, price)` for every present cell.
    pub fn cells(&self) -> impl Iterator<Item = (&ArchiveColumn, NaiveDate, Decimal)> + '_ {
        self.rows.iter().flat_map(move |row| {
            row.prices
                .iter()
                .zip(&self.columns)
                .map(move |(price, column)| (column, row.date, *price))
        })
    }
}

/// Splits a glued header token such as `100JPY` (or `JPY100`) into its
/// converter and currency code.
pub fn split_header_token(token: &str) -> Result<(Decimal, String), ParseError> {
    let token = token.trim();
    let malformed = || ParseError::HeaderToken(token.to_string());

    let digits_first = token.starts_with(|c: char| c.is_ascii_digit());
    let boundary = token
        .find(|c: char| c.is_ascii_digit() != digits_first)
        .ok_or_else(malformed)?;
    let (head, tail) = token.split_at(boundary);
    let (number, code) = if digits_first {
        (head, tail)
    } else {
        (tail, head)
    };

    if !number.chars().all(|c| c.is_ascii_digit()) || !code.chars().all(char::is_alphabetic) {
        return Err(malformed());
    }
    let converter = parse_positive_decimal(number).map_err(|_| malformed())?;
    Ok((converter, code.to_uppercase()))
}

/// Decodes a Windows-1250 encoded, semicolon separated archive. Data rows
/// are read until the first row whose date does not belong to
/// `current_year`; everything from there on is footer.
pub fn parse_archive(bytes: &[u8], current_year: i32) -> Result<ArchiveDocument, ParseError> {
    let (text, _, had_errors) = WINDOWS_1250.decode(bytes);
    if had_errors {
        debug!("Archive contained bytes outside Windows-1250, replaced");
    }

    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();

    let codes_row = records.next().ok_or(ParseError::MissingHeader)??;
    let names_row = records.next().ok_or(ParseError::MissingHeader)??;

    let mut columns = decode_codes_row(&codes_row)?;
    if columns.is_empty() {
        return Err(ParseError::MissingHeader);
    }
    apply_names_row(&names_row, &mut columns);

    let year_prefix = current_year.to_string();
    let mut rows = Vec::new();
    let mut seen_dates = HashSet::new();
    for (index, record) in records.enumerate() {
        let record = record?;
        // Header rows are lines 1 and 2
        let line = index + 3;
        let leading = record.get(0).map(str::trim).unwrap_or_default();
        if !leading.starts_with(&year_prefix) {
            debug!("Archive footer reached at line {}", line);
            break;
        }

        let row = decode_data_row(&record, columns.len()).map_err(|e| ParseError::Row {
            row: line,
            message: e.to_string(),
        })?;
        if !seen_dates.insert(row.date) {
            return Err(ParseError::Row {
                row: line,
                message: format!("date {} appears more than once", row.date),
            });
        }
        rows.push(row);
    }

    debug!(
        "Parsed archive with {} currencies and {} rows",
        columns.len(),
        rows.len()
    );
    Ok(ArchiveDocument { columns, rows })
}

fn decode_codes_row(record: &StringRecord) -> Result<Vec<ArchiveColumn>, ParseError> {
    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    for cell in record.iter().skip(1) {
        let cell = cell.trim();
        // A blank cell or a caption without digits ends the currency columns
        if cell.is_empty() || !cell.chars().any(|c| c.is_ascii_digit()) {
            break;
        }
        let (converter, code) = split_header_token(cell)?;
        if !seen.insert(code.clone()) {
            return Err(ParseError::DuplicateCode(code));
        }
        columns.push(ArchiveColumn {
            name: code.clone(),
            code,
            converter,
        });
    }
    Ok(columns)
}

fn apply_names_row(record: &StringRecord, columns: &mut [ArchiveColumn]) {
    for (cell, column) in record.iter().skip(1).zip(columns.iter_mut()) {
        let name = cell.trim();
        if name.is_empty() {
            break;
        }
        column.name = name.to_string();
    }
}

fn decode_data_row(record: &StringRecord, column_count: usize) -> Result<ArchiveRow, ParseError> {
    let raw_date = record.get(0).map(str::trim).unwrap_or_default();
    if raw_date.len() != 8 || !raw_date.chars().all(|c| c.is_ascii_digit()) {
        return Err(ParseError::Date(raw_date.to_string()));
    }
    let date = parse_date(raw_date, "%Y%m%d")?;

    let mut prices = Vec::with_capacity(column_count);
    for cell in record.iter().skip(1).take(column_count) {
        let cell = cell.trim();
        if cell.is_empty() {
            break;
        }
        prices.push(parse_positive_decimal(cell)?);
    }
    Ok(ArchiveRow { date, prices })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(csv: &str) -> Vec<u8> {
        let (bytes, _, had_errors) = WINDOWS_1250.encode(csv);
        assert!(!had_errors);
        bytes.into_owned()
    }

    const HEADER: &str = "data;1USD;100JPY;1EUR;nr tabeli;pełny numer tabeli;\n\
                          ;dolar amerykański;jen (Japonia);euro;;;\n";

    #[test]
    fn test_split_header_token() {
        assert_eq!(
            split_header_token("1USD").unwrap(),
            (Decimal::ONE, "USD".to_string())
        );
        assert_eq!(
            split_header_token("100JPY").unwrap(),
            (Decimal::new(100, 0), "JPY".to_string())
        );
        assert_eq!(
            split_header_token("HUF100").unwrap(),
            (Decimal::new(100, 0), "HUF".to_string())
        );
        assert!(split_header_token("1US1").is_err());
        assert!(split_header_token("USD").is_err());
        assert!(split_header_token("100").is_err());
        assert!(split_header_token("0USD").is_err());
    }

    #[test]
    fn test_parse_archive() {
        let csv = format!(
            "{HEADER}\
             20240102;3,9432;2,7714;4,3434;1/A/NBP/2024;001/A/NBP/2024;\n\
             20240103;3,9909;2,7877;4,3646;2/A/NBP/2024;002/A/NBP/2024;\n"
        );

        let doc = parse_archive(&encode(&csv), 2024).unwrap();
        assert_eq!(doc.columns.len(), 3);
        assert_eq!(doc.columns[0].code, "USD");
        assert_eq!(doc.columns[0].name, "dolar amerykański");
        assert_eq!(doc.columns[1].code, "JPY");
        assert_eq!(doc.columns[1].converter, Decimal::new(100, 0));
        assert_eq!(doc.columns[2].name, "euro");

        assert_eq!(doc.rows.len(), 2);
        assert_eq!(doc.rows[1].prices[0], Decimal::new(39909, 4));
        assert_eq!(doc.latest_date(), NaiveDate::from_ymd_opt(2024, 1, 3));
        assert_eq!(doc.cells().count(), 6);
    }

    #[test]
    fn test_footer_truncation() {
        let csv = format!(
            "{HEADER}\
             20240102;3,9432;2,7714;4,3434;1/A/NBP/2024;001/A/NBP/2024;\n\
             20231231;9,9999;9,9999;9,9999;;;\n\
             20240104;3,9700;2,7800;4,3500;;;\n"
        );

        let doc = parse_archive(&encode(&csv), 2024).unwrap();
        assert_eq!(doc.rows.len(), 1);
        assert_eq!(doc.latest_date(), NaiveDate::from_ymd_opt(2024, 1, 2));
    }

    #[test]
    fn test_footer_after_blank_line_is_ignored() {
        let csv = format!(
            "{HEADER}\
             20240102;3,9432;2,7714;4,3434;;;\n\
             ;;;;;;\n\
             kod ISO;USD;JPY;EUR;;;\n\
             liczba jednostek;1;100;1;;;\n"
        );

        let doc = parse_archive(&encode(&csv), 2024).unwrap();
        assert_eq!(doc.rows.len(), 1);
    }

    #[test]
    fn test_ragged_row_stops_at_blank_cell() {
        let csv = format!(
            "{HEADER}\
             20240102;3,9432;;4,3434;;;\n\
             20240103;3,9909\n"
        );

        let doc = parse_archive(&encode(&csv), 2024).unwrap();
        assert_eq!(doc.rows[0].prices, vec![Decimal::new(39432, 4)]);
        assert_eq!(doc.rows[1].prices, vec![Decimal::new(39909, 4)]);
        assert_eq!(doc.cells().count(), 2);
    }

    #[test]
    fn test_malformed_price_fails_document() {
        let csv = format!(
            "{HEADER}\
             20240102;3,9432;2,7714;4,3434;;;\n\
             20240103;3,9909;abc;4,3646;;;\n"
        );

        let err = parse_archive(&encode(&csv), 2024).unwrap_err();
        assert!(matches!(err, ParseError::Row { row: 4, .. }), "{err}");
    }

    #[test]
    fn test_malformed_date_in_current_year_fails() {
        let csv = format!("{HEADER}2024-01-02;3,9432;2,7714;4,3434;;;\n");
        assert!(parse_archive(&encode(&csv), 2024).is_err());
    }

    #[test]
    fn test_malformed_header_fails() {
        let csv = "data;1USD;1U5D;;\n;dolar;x;;\n20240102;3,9;1,0;;\n";
        assert!(matches!(
            parse_archive(&encode(csv), 2024).unwrap_err(),
            ParseError::HeaderToken(_)
        ));

        let csv = "data;1USD;1USD;;\n;dolar;dolar;;\n";
        assert!(matches!(
            parse_archive(&encode(csv), 2024).unwrap_err(),
            ParseError::DuplicateCode(_)
        ));

        assert!(matches!(
            parse_archive(&encode("data;1USD;;\n"), 2024).unwrap_err(),
            ParseError::MissingHeader
        ));
    }

    #[test]
    fn test_missing_names_fall_back_to_code() {
        let csv = "data;1USD;1EUR;;\n;dolar amerykański;;;\n20240102;3,9;4,3;;\n";
        let doc = parse_archive(&encode(csv), 2024).unwrap();
        assert_eq!(doc.columns[0].name, "dolar amerykański");
        assert_eq!(doc.columns[1].name, "EUR");
    }
}
