//! Price history windows

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Trailing window applied to a price history before charting or fitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum HistoryRange {
    OneWeek,
    OneMonth,
    SixMonths,
    OneYear,
    FiveYears,
    All,
}

impl Display for HistoryRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                HistoryRange::OneWeek => "1W",
                HistoryRange::OneMonth => "1M",
                HistoryRange::SixMonths => "6M",
                HistoryRange::OneYear => "1Y",
                HistoryRange::FiveYears => "5Y",
                HistoryRange::All => "ALL",
            }
        )
    }
}

impl HistoryRange {
    /// First date inside the window ending at `today`, or `None` for the
    /// whole history.
    pub fn start_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            HistoryRange::OneWeek => Some(today - chrono::Duration::weeks(1)),
            HistoryRange::OneMonth => today.checked_sub_months(Months::new(1)),
            HistoryRange::SixMonths => today.checked_sub_months(Months::new(6)),
            HistoryRange::OneYear => today.checked_sub_months(Months::new(12)),
            HistoryRange::FiveYears => today.checked_sub_months(Months::new(60)),
            HistoryRange::All => None,
        }
    }
}

impl FromStr for HistoryRange {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "1W" => Ok(HistoryRange::OneWeek),
            "1M" => Ok(HistoryRange::OneMonth),
            "6M" => Ok(HistoryRange::SixMonths),
            "1Y" => Ok(HistoryRange::OneYear),
            "5Y" => Ok(HistoryRange::FiveYears),
            "ALL" => Ok(HistoryRange::All),
            _ => Err(anyhow::anyhow!("Invalid history range: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_range_round_trip() {
        for range in [
            HistoryRange::OneWeek,
            HistoryRange::OneMonth,
            HistoryRange::SixMonths,
            HistoryRange::OneYear,
            HistoryRange::FiveYears,
            HistoryRange::All,
        ] {
            assert_eq!(range.to_string().parse::<HistoryRange>().unwrap(), range);
        }
        assert!("2D".parse::<HistoryRange>().is_err());
    }

    #[test]
    fn test_history_range_start_date() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        assert_eq!(
            HistoryRange::OneWeek.start_date(today),
            NaiveDate::from_ymd_opt(2024, 3, 24)
        );
        // Month arithmetic clamps to the last day of the shorter month
        assert_eq!(
            HistoryRange::OneMonth.start_date(today),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(
            HistoryRange::FiveYears.start_date(today),
            NaiveDate::from_ymd_opt(2019, 3, 31)
        );
        assert_eq!(HistoryRange::All.start_date(today), None);
    }
}
