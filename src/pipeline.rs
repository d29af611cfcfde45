//! Entry points driven by the CLI and the `watch` scheduler.
//!
//! [`Pipeline::refresh_documents`] downloads and deposits documents,
//! [`Pipeline::process_documents`] turns deposited documents into stored
//! prices. Both report per-label outcomes instead of failing, and both take
//! the same lock so they never overlap.

use crate::core::error::{DocumentKind, PipelineError, StoreError};
use crate::core::model::{Currency, CurrencyPrice, PriceTable, TableLabel};
use crate::core::price::HistoryRange;
use crate::core::repository::PersistenceGateway;
use crate::documents::{ArchiveDocument, parse_archive, parse_snapshot};
use crate::inbox::DocumentInbox;
use crate::providers::DocumentSource;
use crate::reconcile::{CommitResult, LabelChange, ReconciliationEngine, log_outcome};
use crate::trend::{self, Forecast, TrendModel, TrendLine};
use anyhow::{Result, anyhow};
use chrono::{Datelike, Days, Local, NaiveDate, NaiveTime};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Invoked after a processing run that wrote data.
pub type ChangeCallback = Arc<dyn Fn(&CommitResult) + Send + Sync>;

/// What a refresh deposited for one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelRefresh {
    pub publication_date: NaiveDate,
    pub entries: usize,
    /// Data rows of the deposited archive, if one was fetched.
    pub archive_rows: Option<usize>,
}

#[derive(Debug, Default)]
pub struct RefreshReport {
    per_label: BTreeMap<TableLabel, Result<LabelRefresh, PipelineError>>,
}

impl RefreshReport {
    pub fn get(&self, label: TableLabel) -> Option<&Result<LabelRefresh, PipelineError>> {
        self.per_label.get(&label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableLabel, &Result<LabelRefresh, PipelineError>)> {
        self.per_label.iter()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PipelineError> {
        self.per_label.values().filter_map(|outcome| outcome.as_ref().err())
    }
}

/// Prices of one currency over a range, with the fitted trend at each
/// observation when enough points exist.
#[derive(Debug, Clone)]
pub struct CurrencyHistory {
    pub currency: Currency,
    pub range: HistoryRange,
    pub prices: Vec<CurrencyPrice>,
    pub trend: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct CurrencyForecast {
    pub currency: Currency,
    /// Date of each projected value, starting at the latest observation.
    pub dates: Vec<NaiveDate>,
    pub forecast: Forecast,
}

pub struct Pipeline {
    source: Arc<dyn DocumentSource>,
    inbox: DocumentInbox,
    gateway: Arc<dyn PersistenceGateway>,
    on_change: Option<ChangeCallback>,
    lock: Mutex<()>,
    today: Option<NaiveDate>,
}

impl Pipeline {
    pub fn new(
        source: Arc<dyn DocumentSource>,
        inbox: DocumentInbox,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Self {
        Self {
            source,
            inbox,
            gateway,
            on_change: None,
            lock: Mutex::new(()),
            today: None,
        }
    }

    pub fn with_change_callback(mut self, callback: ChangeCallback) -> Self {
        self.on_change = Some(callback);
        self
    }

    /// Pins the date used to pick the archive year and range windows.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Downloads the snapshot of every label and, for labels that were never
    /// ingested, the current year's archive. Documents are only deposited
    /// once they decode.
    pub async fn refresh_documents(&self) -> RefreshReport {
        let _guard = self.lock.lock().await;
        let year = self.today().year();

        let outcomes = join_all(TableLabel::ALL.into_iter().map(|label| async move {
            (label, self.refresh_label(label, year).await)
        }))
        .await;

        let mut report = RefreshReport::default();
        for (label, outcome) in outcomes {
            match &outcome {
                Ok(refresh) => info!(
                    "Table {}: deposited snapshot from {} with {} entries",
                    label, refresh.publication_date, refresh.entries
                ),
                Err(e) => error!("Table {}: {}", label, e),
            }
            report.per_label.insert(label, outcome);
        }
        report
    }

    async fn refresh_label(&self, label: TableLabel, year: i32) -> Result<LabelRefresh, PipelineError> {
        let bytes = self
            .source
            .fetch_snapshot(label)
            .await
            .map_err(|e| PipelineError::Download {
                label,
                document: DocumentKind::Snapshot,
                reason: format!("{e:#}"),
            })?;
        let snapshot = parse_snapshot(&bytes)
            .and_then(|doc| doc.ensure_label(label).map(|()| doc))
            .map_err(|source| PipelineError::Parse {
                label,
                document: DocumentKind::Snapshot,
                source,
            })?;
        self.inbox
            .deposit_snapshot(label, &bytes)
            .map_err(|e| inbox_error(label, DocumentKind::Snapshot, e))?;

        let needs_archive = self
            .gateway
            .find_table_by_label(label)
            .map_err(|source| PipelineError::Persist { label, source })?
            .is_none();
        let archive_rows = if needs_archive {
            match self.refresh_archive(label, year).await {
                Ok(rows) => Some(rows),
                Err(e) => {
                    warn!("Table {}: continuing without archive, {}", label, e);
                    None
                }
            }
        } else {
            None
        };

        Ok(LabelRefresh {
            publication_date: snapshot.publication_date,
            entries: snapshot.entries.len(),
            archive_rows,
        })
    }

    async fn refresh_archive(&self, label: TableLabel, year: i32) -> Result<usize, PipelineError> {
        let bytes = self
            .source
            .fetch_archive(label, year)
            .await
            .map_err(|e| PipelineError::Download {
                label,
                document: DocumentKind::Archive,
                reason: format!("{e:#}"),
            })?;
        let archive = parse_archive(&bytes, year).map_err(|source| PipelineError::Parse {
            label,
            document: DocumentKind::Archive,
            source,
        })?;
        self.inbox
            .deposit_archive(label, year, &bytes)
            .map_err(|e| inbox_error(label, DocumentKind::Archive, e))?;
        Ok(archive.rows.len())
    }

    /// Applies deposited documents. Labels with no table are seeded from
    /// their archive when one is available, otherwise from the snapshot.
    /// Labels with nothing deposited are left out of the result.
    pub async fn process_documents(&self) -> CommitResult {
        let _guard = self.lock.lock().await;
        let engine = ReconciliationEngine::new(self.gateway.as_ref());
        let year = self.today().year();

        let mut result = CommitResult::default();
        for label in TableLabel::ALL {
            let Some(outcome) = self.process_label(&engine, label, year).transpose() else {
                debug!("Table {}: nothing to process", label);
                continue;
            };
            log_outcome(label, &outcome);
            result.insert(label, outcome);
        }

        if result.has_changes()
            && let Some(callback) = &self.on_change
        {
            callback(&result);
        }
        result
    }

    fn process_label(
        &self,
        engine: &ReconciliationEngine<'_>,
        label: TableLabel,
        year: i32,
    ) -> Result<Option<LabelChange>, PipelineError> {
        let has_table = self
            .gateway
            .find_table_by_label(label)
            .map_err(|source| PipelineError::Persist { label, source })?
            .is_some();

        if !has_table && let Some(archive) = self.load_archive(label, year)? {
            if !archive.rows.is_empty() {
                return engine.bootstrap_label(label, &archive).map(Some);
            }
            warn!("Table {}: archive has no rows, seeding from snapshot", label);
        }

        let Some(bytes) = self
            .inbox
            .read_snapshot(label)
            .map_err(|e| inbox_error(label, DocumentKind::Snapshot, e))?
        else {
            return Ok(None);
        };
        let snapshot = parse_snapshot(&bytes).map_err(|source| PipelineError::Parse {
            label,
            document: DocumentKind::Snapshot,
            source,
        })?;
        engine.reconcile_label(label, &snapshot).map(Some)
    }

    fn load_archive(&self, label: TableLabel, year: i32) -> Result<Option<ArchiveDocument>, PipelineError> {
        let Some(bytes) = self
            .inbox
            .read_archive(label, year)
            .map_err(|e| inbox_error(label, DocumentKind::Archive, e))?
        else {
            return Ok(None);
        };
        parse_archive(&bytes, year)
            .map(Some)
            .map_err(|source| PipelineError::Parse {
                label,
                document: DocumentKind::Archive,
                source,
            })
    }

    /// Refresh followed by process.
    pub async fn sync(&self) -> (RefreshReport, CommitResult) {
        let report = self.refresh_documents().await;
        let result = self.process_documents().await;
        (report, result)
    }

    pub fn tables(&self) -> Result<Vec<PriceTable>, StoreError> {
        self.gateway.all_tables()
    }

    /// All stored currencies ordered by code.
    pub fn currencies(&self) -> Result<Vec<Currency>, StoreError> {
        let mut currencies = self.gateway.all_currencies()?;
        currencies.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(currencies)
    }

    fn find_currency(&self, code: &str) -> Result<Currency> {
        let code = code.trim().to_uppercase();
        self.gateway
            .find_currency_by_code(&code)?
            .ok_or_else(|| anyhow!("Unknown currency: {}", code))
    }

    pub fn history(&self, code: &str, range: HistoryRange) -> Result<CurrencyHistory> {
        let currency = self.find_currency(code)?;
        let prices = match range.start_date(self.today()) {
            Some(start) => currency.prices_since(start).to_vec(),
            None => currency.prices().to_vec(),
        };

        let points: Vec<(f64, f64)> = prices.iter().filter_map(CurrencyPrice::as_point).collect();
        let trend = match TrendLine::fit(&points, TrendModel::default()) {
            Ok(line) => Some(points.iter().map(|(x, _)| line.predict(*x)).collect()),
            Err(e) => {
                debug!("No trend for {} over {}: {}", currency.code, range, e);
                None
            }
        };

        Ok(CurrencyHistory {
            currency,
            range,
            prices,
            trend,
        })
    }

    pub fn forecast(&self, code: &str, horizon_days: u32) -> Result<CurrencyForecast> {
        let currency = self.find_currency(code)?;
        let latest = currency
            .latest_price()
            .map(|p| p.date)
            .ok_or_else(|| anyhow!("No prices stored for {}", currency.code))?;

        let points: Vec<(f64, f64)> = currency
            .prices()
            .iter()
            .filter_map(CurrencyPrice::as_point)
            .collect();
        let now_millis = self
            .today()
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp_millis() as f64;
        let forecast = trend::forecast(&points, horizon_days, now_millis)?;

        let dates = (0..horizon_days)
            .filter_map(|i| latest.checked_add_days(Days::new(u64::from(i))))
            .collect();

        Ok(CurrencyForecast {
            currency,
            dates,
            forecast,
        })
    }
}

fn inbox_error(label: TableLabel, document: DocumentKind, err: anyhow::Error) -> PipelineError {
    PipelineError::Inbox {
        label,
        document,
        reason: format!("{err:#}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::SkipReason;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const ARCHIVE_A: &str = "data;1USD;1EUR;nr tabeli;\n\
                             ;dolar amerykanski;euro;;\n\
                             20240102;3,9432;4,3434;1/A/NBP/2024;\n\
                             20240103;3,9909;4,3646;2/A/NBP/2024;\n";

    fn snapshot_xml(date: &str, entries: &[(&str, &str)]) -> String {
        let body: String = entries
            .iter()
            .map(|(code, price)| {
                format!(
                    "<pozycja><nazwa_waluty>{code}</nazwa_waluty><przelicznik>1</przelicznik>\
                     <kod_waluty>{code}</kod_waluty><kurs_sredni>{price}</kurs_sredni></pozycja>"
                )
            })
            .collect();
        format!(
            "<tabela_kursow typ=\"A\"><numer_tabeli>3/A/NBP/2024</numer_tabeli>\
             <data_publikacji>{date}</data_publikacji>{body}</tabela_kursow>"
        )
    }

    /// Serves canned documents and counts archive requests.
    #[derive(Default)]
    struct FakeSource {
        snapshots: HashMap<TableLabel, Vec<u8>>,
        archives: HashMap<TableLabel, Vec<u8>>,
        archive_calls: AtomicUsize,
    }

    #[async_trait]
    impl DocumentSource for FakeSource {
        async fn fetch_snapshot(&self, label: TableLabel) -> Result<Vec<u8>> {
            self.snapshots
                .get(&label)
                .cloned()
                .ok_or_else(|| anyhow!("404 for snapshot {}", label))
        }

        async fn fetch_archive(&self, label: TableLabel, _year: i32) -> Result<Vec<u8>> {
            self.archive_calls.fetch_add(1, Ordering::SeqCst);
            self.archives
                .get(&label)
                .cloned()
                .ok_or_else(|| anyhow!("404 for archive {}", label))
        }
    }

    struct Fixture {
        _dir: TempDir,
        source: Arc<FakeSource>,
        store: Arc<MemoryStore>,
        pipeline: Pipeline,
        changes: Arc<AtomicUsize>,
    }

    fn fixture(source: FakeSource) -> Fixture {
        let dir = TempDir::new().unwrap();
        let source = Arc::new(source);
        let store = Arc::new(MemoryStore::new());
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&changes);

        let pipeline = Pipeline::new(
            source.clone(),
            DocumentInbox::new(dir.path().join("import")),
            store.clone(),
        )
        .with_change_callback(Arc::new(move |_: &CommitResult| {
            counter.fetch_add(1, Ordering::SeqCst);
        }))
        .with_today(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap());

        Fixture {
            _dir: dir,
            source,
            store,
            pipeline,
            changes,
        }
    }

    fn standard_source() -> FakeSource {
        let mut source = FakeSource::default();
        source.snapshots.insert(
            TableLabel::A,
            snapshot_xml(
                "2024-01-04",
                &[("USD", "4,0100"), ("EUR", "4,3800"), ("CHF", "4,6200")],
            )
            .into_bytes(),
        );
        source
            .archives
            .insert(TableLabel::A, ARCHIVE_A.as_bytes().to_vec());
        source
    }

    #[tokio::test]
    async fn test_refresh_deposits_snapshot_and_archive() {
        let f = fixture(standard_source());

        let report = f.pipeline.refresh_documents().await;
        let a = report.get(TableLabel::A).unwrap().as_ref().unwrap();
        assert_eq!(a.entries, 3);
        assert_eq!(a.archive_rows, Some(2));
        assert!(matches!(
            report.get(TableLabel::B),
            Some(Err(PipelineError::Download { .. }))
        ));
        assert_eq!(report.failures().count(), 1);

        assert!(f.pipeline.inbox.read_snapshot(TableLabel::A).unwrap().is_some());
        assert!(f.pipeline.inbox.read_archive(TableLabel::A, 2024).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_refresh_skips_archive_once_table_exists() {
        let f = fixture(standard_source());
        f.pipeline.sync().await;
        let calls = f.source.archive_calls.load(Ordering::SeqCst);

        f.pipeline.refresh_documents().await;
        assert_eq!(f.source.archive_calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_invalid_snapshot_is_not_deposited() {
        let mut source = FakeSource::default();
        source
            .snapshots
            .insert(TableLabel::A, b"<tabela_kursow>".to_vec());
        let f = fixture(source);

        let report = f.pipeline.refresh_documents().await;
        assert!(matches!(
            report.get(TableLabel::A),
            Some(Err(PipelineError::Parse {
                document: DocumentKind::Snapshot,
                ..
            }))
        ));
        assert!(f.pipeline.inbox.read_snapshot(TableLabel::A).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_of_other_table_is_not_deposited() {
        let mut source = standard_source();
        // Served as LastB.xml but holds table A
        source.snapshots.insert(
            TableLabel::B,
            snapshot_xml("2024-01-04", &[("AFN", "0,0547")]).into_bytes(),
        );
        let f = fixture(source);

        let report = f.pipeline.refresh_documents().await;
        assert!(matches!(
            report.get(TableLabel::B),
            Some(Err(PipelineError::Parse {
                document: DocumentKind::Snapshot,
                source: crate::core::error::ParseError::LabelMismatch { .. },
                ..
            }))
        ));
        assert!(f.pipeline.inbox.read_snapshot(TableLabel::B).unwrap().is_none());
        assert!(report.get(TableLabel::A).unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_process_rejects_deposited_snapshot_of_other_table() {
        let f = fixture(FakeSource::default());
        f.pipeline
            .inbox
            .deposit_snapshot(
                TableLabel::B,
                snapshot_xml("2024-01-04", &[("AFN", "0,0547")]).as_bytes(),
            )
            .unwrap();

        let result = f.pipeline.process_documents().await;
        assert!(matches!(
            result.get(TableLabel::B),
            Some(Err(PipelineError::Parse { .. }))
        ));
        assert!(f.store.find_table_by_label(TableLabel::B).unwrap().is_none());
        assert!(f.store.find_currency_by_code("AFN").unwrap().is_none());
        assert_eq!(f.changes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_archive_does_not_fail_label() {
        let mut source = standard_source();
        source.archives.clear();
        let f = fixture(source);

        let report = f.pipeline.refresh_documents().await;
        let a = report.get(TableLabel::A).unwrap().as_ref().unwrap();
        assert_eq!(a.archive_rows, None);
    }

    #[tokio::test]
    async fn test_process_bootstraps_then_reconciles() {
        let f = fixture(standard_source());
        f.pipeline.refresh_documents().await;

        let first = f.pipeline.process_documents().await;
        assert!(matches!(
            first.get(TableLabel::A),
            Some(Ok(LabelChange::Bootstrapped { currencies: 2, prices: 4, .. }))
        ));
        // Nothing was deposited for B
        assert!(first.get(TableLabel::B).is_none());

        let second = f.pipeline.process_documents().await;
        assert!(matches!(
            second.get(TableLabel::A),
            Some(Ok(LabelChange::Updated { prices: 3, new_currencies: 1, .. }))
        ));

        let third = f.pipeline.process_documents().await;
        assert!(matches!(
            third.get(TableLabel::A),
            Some(Ok(LabelChange::Skipped(SkipReason::AlreadyProcessed)))
        ));
        assert_eq!(f.changes.load(Ordering::SeqCst), 2);

        let usd = f.store.find_currency_by_code("USD").unwrap().unwrap();
        assert_eq!(usd.prices().len(), 3);
        let table = f.store.find_table_by_label(TableLabel::A).unwrap().unwrap();
        assert_eq!(table.publication_date, NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());
    }

    #[tokio::test]
    async fn test_empty_archive_falls_back_to_snapshot() {
        let mut source = standard_source();
        source.archives.insert(
            TableLabel::A,
            b"data;1USD;1EUR;;\n;dolar;euro;;\n20231229;3,9;4,3;;\n".to_vec(),
        );
        let f = fixture(source);
        f.pipeline.refresh_documents().await;

        let result = f.pipeline.process_documents().await;
        assert!(matches!(
            result.get(TableLabel::A),
            Some(Ok(LabelChange::Updated { new_currencies: 3, .. }))
        ));
        let table = f.store.find_table_by_label(TableLabel::A).unwrap().unwrap();
        assert_eq!(table.currency_codes.len(), 3);
    }

    #[tokio::test]
    async fn test_history_and_forecast_queries() {
        let f = fixture(standard_source());
        f.pipeline.sync().await;
        f.pipeline.process_documents().await;

        let history = f.pipeline.history("usd", HistoryRange::All).unwrap();
        assert_eq!(history.currency.code, "USD");
        assert_eq!(history.prices.len(), 3);
        assert_eq!(history.trend.as_ref().map(Vec::len), Some(3));

        // Only one CHF price, too few for a trend
        let chf = f.pipeline.history("CHF", HistoryRange::OneWeek).unwrap();
        assert!(chf.trend.is_none());

        let forecast = f.pipeline.forecast("USD", 3).unwrap();
        assert_eq!(forecast.forecast.values.len(), 3);
        assert_eq!(forecast.dates[0], NaiveDate::from_ymd_opt(2024, 1, 4).unwrap());

        assert!(f.pipeline.history("XXX", HistoryRange::All).is_err());
        assert!(f.pipeline.forecast("CHF", 3).is_err());
        assert_eq!(f.pipeline.currencies().unwrap().len(), 3);
    }
}
