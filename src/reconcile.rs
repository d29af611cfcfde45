//! Merges decoded documents into the persisted currency model.
//!
//! Every label is handled in its own [`UnitOfWork`]: a failure while
//! applying table B never undoes the work already committed for table A.

use crate::core::error::{DocumentKind, ParseError, PipelineError, StoreError};
use crate::core::model::{Currency, PriceTable, TableLabel};
use crate::core::repository::{PersistenceGateway, UnitOfWork, WriteMode};
use crate::documents::{ArchiveDocument, SnapshotDocument};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt::Display;
use tracing::{debug, error, info, warn};

/// Why a label was left untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A table already exists, archives are only used to seed.
    AlreadyBootstrapped,
    /// The stored publication date equals the snapshot's.
    AlreadyProcessed,
    /// The stored publication date is newer than the snapshot's.
    StaleDocument,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyBootstrapped => write!(f, "already bootstrapped"),
            SkipReason::AlreadyProcessed => write!(f, "already processed"),
            SkipReason::StaleDocument => write!(f, "document older than stored table"),
        }
    }
}

/// Outcome of a successful run for one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelChange {
    Bootstrapped {
        publication_date: NaiveDate,
        currencies: usize,
        prices: usize,
    },
    Updated {
        publication_date: NaiveDate,
        prices: usize,
        new_currencies: usize,
    },
    Skipped(SkipReason),
}

impl LabelChange {
    /// Whether anything was written.
    pub fn is_change(&self) -> bool {
        !matches!(self, LabelChange::Skipped(_))
    }
}

impl Display for LabelChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LabelChange::Bootstrapped {
                publication_date,
                currencies,
                prices,
            } => write!(
                f,
                "bootstrapped {currencies} currencies with {prices} prices up to {publication_date}"
            ),
            LabelChange::Updated {
                publication_date,
                prices,
                new_currencies,
            } => write!(
                f,
                "added {prices} prices for {publication_date} ({new_currencies} new currencies)"
            ),
            LabelChange::Skipped(reason) => write!(f, "skipped, {reason}"),
        }
    }
}

/// Per-label outcomes of one run.
#[derive(Debug, Default)]
pub struct CommitResult {
    per_label: BTreeMap<TableLabel, Result<LabelChange, PipelineError>>,
}

impl CommitResult {
    pub fn insert(&mut self, label: TableLabel, outcome: Result<LabelChange, PipelineError>) {
        self.per_label.insert(label, outcome);
    }

    pub fn get(&self, label: TableLabel) -> Option<&Result<LabelChange, PipelineError>> {
        self.per_label.get(&label)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableLabel, &Result<LabelChange, PipelineError>)> {
        self.per_label.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.per_label.is_empty()
    }

    pub fn len(&self) -> usize {
        self.per_label.len()
    }

    /// True when at least one label wrote data.
    pub fn has_changes(&self) -> bool {
        self.per_label
            .values()
            .any(|outcome| matches!(outcome, Ok(change) if change.is_change()))
    }

    pub fn failures(&self) -> impl Iterator<Item = &PipelineError> {
        self.per_label.values().filter_map(|outcome| outcome.as_ref().err())
    }
}

pub struct ReconciliationEngine<'a> {
    gateway: &'a dyn PersistenceGateway,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(gateway: &'a dyn PersistenceGateway) -> Self {
        Self { gateway }
    }

    /// Seeds every label that has no table yet from its archive.
    pub fn bootstrap(&self, archives: &BTreeMap<TableLabel, ArchiveDocument>) -> CommitResult {
        let mut result = CommitResult::default();
        for (label, archive) in archives {
            let outcome = self.bootstrap_label(*label, archive);
            log_outcome(*label, &outcome);
            result.insert(*label, outcome);
        }
        result
    }

    /// Applies snapshots, seeding labels that have no table yet.
    pub fn reconcile(&self, snapshots: &BTreeMap<TableLabel, SnapshotDocument>) -> CommitResult {
        let mut result = CommitResult::default();
        for (label, snapshot) in snapshots {
            let outcome = self.reconcile_label(*label, snapshot);
            log_outcome(*label, &outcome);
            result.insert(*label, outcome);
        }
        result
    }

    pub fn bootstrap_label(
        &self,
        label: TableLabel,
        archive: &ArchiveDocument,
    ) -> Result<LabelChange, PipelineError> {
        let persist = |source: StoreError| PipelineError::Persist { label, source };
        let mut uow = UnitOfWork::begin(self.gateway, format!("bootstrap table {label}"));

        if uow.find_table_by_label(label).map_err(persist)?.is_some() {
            return Ok(LabelChange::Skipped(SkipReason::AlreadyBootstrapped));
        }
        let latest = archive
            .latest_date()
            .ok_or_else(|| PipelineError::Parse {
                label,
                document: DocumentKind::Archive,
                source: ParseError::EmptyArchive,
            })?;

        let mut table = PriceTable::new(label, latest);
        let mut created = 0;
        let mut prices = 0;

        for (index, column) in archive.columns.iter().enumerate() {
            let (mut currency, mode) = match uow.find_currency_by_code(&column.code).map_err(persist)? {
                Some(existing) => (existing, WriteMode::Update),
                None => (
                    Currency::new(&column.code, &column.name, column.converter),
                    WriteMode::Create,
                ),
            };

            let mut added = 0;
            for row in &archive.rows {
                let Some(price) = row.prices.get(index) else {
                    continue;
                };
                // A currency shared with the other table keeps what it has
                if mode == WriteMode::Update && currency.has_price_on(row.date) {
                    continue;
                }
                currency.add_price(row.date, *price).map_err(persist)?;
                added += 1;
            }

            if mode == WriteMode::Create {
                table.currency_codes.insert(column.code.clone());
                created += 1;
            } else if added == 0 {
                continue;
            }
            prices += added;
            uow.save_currency(currency, mode).map_err(persist)?;
        }

        uow.save_table(table, WriteMode::Create).map_err(persist)?;
        uow.commit().map_err(persist)?;

        Ok(LabelChange::Bootstrapped {
            publication_date: latest,
            currencies: created,
            prices,
        })
    }

    pub fn reconcile_label(
        &self,
        label: TableLabel,
        snapshot: &SnapshotDocument,
    ) -> Result<LabelChange, PipelineError> {
        snapshot
            .ensure_label(label)
            .map_err(|source| PipelineError::Parse {
                label,
                document: DocumentKind::Snapshot,
                source,
            })?;
        let persist = |source: StoreError| PipelineError::Persist { label, source };
        let date = snapshot.publication_date;
        let mut uow = UnitOfWork::begin(self.gateway, format!("reconcile table {label}"));

        let (mut table, table_mode) = match uow.find_table_by_label(label).map_err(persist)? {
            Some(table) if table.publication_date == date => {
                return Ok(LabelChange::Skipped(SkipReason::AlreadyProcessed));
            }
            Some(table) if table.publication_date > date => {
                debug!(
                    "Snapshot for {} dated {} is older than stored {}",
                    label, date, table.publication_date
                );
                return Ok(LabelChange::Skipped(SkipReason::StaleDocument));
            }
            Some(table) => (table, WriteMode::Update),
            None => (PriceTable::new(label, date), WriteMode::Create),
        };

        let mut new_currencies = 0;
        for entry in &snapshot.entries {
            let (mut currency, mode) = match uow.find_currency_by_code(&entry.code).map_err(persist)? {
                Some(existing) => {
                    if existing.converter != entry.converter {
                        warn!(
                            "Converter for {} changed from {} to {} in table {}, keeping stored value",
                            entry.code, existing.converter, entry.converter, label
                        );
                    }
                    (existing, WriteMode::Update)
                }
                None => {
                    table.currency_codes.insert(entry.code.clone());
                    new_currencies += 1;
                    (
                        Currency::new(&entry.code, &entry.name, entry.converter),
                        WriteMode::Create,
                    )
                }
            };
            currency
                .add_price(date, entry.average_price)
                .map_err(persist)?;
            uow.save_currency(currency, mode).map_err(persist)?;
        }

        table.publication_date = date;
        if snapshot.table_number.is_some() {
            table.table_number = snapshot.table_number.clone();
        }
        uow.save_table(table, table_mode).map_err(persist)?;
        uow.commit().map_err(persist)?;

        Ok(LabelChange::Updated {
            publication_date: date,
            prices: snapshot.entries.len(),
            new_currencies,
        })
    }
}

pub(crate) fn log_outcome(label: TableLabel, outcome: &Result<LabelChange, PipelineError>) {
    match outcome {
        Ok(change) if change.is_change() => info!("Table {}: {}", label, change),
        Ok(change) => debug!("Table {}: {}", label, change),
        Err(e) => error!("Table {}: {}", label, e),
    }
}
