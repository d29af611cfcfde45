//! Persistence abstractions used by the reconciliation engine.
//!
//! A [`PersistenceGateway`] only knows how to look entities up and how to
//! apply a [`ChangeSet`] atomically. Transactions live one level up in
//! [`UnitOfWork`], which stages writes in memory and hands them to the
//! gateway on commit. Dropping a unit of work without committing discards
//! the staged writes.

use crate::core::error::StoreError;
use crate::core::model::{Currency, PriceTable, TableLabel};
use std::collections::BTreeMap;
use tracing::debug;

pub trait PersistenceGateway: Send + Sync {
    fn find_table_by_label(&self, label: TableLabel) -> Result<Option<PriceTable>, StoreError>;

    fn find_currency_by_code(&self, code: &str) -> Result<Option<Currency>, StoreError>;

    fn all_tables(&self) -> Result<Vec<PriceTable>, StoreError>;

    fn all_currencies(&self) -> Result<Vec<Currency>, StoreError>;

    /// Applies every change or none of them.
    fn apply(&self, changes: ChangeSet) -> Result<(), StoreError>;
}

/// Writes staged by a unit of work.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub tables: BTreeMap<TableLabel, PriceTable>,
    pub currencies: BTreeMap<String, Currency>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty() && self.currencies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tables.len() + self.currencies.len()
    }
}

/// Whether a save is expected to create a new entity or update an existing
/// one. The caller states its intent; the unit of work verifies it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Create,
    Update,
}

pub struct UnitOfWork<'a> {
    gateway: &'a dyn PersistenceGateway,
    scope: String,
    changes: ChangeSet,
    finished: bool,
}

impl<'a> UnitOfWork<'a> {
    pub fn begin(gateway: &'a dyn PersistenceGateway, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        debug!("Begin unit of work: {}", scope);
        Self {
            gateway,
            scope,
            changes: ChangeSet::default(),
            finished: false,
        }
    }

    pub fn find_table_by_label(&self, label: TableLabel) -> Result<Option<PriceTable>, StoreError> {
        if let Some(table) = self.changes.tables.get(&label) {
            return Ok(Some(table.clone()));
        }
        self.gateway.find_table_by_label(label)
    }

    pub fn find_currency_by_code(&self, code: &str) -> Result<Option<Currency>, StoreError> {
        if let Some(currency) = self.changes.currencies.get(code) {
            return Ok(Some(currency.clone()));
        }
        self.gateway.find_currency_by_code(code)
    }

    pub fn save_table(&mut self, table: PriceTable, mode: WriteMode) -> Result<(), StoreError> {
        let exists = self.find_table_by_label(table.label)?.is_some();
        check_intent(mode, exists, || format!("price table {}", table.label))?;
        self.changes.tables.insert(table.label, table);
        Ok(())
    }

    pub fn save_currency(&mut self, currency: Currency, mode: WriteMode) -> Result<(), StoreError> {
        let exists = self.find_currency_by_code(&currency.code)?.is_some();
        check_intent(mode, exists, || format!("currency {}", currency.code))?;
        self.changes
            .currencies
            .insert(currency.code.clone(), currency);
        Ok(())
    }

    /// Number of entities staged so far.
    pub fn pending(&self) -> usize {
        self.changes.len()
    }

    pub fn commit(mut self) -> Result<usize, StoreError> {
        self.finished = true;
        let changes = std::mem::take(&mut self.changes);
        let count = changes.len();
        if changes.is_empty() {
            debug!("Nothing to commit for {}", self.scope);
            return Ok(0);
        }
        self.gateway.apply(changes)?;
        debug!("Committed {} entities for {}", count, self.scope);
        Ok(count)
    }

    pub fn rollback(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        if !self.finished {
            self.finished = true;
            if !self.changes.is_empty() {
                debug!(
                    "Rolled back {} staged entities for {}",
                    self.changes.len(),
                    self.scope
                );
            }
            self.changes = ChangeSet::default();
        }
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        self.discard();
    }
}

fn check_intent(
    mode: WriteMode,
    exists: bool,
    describe: impl FnOnce() -> String,
) -> Result<(), StoreError> {
    match (mode, exists) {
        (WriteMode::Create, true) => Err(StoreError::AlreadyExists(describe())),
        (WriteMode::Update, false) => Err(StoreError::NotFound(describe())),
        _ => Ok(()),
    }
}
