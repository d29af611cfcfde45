use crate::core::error::StoreError;
use crate::core::model::{Currency, PriceTable, TableLabel};
use crate::core::repository::{ChangeSet, PersistenceGateway};
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct MemoryState {
    tables: BTreeMap<TableLabel, PriceTable>,
    currencies: BTreeMap<String, Currency>,
}

/// In-memory gateway, used by tests
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.inner
            .read()
            .map_err(|e| StoreError::Backend(format!("memory store poisoned: {e}")))
    }
}

impl PersistenceGateway for MemoryStore {
    fn find_table_by_label(&self, label: TableLabel) -> Result<Option<PriceTable>, StoreError> {
        Ok(self.read()?.tables.get(&label).cloned())
    }

    fn find_currency_by_code(&self, code: &str) -> Result<Option<Currency>, StoreError> {
        Ok(self.read()?.currencies.get(code).cloned())
    }

    fn all_tables(&self) -> Result<Vec<PriceTable>, StoreError> {
        Ok(self.read()?.tables.values().cloned().collect())
    }

    fn all_currencies(&self) -> Result<Vec<Currency>, StoreError> {
        Ok(self.read()?.currencies.values().cloned().collect())
    }

    fn apply(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut state = self
            .inner
            .write()
            .map_err(|e| StoreError::Backend(format!("memory store poisoned: {e}")))?;
        debug!("Memory store APPLY {} entities", changes.len());
        state.tables.extend(changes.tables);
        state.currencies.extend(changes.currencies);
        Ok(())
    }
}
