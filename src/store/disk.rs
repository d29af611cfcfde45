use crate::core::error::StoreError;
use crate::core::model::{Currency, PriceTable, TableLabel};
use crate::core::repository::{ChangeSet, PersistenceGateway};
use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::path::Path;
use tracing::{debug, warn};

const TABLES_PARTITION: &str = "tables";
const CURRENCIES_PARTITION: &str = "currencies";

/// Gateway backed by a fjall keyspace. Entities are stored as JSON, tables
/// keyed by label and currencies keyed by code.
pub struct DiskStore {
    keyspace: Keyspace,
    tables: PartitionHandle,
    currencies: PartitionHandle,
}

impl DiskStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path).map_err(|e| {
            StoreError::Backend(format!("failed to create {}: {e}", path.display()))
        })?;

        let keyspace = Config::new(path).open()?;
        let tables = keyspace.open_partition(TABLES_PARTITION, PartitionCreateOptions::default())?;
        let currencies =
            keyspace.open_partition(CURRENCIES_PARTITION, PartitionCreateOptions::default())?;
        debug!("Opened disk store at {}", path.display());

        Ok(Self {
            keyspace,
            tables,
            currencies,
        })
    }
}

fn get_json<T: DeserializeOwned>(
    partition: &PartitionHandle,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match partition.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn all_json<T: DeserializeOwned>(partition: &PartitionHandle) -> Result<Vec<T>, StoreError> {
    let mut items = Vec::new();
    for kv in partition.iter() {
        let (_key, value) = kv?;
        items.push(serde_json::from_slice(&value)?);
    }
    Ok(items)
}

impl PersistenceGateway for DiskStore {
    fn find_table_by_label(&self, label: TableLabel) -> Result<Option<PriceTable>, StoreError> {
        get_json(&self.tables, label.as_str())
    }

    fn find_currency_by_code(&self, code: &str) -> Result<Option<Currency>, StoreError> {
        get_json(&self.currencies, code)
    }

    fn all_tables(&self) -> Result<Vec<PriceTable>, StoreError> {
        all_json(&self.tables)
    }

    fn all_currencies(&self) -> Result<Vec<Currency>, StoreError> {
        all_json(&self.currencies)
    }

    fn apply(&self, changes: ChangeSet) -> Result<(), StoreError> {
        // Nothing reaches the partitions until the batch commits
        let mut batch = self.keyspace.batch();
        for (label, table) in &changes.tables {
            batch.insert(&self.tables, label.as_str(), serde_json::to_vec(table)?);
        }
        for (code, currency) in &changes.currencies {
            batch.insert(&self.currencies, code.as_str(), serde_json::to_vec(currency)?);
        }
        batch.commit()?;
        // The batch is visible from here on, a failed sync only weakens durability
        log_unsynced(self.keyspace.persist(PersistMode::SyncAll));
        debug!("Disk store APPLY {} entities", changes.len());
        Ok(())
    }
}

/// Reports a journal sync failure after a committed batch. Returns whether
/// the sync succeeded.
fn log_unsynced<E: Display>(result: Result<(), E>) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            warn!("Committed changes are not yet synced to disk: {}", e);
            false
        }
    }
}
