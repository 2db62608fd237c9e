//! Embedded persistent store (redb)
//!
//! Two tables live in a single `balances.redb` file:
//! - `balances`: address -> ugnot
//! - `metadata`: key -> value, holding the imported dataset version
//!
//! Every write is its own transaction, so an interrupted import leaves only
//! whole batches behind.

use std::fmt;
use std::path::{Path, PathBuf};

use lookup_core::constants::DATA_VERSION_KEY;
use lookup_core::{Amount, BalanceRecord, StorageMode};
use redb::{Database, ReadableTable, TableDefinition};

use super::{BalanceStore, StoreError};

const BALANCES_TABLE: TableDefinition<&str, u64> = TableDefinition::new("balances");
const METADATA_TABLE: TableDefinition<&str, &str> = TableDefinition::new("metadata");

pub struct PersistentStore {
    db: Database,
    path: PathBuf,
}

impl fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentStore")
            .field("db", &"Redb")
            .field("path", &self.path)
            .finish()
    }
}

impl PersistentStore {
    /// Open or create the store; creating both tables is idempotent
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(&path)?;

        let write_txn = db.begin_write()?;
        {
            let _balances = write_txn.open_table(BALANCES_TABLE)?;
            let _metadata = write_txn.open_table(METADATA_TABLE)?;
        }
        write_txn.commit()?;

        tracing::debug!(path = %path.display(), "Opened persistent store");
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_metadata(&self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(METADATA_TABLE)?;
            match value {
                Some(value) => {
                    table.insert(key, value)?;
                }
                None => {
                    table.remove(key)?;
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }
}

impl BalanceStore for PersistentStore {
    fn mode(&self) -> StorageMode {
        StorageMode::Persistent
    }

    fn get(&self, address: &str) -> Result<Option<Amount>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BALANCES_TABLE)?;
        let amount = table.get(address)?.map(|guard| guard.value());
        Ok(amount)
    }

    fn len(&self) -> Result<u64, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(BALANCES_TABLE)?;
        Ok(table.len()?)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(BALANCES_TABLE)?;
        {
            let _balances = write_txn.open_table(BALANCES_TABLE)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn insert_batch(&self, records: &[BalanceRecord]) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(BALANCES_TABLE)?;
            for record in records {
                table.insert(record.address.as_str(), record.amount)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn replace_all(&self, records: Vec<BalanceRecord>) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(BALANCES_TABLE)?;
        {
            let mut table = write_txn.open_table(BALANCES_TABLE)?;
            for record in &records {
                table.insert(record.address.as_str(), record.amount)?;
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn stored_version(&self) -> Result<Option<String>, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(METADATA_TABLE)?;
        let version = table
            .get(DATA_VERSION_KEY)?
            .map(|guard| guard.value().to_string());
        Ok(version)
    }

    fn set_version(&self, version: &str) -> Result<(), StoreError> {
        self.write_metadata(DATA_VERSION_KEY, Some(version))
    }

    fn purge(&self) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write()?;
        write_txn.delete_table(BALANCES_TABLE)?;
        {
            let _balances = write_txn.open_table(BALANCES_TABLE)?;
            let mut metadata = write_txn.open_table(METADATA_TABLE)?;
            metadata.remove(DATA_VERSION_KEY)?;
        }
        write_txn.commit()?;
        Ok(())
    }
}
