//! Balance storage strategies
//!
//! Both strategies expose the same interface so the coordinator's query and
//! pending-query logic is written once. The coordinator picks the load plan
//! from [`BalanceStore::mode`]: memory stores are filled in one update,
//! persistent stores batch by batch.

mod memory;
mod persistent;

pub use memory::MemoryStore;
pub use persistent::PersistentStore;

use lookup_core::{Amount, BalanceRecord, StorageMode};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("failed to open database: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit failed: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage backend for loaded balances
pub trait BalanceStore: Send + Sync + 'static {
    /// Which load plan this store expects
    fn mode(&self) -> StorageMode;

    /// Point lookup by exact address
    fn get(&self, address: &str) -> Result<Option<Amount>, StoreError>;

    /// Number of stored balances
    fn len(&self) -> Result<u64, StoreError>;

    /// Remove every balance (metadata is kept)
    fn clear(&self) -> Result<(), StoreError>;

    /// Insert records as one all-or-nothing write
    fn insert_batch(&self, records: &[BalanceRecord]) -> Result<(), StoreError>;

    /// Replace the whole content in a single update
    fn replace_all(&self, records: Vec<BalanceRecord>) -> Result<(), StoreError>;

    /// Dataset version the current content was imported from
    fn stored_version(&self) -> Result<Option<String>, StoreError>;

    fn set_version(&self, version: &str) -> Result<(), StoreError>;

    /// Drop balances and the version tag
    fn purge(&self) -> Result<(), StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}
