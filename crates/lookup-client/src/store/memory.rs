//! In-memory balance map

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use lookup_core::{Address, Amount, BalanceRecord, StorageMode};

use super::{BalanceStore, StoreError};

#[derive(Debug, Default)]
struct MemoryState {
    balances: HashMap<Address, Amount>,
    version: Option<String>,
}

/// Hash-map store; contents live for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl BalanceStore for MemoryStore {
    fn mode(&self) -> StorageMode {
        StorageMode::Memory
    }

    fn get(&self, address: &str) -> Result<Option<Amount>, StoreError> {
        Ok(self.read().balances.get(address).copied())
    }

    fn len(&self) -> Result<u64, StoreError> {
        Ok(self.read().balances.len() as u64)
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.write().balances.clear();
        Ok(())
    }

    fn insert_batch(&self, records: &[BalanceRecord]) -> Result<(), StoreError> {
        let mut state = self.write();
        for record in records {
            state.balances.insert(record.address.clone(), record.amount);
        }
        Ok(())
    }

    fn replace_all(&self, records: Vec<BalanceRecord>) -> Result<(), StoreError> {
        // Build outside the lock so readers never see a half-filled map
        let balances: HashMap<Address, Amount> = records
            .into_iter()
            .map(|record| (record.address, record.amount))
            .collect();
        self.write().balances = balances;
        Ok(())
    }

    fn stored_version(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read().version.clone())
    }

    fn set_version(&self, version: &str) -> Result<(), StoreError> {
        self.write().version = Some(version.to_string());
        Ok(())
    }

    fn purge(&self) -> Result<(), StoreError> {
        let mut state = self.write();
        state.balances.clear();
        state.version = None;
        Ok(())
    }
}
