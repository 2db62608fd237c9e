//! Dataset blob parsing
//!
//! The blob is one JSON object. Parsing goes through a streaming visitor so
//! that record order follows the order of keys in the source, which is what
//! decides batch boundaries in persistent mode.

use std::collections::HashMap;
use std::fmt;

use serde::de::{Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};

use crate::{Address, Amount, Result};

/// A single address -> balance entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceRecord {
    pub address: Address,
    pub amount: Amount,
}

impl BalanceRecord {
    pub fn new(address: impl Into<Address>, amount: Amount) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

/// Parsed dataset in source order, with duplicate keys collapsed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    records: Vec<BalanceRecord>,
    /// Entries dropped because their value was not a non-negative integer
    skipped: usize,
}

impl Dataset {
    /// Parse a dataset blob
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let dataset: Self = serde_json::from_slice(bytes)?;
        if dataset.skipped > 0 {
            tracing::warn!(
                skipped = dataset.skipped,
                kept = dataset.records.len(),
                "Dropped dataset entries with non-numeric amounts"
            );
        }
        Ok(dataset)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn records(&self) -> &[BalanceRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<BalanceRecord> {
        self.records
    }

    /// Split into consecutive batches of at most `batch_size` records.
    ///
    /// # Panics
    /// Panics if `batch_size` is zero; configs are validated before loading.
    pub fn batches(&self, batch_size: usize) -> std::slice::Chunks<'_, BalanceRecord> {
        self.records.chunks(batch_size)
    }

    /// Number of batches a load with `batch_size` will run
    pub fn batch_count(&self, batch_size: usize) -> usize {
        self.records.len().div_ceil(batch_size)
    }
}

#[derive(Default)]
struct DatasetBuilder {
    records: Vec<BalanceRecord>,
    positions: HashMap<Address, usize>,
    skipped: usize,
}

impl DatasetBuilder {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
            skipped: 0,
        }
    }

    fn push(&mut self, record: BalanceRecord) {
        match self.positions.get(&record.address) {
            Some(&idx) => self.records[idx].amount = record.amount,
            None => {
                self.positions
                    .insert(record.address.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    fn finish(self) -> Dataset {
        Dataset {
            records: self.records,
            skipped: self.skipped,
        }
    }
}

/// Accept integers and numeric strings; anything else is not an amount
fn parse_amount(value: &serde_json::Value) -> Option<Amount> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct DatasetVisitor;

        impl<'de> Visitor<'de> for DatasetVisitor {
            type Value = Dataset;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a JSON object mapping addresses to amounts")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Dataset, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut builder = DatasetBuilder::with_capacity(map.size_hint().unwrap_or(0));

                while let Some((address, value)) =
                    map.next_entry::<Address, serde_json::Value>()?
                {
                    match parse_amount(&value) {
                        Some(amount) => builder.push(BalanceRecord { address, amount }),
                        None => {
                            tracing::debug!(%address, %value, "Skipping non-numeric amount");
                            builder.skipped += 1;
                        }
                    }
                }

                Ok(builder.finish())
            }
        }

        deserializer.deserialize_map(DatasetVisitor)
    }
}
