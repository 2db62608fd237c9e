//! lookup-client: GNOT balance loader and lookup
//!
//! Fetches the airdrop snapshot, loads it into a memory or persistent store
//! and answers point queries while the import is still running.
//!
//! ```no_run
//! # async fn demo() -> lookup_client::Result<()> {
//! use lookup_client::{CoordinatorBuilder, LookupConfig, StorageMode};
//!
//! let config = LookupConfig::new(StorageMode::Persistent, "https://example.com/airdrop.json");
//! let coordinator = CoordinatorBuilder::new(config).build()?;
//! coordinator.initialize()?;
//! let outcome = coordinator.query("g1jg8mtutu9khhfwc4nxmuhcpftf0pajdhfvsqf5")?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod coordinator;
pub mod error;
pub mod events;
pub mod source;
pub mod store;

pub use coordinator::{open_store, CoordinatorBuilder, LoadCoordinator, LoadState};
pub use error::{LookupError, Result};
pub use events::{
    channel_sink, estimate_eta, noop_sink, EventSink, LoadEvent, Phase, Progress, QueryOutcome,
    StatusEvent,
};
pub use source::{source_for, DatasetSource, FileSource, HttpSource};
pub use store::{BalanceStore, MemoryStore, PersistentStore, StoreError};

pub use lookup_core::{LookupConfig, StorageMode};
