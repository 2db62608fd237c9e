//! gnot-lookup: GNOT airdrop balance lookup
//!
//! Facade over the workspace crates:
//! - [`lookup_core`]: dataset parsing, amount formatting, address checks, config
//! - [`lookup_client`]: stores, dataset sources and the load coordinator

pub use lookup_client;
pub use lookup_core;

pub use lookup_client::{
    CoordinatorBuilder, LoadCoordinator, LoadEvent, LoadState, LookupError, Phase, QueryOutcome,
};
pub use lookup_core::{format_amount, is_valid_address, LookupConfig, StorageMode};
