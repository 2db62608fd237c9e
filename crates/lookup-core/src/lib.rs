//! lookup-core: Core types for the GNOT balance lookup
//!
//! This crate defines the data model shared by every storage strategy:
//! - Balance records keyed by opaque, case-sensitive address strings
//! - The dataset blob format (a flat JSON object of address -> ugnot)
//! - The amount codec (ugnot -> GNOT with six fractional digits)
//! - Runtime configuration and the dataset version tag
//!
//! # Dataset Format
//!
//! ```text
//! {
//!   "g1qpzxg2fzn0mpsuavcuq0v2rxnxxc8e3kkmswax": 47056306,
//!   "g1jg8mtutu9khhfwc4nxmuhcpftf0pajdhfvsqf5": "1000000"
//! }
//! ```
//!
//! Values may be JSON integers or numeric strings. There is no version field
//! inside the blob; staleness is tracked by [`LookupConfig::dataset_version`]
//! against the tag stored next to a persisted copy.

mod address;
mod amount;
mod config;
mod dataset;
mod error;

pub use address::{is_valid_address, ADDRESS_HRP, ADDRESS_LEN};
pub use amount::{display_amount, format_amount, ugnot_to_gnot, UGNOT_PER_GNOT};
pub use config::{LookupConfig, StorageMode, DEFAULT_BATCH_SIZE, DEFAULT_DATASET_VERSION};
pub use dataset::{BalanceRecord, Dataset};
pub use error::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Account address as it appears in the dataset (exact-match key)
pub type Address = String;

/// Balance in micro-units (ugnot)
pub type Amount = u64;

/// Constants shared between the loader and its hosts
pub mod constants {
    /// Metadata key holding the persisted dataset version
    pub const DATA_VERSION_KEY: &str = "dataVersion";

    /// File name of the persistent store inside the data directory
    pub const STORE_FILE_NAME: &str = "balances.redb";

    /// Display unit symbol
    pub const DISPLAY_DENOM: &str = "GNOT";
}
