//! Client error types

use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum LookupError {
    #[error("Dataset fetch failed: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("Dataset fetch failed: HTTP {status} from {url}")]
    FetchStatus { status: u16, url: String },

    #[error("Dataset read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Balances are not loaded yet, initialize first")]
    NotReady,

    #[error("A load is already in progress")]
    LoadInProgress,

    #[error("Core error: {0}")]
    Core(#[from] lookup_core::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl LookupError {
    /// Stable classification for hosts that branch on the failure kind
    pub fn code(&self) -> &'static str {
        match self {
            LookupError::Fetch(_) => "FETCH_FAILURE",
            LookupError::FetchStatus { .. } => "FETCH_FAILURE",
            LookupError::Io(_) => "FETCH_FAILURE",
            LookupError::Store(_) => "STORE_FAILURE",
            LookupError::InvalidAddress(_) => "VALIDATION_FAILURE",
            LookupError::NotReady => "NOT_READY",
            LookupError::LoadInProgress => "LOAD_IN_PROGRESS",
            LookupError::Core(lookup_core::Error::Dataset(_)) => "DATASET_INVALID",
            LookupError::Core(_) => "CONFIG_INVALID",
            LookupError::Task(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, LookupError>;
