//! Dataset sources: where the blob comes from
//!
//! A source performs exactly one fetch attempt per load. There is no retry;
//! a failure is reported and the host decides whether to resync.

use std::path::PathBuf;
use std::sync::Arc;

use futures::future::BoxFuture;
use lookup_core::LookupConfig;
use reqwest::Client;

use crate::error::{LookupError, Result};

/// Fetches the raw dataset blob
pub trait DatasetSource: Send + Sync + 'static {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>>>;

    /// Human-readable location, for logs
    fn location(&self) -> String;
}

/// Dataset served over HTTP(S)
pub struct HttpSource {
    http: Client,
    url: String,
}

impl HttpSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }

    async fn fetch_bytes(&self) -> Result<Vec<u8>> {
        let resp = self.http.get(&self.url).send().await?;

        if !resp.status().is_success() {
            return Err(LookupError::FetchStatus {
                status: resp.status().as_u16(),
                url: self.url.clone(),
            });
        }

        let body = resp.bytes().await?;
        Ok(body.to_vec())
    }
}

impl DatasetSource for HttpSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(self.fetch_bytes())
    }

    fn location(&self) -> String {
        self.url.clone()
    }
}

/// Dataset read from the local filesystem
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DatasetSource for FileSource {
    fn fetch(&self) -> BoxFuture<'_, Result<Vec<u8>>> {
        Box::pin(async move { Ok(tokio::fs::read(&self.path).await?) })
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Pick the source matching the configured dataset location
pub fn source_for(config: &LookupConfig) -> Arc<dyn DatasetSource> {
    if config.is_remote() {
        Arc::new(HttpSource::new(config.dataset_url.clone()))
    } else {
        Arc::new(FileSource::new(config.dataset_url.clone()))
    }
}
