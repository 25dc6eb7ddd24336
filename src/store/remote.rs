//! HTTP blob store
//!
//! Talks to a datadex service (or any object store speaking plain HTTP):
//! `PUT {url}{key}` with the blob as the request body, `GET {url}{key}` to
//! read it back. A 404 on `GET` maps to [`Error::NotFound`]; every other
//! failure is surfaced as [`Error::Http`] without interpretation.

use crate::config::DEFAULT_REMOTE_URL;
use crate::store::{BlobReader, BlobStore};
use crate::{Error, Result};
use reqwest::blocking::{Body, Client};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::debug;

/// Remote store configuration
#[derive(Clone, Debug)]
pub struct RemoteStoreConfig {
    /// Base URL; keys are joined onto it with a single slash
    pub url: String,
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        RemoteStoreConfig {
            url: DEFAULT_REMOTE_URL.to_string(),
            timeout_secs: None,
        }
    }
}

/// Blob store backed by an HTTP service
pub struct RemoteBlobStore {
    config: RemoteStoreConfig,
    client: Client,
}

impl RemoteBlobStore {
    pub fn new(config: RemoteStoreConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout_secs.map(Duration::from_secs))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(RemoteBlobStore { config, client })
    }

    /// Build the full URL for a key
    fn url(&self, key: &str) -> String {
        format!(
            "{}/{}",
            self.config.url.trim_end_matches('/'),
            key.trim_start_matches('/')
        )
    }

    pub fn base_url(&self) -> &str {
        &self.config.url
    }
}

impl BlobStore for RemoteBlobStore {
    fn put(&self, key: &str, content: BlobReader) -> Result<()> {
        let url = self.url(key);
        debug!(%url, "uploading blob");

        let response = self
            .client
            .put(&url)
            .body(Body::new(content))
            .send()
            .map_err(|e| Error::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(Error::Http(format!(
                "PUT {} failed: {} - {}",
                url, status, text
            )));
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<BlobReader> {
        let url = self.url(key);
        debug!(%url, "downloading blob");

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::Http(e.to_string()))?;

        match response.status() {
            s if s.is_success() => Ok(Box::new(response)),
            StatusCode::NOT_FOUND => Err(Error::NotFound(key.to_string())),
            status => {
                let text = response.text().unwrap_or_default();
                Err(Error::Http(format!("GET {} failed: {} - {}", url, status, text)))
            }
        }
    }
}
