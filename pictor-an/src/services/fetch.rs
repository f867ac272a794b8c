//! Asset fetch collaborator
//!
//! One attempt = one GET accepting only a success status. The bounded retry
//! around attempts lives in the fetch-and-annotate stage, not here.

use async_trait::async_trait;
use pictor_common::{Error, Result};
use std::time::Duration;

/// Asset retrieval boundary
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Retrieve the asset at `url`. Non-success statuses are errors.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetcher backed by plain HTTP GET
pub struct HttpAssetFetcher {
    client: reqwest::Client,
}

impl HttpAssetFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Internal(format!(
                "Asset fetch returned {}: {}",
                status, url
            )));
        }

        let bytes = response.bytes().await?;
        tracing::debug!(url = %url, size = bytes.len(), "Asset fetched");
        Ok(bytes.to_vec())
    }
}
