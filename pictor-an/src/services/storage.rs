//! Object storage collaborator
//!
//! The upload itself is a black box: bytes and a target path go in, a public
//! URL comes out. Any failure is surfaced as-is; the pipeline treats all
//! storage failures as terminal without distinguishing transient from
//! permanent.

use async_trait::async_trait;
use pictor_common::config::Settings;
use pictor_common::{Error, Result};
use std::time::Duration;
use uuid::Uuid;

/// Object storage boundary
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload bytes under `{task_id}/{file_name}` and return the public URL
    async fn put(&self, task_id: Uuid, file_name: &str, bytes: &[u8]) -> Result<String>;
}

/// Storage backed by an HTTP gateway (S3-style PUT, public GET)
pub struct HttpObjectStorage {
    client: reqwest::Client,
    endpoint: String,
    public_base: String,
}

impl HttpObjectStorage {
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.storage_endpoint.trim_end_matches('/').to_string(),
            public_base: settings
                .storage_public_base
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(&self, task_id: Uuid, file_name: &str, bytes: &[u8]) -> Result<String> {
        let object_path = format!("{}/{}", task_id, file_name);
        let upload_url = format!("{}/{}", self.endpoint, object_path);

        tracing::info!(
            task_id = %task_id,
            size = bytes.len(),
            url = %upload_url,
            "Uploading to object storage"
        );

        let response = self
            .client
            .put(&upload_url)
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "Storage gateway returned {}: {}",
                status, detail
            )));
        }

        let public_url = format!("{}/{}", self.public_base, object_path);
        tracing::info!(task_id = %task_id, url = %public_url, "Upload complete");
        Ok(public_url)
    }
}
