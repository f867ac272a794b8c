//! Vision-language model collaborator
//!
//! One synchronous call: prompt plus base64-encoded image in, annotation text
//! out. There is no retry around this call; a model failure is terminal for
//! the run.

use async_trait::async_trait;
use pictor_common::config::Settings;
use pictor_common::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

/// Vision model boundary
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Produce an annotation for the image under the given prompt
    async fn annotate(&self, prompt: &str, image_b64: &str) -> Result<String>;
}

/// Ollama `/api/generate` response (non-streaming)
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-compatible vision model endpoint
pub struct OllamaClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        // Vision models can take a while on CPU hosts; no timeout wraps the
        // invocation at the pipeline level, only this transport-level one.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.model_endpoint.trim_end_matches('/').to_string(),
            model: settings.model_name.clone(),
        })
    }
}

#[async_trait]
impl VisionModel for OllamaClient {
    async fn annotate(&self, prompt: &str, image_b64: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "images": [image_b64],
            "stream": false,
        });

        tracing::info!(model = %self.model, "Invoking vision model");

        let response = self.client.post(&url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Internal(format!(
                "Model endpoint returned {}: {}",
                status, detail
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("Model response parse failed: {}", e)))?;

        tracing::info!(
            model = %self.model,
            length = generated.response.len(),
            "Model invocation complete"
        );
        Ok(generated.response)
    }
}
