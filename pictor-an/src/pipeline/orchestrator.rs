//! Pipeline orchestrator
//!
//! Submission entry point: validates the upload, mints the correlation
//! identifier, builds the ordered stage chain, and hands it to the broker.
//! Returns the identifier synchronously; the caller observes the outcome
//! later through the status reader.

use pictor_common::config::Settings;
use std::sync::Arc;
use uuid::Uuid;

use super::chain::{ChainBuilder, StageKind};
use super::error::StageError;
use super::stages::validate_upload;
use crate::broker::Broker;

/// Prompt used when the submitter does not supply one
pub const DEFAULT_PROMPT: &str = "What's in this image?";

/// Builds and submits chains; issues correlation identifiers
#[derive(Clone)]
pub struct Orchestrator {
    broker: Broker,
    settings: Arc<Settings>,
}

impl Orchestrator {
    pub fn new(broker: Broker, settings: Arc<Settings>) -> Self {
        Self { broker, settings }
    }

    /// Submit one annotation request
    ///
    /// The identifier is minted here, exactly once, before any side effect,
    /// and threaded through every stage; it is never re-derived mid-chain.
    /// Invalid input fails before anything is enqueued: no identifier
    /// escapes, no record is ever created.
    pub async fn submit(
        &self,
        file_bytes: Vec<u8>,
        file_name: &str,
        prompt: Option<String>,
        email: Option<&str>,
    ) -> Result<Uuid, StageError> {
        validate_upload(file_name, file_bytes.len(), self.settings.max_upload_size)?;

        let task_id = Uuid::new_v4();
        let prompt = prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PROMPT.to_string());

        let mut builder =
            ChainBuilder::new(task_id, file_name.to_string(), file_bytes, prompt)
                .stage(StageKind::Store)
                .stage(StageKind::Persist)
                .stage(StageKind::FetchAnnotate)
                .stage(StageKind::Update);
        if let Some(email) = email.filter(|e| !e.is_empty()) {
            builder = builder.notify(email);
        }
        let chain = builder.build();

        tracing::info!(
            task_id = %task_id,
            file_name = %file_name,
            stages = ?chain.stage_names(),
            "Submission accepted"
        );

        self.broker.submit(chain).await;
        Ok(task_id)
    }
}
