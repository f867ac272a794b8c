//! Stage implementations
//!
//! Each stage is one schedulable unit of work with a defined input/output
//! contract, executed by a broker worker. Stages share nothing in memory
//! across chains; the relational store is the only shared mutable resource,
//! touched per stage under its own short-lived transaction.

use base64::Engine;
use pictor_common::config::Settings;
use pictor_common::events::EventBus;
use sqlx::SqlitePool;
use std::sync::Arc;

use super::chain::{ChainSpec, StageKind};
use super::envelope::StageEnvelope;
use super::error::StageError;
use super::retry::RetryPolicy;
use crate::db::annotations;
use crate::services::mailer::render_notification_email;
use crate::services::{AssetFetcher, Mailer, ObjectStorage, VisionModel};

/// File extensions accepted for upload
pub const ALLOWED_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif"];

/// Everything a stage needs to execute, constructed once at process start
/// and injected into every worker. No global client handles.
pub struct StageContext {
    pub db: SqlitePool,
    pub settings: Arc<Settings>,
    pub storage: Arc<dyn ObjectStorage>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub model: Arc<dyn VisionModel>,
    pub mailer: Arc<dyn Mailer>,
    pub event_bus: EventBus,
}

impl StageContext {
    /// Execute one stage of a chain
    ///
    /// The returned envelope feeds the next stage; an error aborts the
    /// remainder of the chain at the broker.
    pub async fn execute(
        &self,
        chain: &ChainSpec,
        kind: StageKind,
        envelope: StageEnvelope,
    ) -> Result<StageEnvelope, StageError> {
        match kind {
            StageKind::Store => self.run_store(chain, envelope).await,
            StageKind::Persist => self.run_persist(envelope).await,
            StageKind::FetchAnnotate => self.run_fetch_annotate(chain, envelope).await,
            StageKind::Update => self.run_update(envelope).await,
            StageKind::Notify => self.run_notify(chain, envelope).await,
        }
    }

    /// Storage stage: upload raw bytes, produce the public URL
    ///
    /// Re-checks upload validity even though the orchestrator already
    /// rejected bad input before enqueueing; the stage contract stands on
    /// its own.
    async fn run_store(
        &self,
        chain: &ChainSpec,
        envelope: StageEnvelope,
    ) -> Result<StageEnvelope, StageError> {
        validate_upload(
            &chain.file_name,
            chain.file_bytes.len(),
            self.settings.max_upload_size,
        )?;

        let url = self
            .storage
            .put(envelope.task_id, &chain.file_name, &chain.file_bytes)
            .await
            .map_err(|e| StageError::Storage(e.to_string()))?;

        Ok(envelope.with_file_url(url))
    }

    /// Persistence stage: create the record with a null annotation
    ///
    /// Idempotent under redelivery (insert-or-ignore keyed by task_id).
    /// Forwards the envelope unchanged.
    async fn run_persist(&self, envelope: StageEnvelope) -> Result<StageEnvelope, StageError> {
        let file_url = envelope.require_file_url()?;

        annotations::upsert_record(&self.db, envelope.task_id, file_url)
            .await
            .map_err(|e| StageError::Database(e.to_string()))?;

        tracing::info!(task_id = %envelope.task_id, file_url = %file_url, "Record persisted");
        Ok(envelope)
    }

    /// Fetch-and-annotate stage: bounded fetch retry, then one model call
    ///
    /// Retry covers only the fetch: object-storage propagation after upload
    /// is the expected source of transient unavailability. The model call
    /// gets no retry; its failure is terminal for the run.
    async fn run_fetch_annotate(
        &self,
        chain: &ChainSpec,
        envelope: StageEnvelope,
    ) -> Result<StageEnvelope, StageError> {
        let file_url = envelope.require_file_url()?.to_string();

        let policy = RetryPolicy::new(
            self.settings.fetch_max_attempts,
            self.settings.fetch_retry_interval(),
        );
        let bytes = policy
            .run("asset fetch", || self.fetcher.fetch(&file_url))
            .await
            .map_err(|_| StageError::FetchTimeout {
                url: file_url.clone(),
                attempts: self.settings.fetch_max_attempts,
            })?;

        let image_b64 = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let annotation = self
            .model
            .annotate(&chain.prompt, &image_b64)
            .await
            .map_err(|e| StageError::Model(e.to_string()))?;

        tracing::info!(
            task_id = %envelope.task_id,
            length = annotation.len(),
            "Annotation produced"
        );
        Ok(envelope.with_annotation(annotation))
    }

    /// Update stage: write the annotation into the existing record
    async fn run_update(&self, envelope: StageEnvelope) -> Result<StageEnvelope, StageError> {
        let annotation = envelope.require_annotation()?;

        annotations::set_annotation(&self.db, envelope.task_id, annotation)
            .await
            .map_err(|e| match e {
                pictor_common::Error::NotFound(_) => StageError::RecordNotFound(envelope.task_id),
                other => StageError::Database(other.to_string()),
            })?;

        tracing::info!(task_id = %envelope.task_id, "Record updated with annotation");
        Ok(envelope)
    }

    /// Notification stage: results-link email through the mail collaborator
    ///
    /// Only present in chains built with a valid address. Failure here does
    /// not invalidate the already-persisted annotation.
    async fn run_notify(
        &self,
        chain: &ChainSpec,
        envelope: StageEnvelope,
    ) -> Result<StageEnvelope, StageError> {
        let email = chain
            .notify_email
            .as_deref()
            .ok_or(StageError::MissingField("notify_email"))?;

        let link = self.settings.results_link(&envelope.task_id);
        let (subject, html) = render_notification_email(&link);

        self.mailer
            .send(email, &subject, &html)
            .await
            .map_err(|e| StageError::Notification(e.to_string()))?;

        Ok(envelope)
    }
}

/// Validate an upload before it costs anything
///
/// Checked by the orchestrator before the chain is enqueued (violations are
/// surfaced to the submitter and no record is ever created) and re-checked
/// by the storage stage.
pub fn validate_upload(
    file_name: &str,
    size: usize,
    max_upload_size: usize,
) -> Result<(), StageError> {
    let extension = file_name
        .rfind('.')
        .map(|i| file_name[i..].to_ascii_lowercase());

    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => {
            return Err(StageError::InvalidInput(format!(
                "Unsupported file format. Allowed formats: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }
    }

    if size > max_upload_size {
        return Err(StageError::InvalidInput(format!(
            "File too large: {} bytes (maximum {} bytes)",
            size, max_upload_size
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_allowed_extensions() {
        for name in ["cat.jpg", "cat.jpeg", "cat.PNG", "anim.gif", "a.b.jpg"] {
            assert!(validate_upload(name, 100, 1000).is_ok(), "{}", name);
        }
    }

    #[test]
    fn rejects_unknown_or_missing_extensions() {
        for name in ["cat.bmp", "cat.txt", "catjpg", "cat.", "cat.jpg.exe"] {
            assert!(
                matches!(
                    validate_upload(name, 100, 1000),
                    Err(StageError::InvalidInput(_))
                ),
                "{}",
                name
            );
        }
    }

    #[test]
    fn rejects_oversize_uploads() {
        let err = validate_upload("cat.jpg", 1001, 1000).unwrap_err();
        assert!(matches!(err, StageError::InvalidInput(_)));
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert!(validate_upload("cat.jpg", 1000, 1000).is_ok());
    }
}
