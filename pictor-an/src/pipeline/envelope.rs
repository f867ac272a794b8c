//! Typed stage envelope
//!
//! The envelope is the in-flight message passed between stages. It
//! accumulates fields as the chain progresses and never shrinks: the storage
//! stage adds `file_url`, the fetch-and-annotate stage adds `annotation`.
//! Each stage validates the fields its contract requires through the
//! `require_*` accessors instead of reaching into optionals blindly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::StageError;

/// In-flight message passed between stages of one chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEnvelope {
    /// Correlation identifier, minted once by the orchestrator
    pub task_id: Uuid,
    /// Public URL of the stored asset (set by the storage stage)
    pub file_url: Option<String>,
    /// Model output text (set by the fetch-and-annotate stage)
    pub annotation: Option<String>,
}

impl StageEnvelope {
    /// Fresh envelope carrying only the correlation identifier
    pub fn new(task_id: Uuid) -> Self {
        Self {
            task_id,
            file_url: None,
            annotation: None,
        }
    }

    /// Envelope with the stored asset URL added
    pub fn with_file_url(mut self, file_url: String) -> Self {
        self.file_url = Some(file_url);
        self
    }

    /// Envelope with the annotation text added
    pub fn with_annotation(mut self, annotation: String) -> Self {
        self.annotation = Some(annotation);
        self
    }

    /// Asset URL, required by the persistence and fetch stages
    pub fn require_file_url(&self) -> Result<&str, StageError> {
        self.file_url
            .as_deref()
            .ok_or(StageError::MissingField("file_url"))
    }

    /// Annotation text, required by the update stage
    pub fn require_annotation(&self) -> Result<&str, StageError> {
        self.annotation
            .as_deref()
            .ok_or(StageError::MissingField("annotation"))
    }
}
