//! Chain construction
//!
//! A chain is the ordered stage list for one submission, assembled once by
//! the orchestrator before anything is enqueued. The stage set for a given
//! run is fixed at build time and statically inspectable; conditional
//! inclusion (notification) is decided here, never re-evaluated mid-chain.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::services::mailer::is_valid_email;

/// Stage descriptors, in the only order the pipeline supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageKind {
    /// Upload raw bytes to object storage, producing a public URL
    Store,
    /// Upsert the `{task_id, file_url, annotation=null}` record
    Persist,
    /// Fetch the stored asset (bounded retry) and invoke the vision model
    FetchAnnotate,
    /// Write the annotation into the existing record
    Update,
    /// Send the results-link email (only present for valid addresses)
    Notify,
}

impl StageKind {
    pub fn name(&self) -> &'static str {
        match self {
            StageKind::Store => "store",
            StageKind::Persist => "persist",
            StageKind::FetchAnnotate => "fetch_annotate",
            StageKind::Update => "update",
            StageKind::Notify => "notify",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One submission's unit of work: the stage list plus everything the stages
/// need that does not flow through the envelope
#[derive(Debug, Clone)]
pub struct ChainSpec {
    /// Correlation identifier, minted before the chain was built
    pub task_id: Uuid,
    /// Original filename of the upload
    pub file_name: String,
    /// Raw upload bytes, consumed by the storage stage
    pub file_bytes: Vec<u8>,
    /// Prompt forwarded to the vision model
    pub prompt: String,
    /// Recipient address, bound at construction time. Present if and only if
    /// the chain contains a Notify stage.
    pub notify_email: Option<String>,
    /// Ordered stage list
    pub stages: Vec<StageKind>,
}

impl ChainSpec {
    /// Stage names in execution order, for logging and events
    pub fn stage_names(&self) -> Vec<String> {
        self.stages.iter().map(|s| s.name().to_string()).collect()
    }
}

/// Builder assembling the ordered stage list for one submission
pub struct ChainBuilder {
    task_id: Uuid,
    file_name: String,
    file_bytes: Vec<u8>,
    prompt: String,
    notify_email: Option<String>,
    stages: Vec<StageKind>,
}

impl ChainBuilder {
    pub fn new(task_id: Uuid, file_name: String, file_bytes: Vec<u8>, prompt: String) -> Self {
        Self {
            task_id,
            file_name,
            file_bytes,
            prompt,
            notify_email: None,
            stages: Vec::new(),
        }
    }

    /// Append a stage to the chain
    pub fn stage(mut self, kind: StageKind) -> Self {
        self.stages.push(kind);
        self
    }

    /// Append the notification stage if the address is syntactically valid
    ///
    /// An invalid address omits the stage entirely; the decision is made here
    /// once and the mailer is never consulted for that chain.
    pub fn notify(mut self, email: &str) -> Self {
        if is_valid_email(email) {
            self.notify_email = Some(email.to_string());
            self.stages.push(StageKind::Notify);
        } else {
            tracing::debug!(
                task_id = %self.task_id,
                "Notification stage omitted: address failed syntax check"
            );
        }
        self
    }

    pub fn build(self) -> ChainSpec {
        ChainSpec {
            task_id: self.task_id,
            file_name: self.file_name,
            file_bytes: self.file_bytes,
            prompt: self.prompt,
            notify_email: self.notify_email,
            stages: self.stages,
        }
    }
}
