//! Pipeline event types and EventBus
//!
//! Events are broadcast via EventBus and can be serialized for SSE
//! transmission. Subscribers only see events emitted after subscription.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Pipeline progress events
///
/// One submission produces a `TaskSubmitted`, a `StageStarted`/
/// `StageCompleted` pair per executed stage, and finally either
/// `TaskCompleted` or (`StageFailed` + `TaskFailed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A chain was accepted and enqueued
    TaskSubmitted {
        /// Correlation identifier minted for this submission
        task_id: Uuid,
        /// Names of the stages in execution order
        stages: Vec<String>,
        /// When the chain was submitted
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A worker picked up a stage
    StageStarted {
        task_id: Uuid,
        stage: String,
        /// Zero-based position in the chain
        stage_index: usize,
    },

    /// A stage produced its output and the successor (if any) was enqueued
    StageCompleted {
        task_id: Uuid,
        stage: String,
        stage_index: usize,
    },

    /// A stage failed; the remainder of the chain is dropped
    StageFailed {
        task_id: Uuid,
        stage: String,
        stage_index: usize,
        error: String,
    },

    /// Every stage of the chain completed
    TaskCompleted {
        task_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The chain terminated early due to a stage failure
    TaskFailed {
        task_id: Uuid,
        stage: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl PipelineEvent {
    /// Event type name for SSE `event:` fields and logging
    pub fn event_type(&self) -> &'static str {
        match self {
            PipelineEvent::TaskSubmitted { .. } => "TaskSubmitted",
            PipelineEvent::StageStarted { .. } => "StageStarted",
            PipelineEvent::StageCompleted { .. } => "StageCompleted",
            PipelineEvent::StageFailed { .. } => "StageFailed",
            PipelineEvent::TaskCompleted { .. } => "TaskCompleted",
            PipelineEvent::TaskFailed { .. } => "TaskFailed",
        }
    }

    /// Correlation identifier this event belongs to
    pub fn task_id(&self) -> Uuid {
        match self {
            PipelineEvent::TaskSubmitted { task_id, .. }
            | PipelineEvent::StageStarted { task_id, .. }
            | PipelineEvent::StageCompleted { task_id, .. }
            | PipelineEvent::StageFailed { task_id, .. }
            | PipelineEvent::TaskCompleted { task_id, .. }
            | PipelineEvent::TaskFailed { task_id, .. } => *task_id,
        }
    }
}

/// Broadcast bus for pipeline events
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    ///
    /// Old events are dropped for lagging subscribers once the buffer fills.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all current subscribers
    ///
    /// Emitting with no subscribers is not an error; the event is dropped.
    pub fn emit(&self, event: PipelineEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(n) => tracing::trace!(event = event_type, subscribers = n, "Event emitted"),
            Err(_) => tracing::trace!(event = event_type, "Event dropped (no subscribers)"),
        }
    }
}
