//! In-process message broker
//!
//! Dispatches stage invocations to a pool of worker tasks. Each message is
//! one stage of one chain; a worker executes exactly that stage, then
//! enqueues the successor stage with the stage's output as its input. Stages
//! of the same chain therefore run strictly sequentially, while different
//! chains interleave freely across the pool. A stage failure drops the
//! remainder of its chain; there is no automatic resumption and no rollback
//! of earlier stages' durable writes.
//!
//! Delivery is at-least-once from the stages' point of view: implementations
//! must tolerate duplicate invocation (the persistence stage upserts for
//! exactly this reason).

use std::collections::VecDeque;
use std::sync::Arc;

use pictor_common::events::{EventBus, PipelineEvent};
use tokio::sync::{Mutex, Notify};

use crate::pipeline::chain::ChainSpec;
use crate::pipeline::envelope::StageEnvelope;
use crate::pipeline::stages::StageContext;

/// One stage invocation in flight
#[derive(Clone)]
pub struct StageJob {
    /// The chain this stage belongs to (shared, immutable)
    pub chain: Arc<ChainSpec>,
    /// Index into `chain.stages`
    pub stage_index: usize,
    /// Input envelope, produced by the preceding stage
    pub envelope: StageEnvelope,
}

/// FIFO job queue shared by the worker pool
///
/// A Mutex-guarded deque plus a Notify: pushes park a permit, idle workers
/// wait on it. Notify stores a permit when nobody is waiting, so a push that
/// races a worker between unlock and wait is not lost.
struct JobQueue {
    ready: Mutex<VecDeque<StageJob>>,
    notify: Notify,
}

impl JobQueue {
    fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    async fn push(&self, job: StageJob) {
        self.ready.lock().await.push_back(job);
        self.notify.notify_one();
    }

    async fn pop(&self) -> StageJob {
        loop {
            if let Some(job) = self.ready.lock().await.pop_front() {
                return job;
            }
            self.notify.notified().await;
        }
    }
}

/// Handle to the running broker
///
/// Cloning is cheap; all clones submit into the same queue.
#[derive(Clone)]
pub struct Broker {
    queue: Arc<JobQueue>,
    event_bus: EventBus,
}

impl Broker {
    /// Start the broker with `worker_count` worker tasks
    pub fn start(ctx: Arc<StageContext>, worker_count: usize) -> Self {
        let queue = Arc::new(JobQueue::new());
        let event_bus = ctx.event_bus.clone();

        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move {
                worker_loop(worker_id, queue, ctx).await;
            });
        }

        tracing::info!(workers = worker_count, "Broker started");
        Self { queue, event_bus }
    }

    /// Submit a chain for sequential execution
    ///
    /// Enqueues the first stage and returns immediately; nothing here waits
    /// for any stage to complete. An empty chain completes trivially.
    pub async fn submit(&self, chain: ChainSpec) {
        let task_id = chain.task_id;
        let stages = chain.stage_names();

        self.event_bus.emit(PipelineEvent::TaskSubmitted {
            task_id,
            stages: stages.clone(),
            timestamp: chrono::Utc::now(),
        });

        if chain.stages.is_empty() {
            tracing::warn!(task_id = %task_id, "Submitted chain has no stages");
            self.event_bus.emit(PipelineEvent::TaskCompleted {
                task_id,
                timestamp: chrono::Utc::now(),
            });
            return;
        }

        tracing::info!(task_id = %task_id, stages = ?stages, "Chain submitted");

        self.queue
            .push(StageJob {
                chain: Arc::new(chain),
                stage_index: 0,
                envelope: StageEnvelope::new(task_id),
            })
            .await;
    }
}

/// Worker: lease one stage job at a time, execute it, enqueue the successor
async fn worker_loop(worker_id: usize, queue: Arc<JobQueue>, ctx: Arc<StageContext>) {
    tracing::debug!(worker_id, "Worker started");

    loop {
        let job = queue.pop().await;
        let task_id = job.chain.task_id;
        let kind = job.chain.stages[job.stage_index];

        tracing::debug!(
            worker_id,
            task_id = %task_id,
            stage = %kind,
            stage_index = job.stage_index,
            "Stage started"
        );
        ctx.event_bus.emit(PipelineEvent::StageStarted {
            task_id,
            stage: kind.name().to_string(),
            stage_index: job.stage_index,
        });

        match ctx.execute(&job.chain, kind, job.envelope.clone()).await {
            Ok(out_envelope) => {
                ctx.event_bus.emit(PipelineEvent::StageCompleted {
                    task_id,
                    stage: kind.name().to_string(),
                    stage_index: job.stage_index,
                });

                let next_index = job.stage_index + 1;
                if next_index < job.chain.stages.len() {
                    queue
                        .push(StageJob {
                            chain: Arc::clone(&job.chain),
                            stage_index: next_index,
                            envelope: out_envelope,
                        })
                        .await;
                } else {
                    tracing::info!(task_id = %task_id, "Chain complete");
                    ctx.event_bus.emit(PipelineEvent::TaskCompleted {
                        task_id,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            Err(e) => {
                // Terminal for this chain: the remaining stages are dropped,
                // durable writes from earlier stages stand.
                tracing::error!(
                    worker_id,
                    task_id = %task_id,
                    stage = %kind,
                    error = %e,
                    "Stage failed; dropping remainder of chain"
                );
                ctx.event_bus.emit(PipelineEvent::StageFailed {
                    task_id,
                    stage: kind.name().to_string(),
                    stage_index: job.stage_index,
                    error: e.to_string(),
                });
                ctx.event_bus.emit(PipelineEvent::TaskFailed {
                    task_id,
                    stage: kind.name().to_string(),
                    error: e.to_string(),
                    timestamp: chrono::Utc::now(),
                });
            }
        }
    }
}
