//! Shared test harness: mock collaborators and a fully wired pipeline
//! against an in-memory database.

use async_trait::async_trait;
use pictor_common::config::Settings;
use pictor_common::events::{EventBus, PipelineEvent};
use pictor_common::{Error, Result};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use uuid::Uuid;

use pictor_an::broker::Broker;
use pictor_an::pipeline::{Orchestrator, StageContext};
use pictor_an::services::{AssetFetcher, Mailer, ObjectStorage, VisionModel};
use pictor_an::AppState;

pub const MODEL_TEXT: &str = "A tabby cat sitting on a windowsill.";
pub const FETCHED_BYTES: &[u8] = b"\xFF\xD8\xFFfake-jpeg-bytes";

/// Storage mock returning deterministic public URLs
pub struct MockStorage {
    pub calls: AtomicU32,
    pub fail: bool,
}

impl MockStorage {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl ObjectStorage for MockStorage {
    async fn put(&self, task_id: Uuid, file_name: &str, _bytes: &[u8]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Internal("storage gateway unavailable".to_string()));
        }
        Ok(format!("http://storage.test/{}/{}", task_id, file_name))
    }
}

/// Fetcher that fails a configured number of times before succeeding
pub struct FlakyFetcher {
    pub calls: AtomicU32,
    failures_before_success: u32,
}

impl FlakyFetcher {
    pub fn new(failures_before_success: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures_before_success,
        }
    }

    /// A fetcher that never succeeds
    pub fn unreachable() -> Self {
        Self::new(u32::MAX)
    }
}

#[async_trait]
impl AssetFetcher for FlakyFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures_before_success {
            return Err(Error::Internal(format!("503 from {} (attempt {})", url, n)));
        }
        Ok(FETCHED_BYTES.to_vec())
    }
}

/// Model mock returning a fixed annotation
pub struct MockModel {
    pub calls: AtomicU32,
    pub fail: bool,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl VisionModel for MockModel {
    async fn annotate(&self, _prompt: &str, _image_b64: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Internal("model endpoint exploded".to_string()));
        }
        Ok(MODEL_TEXT.to_string())
    }
}

/// Mailer recording every dispatch
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
    pub fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Internal("mail gateway unavailable".to_string()));
        }
        self.sent
            .lock()
            .await
            .push((to.to_string(), subject.to_string(), html.to_string()));
        Ok(())
    }
}

/// Test settings: tiny retry interval so retry-path tests stay fast
pub fn test_settings() -> Settings {
    let mut settings = Settings::default();
    settings.max_upload_size = 1024 * 1024;
    settings.worker_count = 2;
    settings.fetch_max_attempts = 5;
    settings.fetch_retry_interval_ms = 20;
    settings.public_base_url = "http://pictor.test".to_string();
    settings
}

/// Fully wired pipeline over mocks and an in-memory database
pub struct Harness {
    pub state: AppState,
    pub storage: Arc<MockStorage>,
    pub fetcher: Arc<FlakyFetcher>,
    pub model: Arc<MockModel>,
    pub mailer: Arc<RecordingMailer>,
}

pub struct HarnessConfig {
    pub settings: Settings,
    pub storage: MockStorage,
    pub fetcher: FlakyFetcher,
    pub model: MockModel,
    pub mailer: RecordingMailer,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            settings: test_settings(),
            storage: MockStorage::new(),
            fetcher: FlakyFetcher::new(0),
            model: MockModel::new(),
            mailer: RecordingMailer::new(),
        }
    }
}

pub async fn build_harness(config: HarnessConfig) -> Harness {
    // One connection, or each pooled connection gets its own :memory: db
    let db = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .unwrap();
    pictor_an::db::init_tables(&db).await.unwrap();

    let settings = Arc::new(config.settings);
    let event_bus = EventBus::new(100);

    let storage = Arc::new(config.storage);
    let fetcher = Arc::new(config.fetcher);
    let model = Arc::new(config.model);
    let mailer = Arc::new(config.mailer);

    let ctx = Arc::new(StageContext {
        db: db.clone(),
        settings: Arc::clone(&settings),
        storage: Arc::clone(&storage) as Arc<dyn ObjectStorage>,
        fetcher: Arc::clone(&fetcher) as Arc<dyn AssetFetcher>,
        model: Arc::clone(&model) as Arc<dyn VisionModel>,
        mailer: Arc::clone(&mailer) as Arc<dyn Mailer>,
        event_bus: event_bus.clone(),
    });

    let broker = Broker::start(ctx, settings.worker_count);
    let orchestrator = Orchestrator::new(broker, Arc::clone(&settings));
    let state = AppState::new(db, settings, orchestrator, event_bus);

    Harness {
        state,
        storage,
        fetcher,
        model,
        mailer,
    }
}

pub async fn default_harness() -> Harness {
    build_harness(HarnessConfig::default()).await
}

/// Chain outcome observed on the event bus
#[derive(Debug, PartialEq, Eq)]
pub enum ChainOutcome {
    Completed,
    Failed { stage: String, error: String },
}

/// Wait until the chain for `task_id` reaches a terminal event
///
/// The receiver must have been subscribed before submission.
pub async fn wait_for_outcome(
    rx: &mut broadcast::Receiver<PipelineEvent>,
    task_id: Uuid,
) -> ChainOutcome {
    let deadline = Duration::from_secs(10);
    tokio::time::timeout(deadline, async {
        loop {
            match rx.recv().await.expect("event bus closed") {
                PipelineEvent::TaskCompleted { task_id: id, .. } if id == task_id => {
                    return ChainOutcome::Completed;
                }
                PipelineEvent::TaskFailed {
                    task_id: id,
                    stage,
                    error,
                    ..
                } if id == task_id => {
                    return ChainOutcome::Failed { stage, error };
                }
                _ => {}
            }
        }
    })
    .await
    .expect("chain did not reach a terminal state in time")
}
