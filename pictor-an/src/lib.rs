//! pictor-an library interface for testing
//!
//! Exposes public APIs for integration testing

pub mod api;
pub mod broker;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use pictor_common::config::Settings;
use pictor_common::events::{EventBus, PipelineEvent};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::pipeline::Orchestrator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Resolved service settings
    pub settings: Arc<Settings>,
    /// Submission entry point into the pipeline
    pub orchestrator: Orchestrator,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last pipeline failure for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        settings: Arc<Settings>,
        orchestrator: Orchestrator,
        event_bus: EventBus,
    ) -> Self {
        Self {
            db,
            settings,
            orchestrator,
            event_bus,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::annotate_routes())
        .merge(api::status_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Record pipeline failures into the diagnostic slot exposed by /health
///
/// Runs until the event bus closes. Spawned once at startup.
pub fn spawn_failure_monitor(event_bus: &EventBus, last_error: Arc<RwLock<Option<String>>>) {
    let mut rx = event_bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(PipelineEvent::TaskFailed {
                    task_id,
                    stage,
                    error,
                    ..
                }) => {
                    let mut slot = last_error.write().await;
                    *slot = Some(format!("task {} failed at {}: {}", task_id, stage, error));
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
