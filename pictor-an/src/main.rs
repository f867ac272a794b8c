//! pictor-an - Image Annotation Microservice
//!
//! Accepts an uploaded image and a prompt, produces a textual annotation via
//! an external vision-language model, persists the result, and optionally
//! notifies the requester by email. All work after submission runs through
//! an in-process broker dispatching pipeline stages to a worker pool; the
//! submitter gets a correlation identifier back immediately and polls
//! /status/{id} for the outcome.

use anyhow::Result;
use clap::Parser;
use pictor_common::config::Settings;
use pictor_common::events::EventBus;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use pictor_an::broker::Broker;
use pictor_an::pipeline::{Orchestrator, StageContext};
use pictor_an::services::{HttpAssetFetcher, HttpMailer, HttpObjectStorage, OllamaClient};
use pictor_an::{build_router, spawn_failure_monitor, AppState};

#[derive(Parser, Debug)]
#[command(name = "pictor-an", version, about = "Image annotation service")]
struct Args {
    /// Path to the TOML config file
    #[arg(long, env = "PICTOR_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP bind port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Starting pictor-an (Image Annotation) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Resolve settings: CLI -> ENV -> TOML -> defaults
    let mut settings = Settings::resolve(args.config.as_deref())?;
    if let Some(port) = args.port {
        settings.port = port;
    }
    let settings = Arc::new(settings);
    info!("Database: {}", settings.database_path.display());
    info!("Model: {} at {}", settings.model_name, settings.model_endpoint);

    // Initialize database connection pool
    let db_pool = pictor_an::db::init_database_pool(&settings.database_path).await?;
    info!("Database connection established");

    // Event bus for SSE broadcasting and diagnostics
    let event_bus = EventBus::new(100);

    // External collaborators, constructed once and injected into the stages
    let storage = Arc::new(HttpObjectStorage::new(&settings)?);
    let fetcher = Arc::new(HttpAssetFetcher::new()?);
    let model = Arc::new(OllamaClient::new(&settings)?);
    let mailer = Arc::new(HttpMailer::new(&settings)?);

    let ctx = Arc::new(StageContext {
        db: db_pool.clone(),
        settings: Arc::clone(&settings),
        storage,
        fetcher,
        model,
        mailer,
        event_bus: event_bus.clone(),
    });

    // Start broker workers and the submission entry point
    let broker = Broker::start(ctx, settings.worker_count);
    let orchestrator = Orchestrator::new(broker, Arc::clone(&settings));

    // Create application state
    let state = AppState::new(db_pool, Arc::clone(&settings), orchestrator, event_bus);
    spawn_failure_monitor(&state.event_bus, Arc::clone(&state.last_error));

    // Build router
    let app = build_router(state);

    // Start server
    let bind_addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
