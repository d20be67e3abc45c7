mod config;
mod errors;
mod extraction;
mod jobs;
mod llm_client;
mod portfolio;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::jobs::sweeper::spawn_sweeper;
use crate::jobs::JobStore;
use crate::llm_client::GenerationClient;
use crate::portfolio::prompts::load_template;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails when no provider key is set)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Portfolio API v{}", env!("CARGO_PKG_VERSION"));

    let prompt_template = load_template(config.prompt_template_path.as_deref())?;

    // Initialize provider chain
    let generator = GenerationClient::from_config(&config)?;
    info!(
        "Generation providers: {} (primary model: {})",
        config.provider_names().join(" -> "),
        generator.primary_model()
    );

    // Initialize job store and its on-disk directories
    let jobs = JobStore::new(
        config.upload_dir.clone(),
        config.generated_dir.clone(),
        config.max_active_jobs,
    );
    let orphans = jobs.init().await?;
    if orphans > 0 {
        info!("Removed {orphans} leftover files from a previous run");
    }
    spawn_sweeper(jobs.clone(), config.job_retention, config.cleanup_interval);

    let state = AppState {
        config: config.clone(),
        jobs,
        generator,
        prompt_template: Arc::from(prompt_template),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
