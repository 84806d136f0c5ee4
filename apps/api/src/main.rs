mod config;
mod errors;
mod export;
mod models;
mod resume;
mod routes;
mod state;

use anyhow::Result;
use axum::extract::DefaultBodyLimit;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::export::backends::build_backend;
use crate::export::harvester::StyleHarvester;
use crate::export::ExportOrchestrator;
use crate::resume::ResumeStore;
use crate::routes::build_router;
use crate::state::AppState;

/// Page snapshots inline their images, so requests can be large.
const MAX_REQUEST_BYTES: usize = 25 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed or missing env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Vitae API v{}", env!("CARGO_PKG_VERSION"));

    // Load the stored résumé
    let store = ResumeStore::open(&config.data_dir).await?;
    info!("Résumé store at {}", store.path().display());

    // Build render backends (one primary, optional smart-export fallback)
    let primary = build_backend(config.export_backend, &config)?;
    let fallback = config
        .fallback_backend
        .map(|kind| build_backend(kind, &config))
        .transpose()?;
    info!(
        "Render backend: {} (fallback: {})",
        config.export_backend,
        config
            .fallback_backend
            .map(|k| k.to_string())
            .unwrap_or_else(|| "none".to_string())
    );

    let harvester = StyleHarvester::new(config.stylesheet_fetch_timeout)?;
    let exporter = ExportOrchestrator::new(harvester, primary, fallback, config.target_selector.clone());

    // Build app state
    let state = AppState {
        config: config.clone(),
        exporter: Arc::new(exporter),
        store: Arc::new(store),
    };

    // Build router
    let app = build_router(state)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
