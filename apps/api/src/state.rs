use std::sync::Arc;

use crate::config::Config;
use crate::export::ExportOrchestrator;
use crate::resume::ResumeStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Single orchestrator per instance, so at most one export runs at a time.
    pub exporter: Arc<ExportOrchestrator>,
    pub store: Arc<ResumeStore>,
}
