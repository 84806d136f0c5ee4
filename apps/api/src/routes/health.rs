use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// GET /health
/// Returns service status, version, the configured render backends and target selector.
pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "vitae-api",
        "backend": state.exporter.primary_backend(),
        "fallbackBackend": state.exporter.fallback_backend(),
        "exporting": state.exporter.is_exporting(),
        "targetSelector": state.config.target_selector,
    }))
}
