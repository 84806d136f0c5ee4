pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::export::handlers as export;
use crate::resume::handlers as resume;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Export API
        .route("/api/v1/export/pdf", post(export::handle_export_pdf))
        .route("/api/v1/export/smart", post(export::handle_smart_export))
        .route("/api/v1/export/status", get(export::handle_export_status))
        // Stored résumé
        .route(
            "/api/v1/resume",
            get(resume::handle_get_resume).put(resume::handle_put_resume),
        )
        .route("/api/v1/resume/export", post(resume::handle_export_resume))
        .with_state(state)
}
