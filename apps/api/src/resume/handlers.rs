use axum::{extract::State, http::StatusCode, response::Response, Json};
use serde::Deserialize;
use tracing::info;

use crate::errors::AppError;
use crate::export::handlers::{pdf_response, spawn_export};
use crate::export::{ExportOptions, ExportRequest, DEFAULT_TARGET_SELECTOR};
use crate::models::resume::StoredResume;
use crate::resume::preview::render_page;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResumeExportRequest {
    pub filename: Option<String>,
    /// Use smart export (primary, then fallback backend).
    pub smart: bool,
}

/// GET /api/v1/resume
pub async fn handle_get_resume(State(state): State<AppState>) -> Result<Json<StoredResume>, AppError> {
    state
        .store
        .get()
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No résumé has been saved yet".to_string()))
}

/// PUT /api/v1/resume
pub async fn handle_put_resume(
    State(state): State<AppState>,
    Json(resume): Json<StoredResume>,
) -> Result<StatusCode, AppError> {
    state.store.save(resume).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/resume/export
///
/// Renders the stored résumé's preview page and exports it like an editor snapshot.
pub async fn handle_export_resume(
    State(state): State<AppState>,
    Json(req): Json<ResumeExportRequest>,
) -> Result<Response, AppError> {
    let stored = state
        .store
        .get()
        .await
        .ok_or_else(|| AppError::NotFound("No résumé has been saved yet".to_string()))?;

    let filename = req.filename.or_else(|| default_filename(&stored));
    let page = render_page(&stored);
    info!(template = stored.settings.template.as_str(), "Exporting stored résumé");

    let request = ExportRequest {
        target_selector: Some(DEFAULT_TARGET_SELECTOR.to_string()),
        ..ExportRequest::new(page)
    };
    let options = ExportOptions { filename };
    let receipt = spawn_export(state.exporter.clone(), request, options, req.smart).await?;
    Ok(pdf_response(receipt))
}

/// `<First>_<Last>_Resume.pdf`, or none when the name is blank.
fn default_filename(stored: &StoredResume) -> Option<String> {
    let name = stored.resume_data.personal_info.full_name();
    if name.is_empty() {
        return None;
    }
    let joined = name.split_whitespace().collect::<Vec<_>>().join("_");
    Some(format!("{joined}_Resume.pdf"))
}
