use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::export::ExportError;
use crate::resume::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    fn parts(&self) -> (StatusCode, &'static str, String, Option<String>) {
        match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None),
            AppError::Export(e) => {
                let (status, code) = match e {
                    ExportError::TargetMissing(_) => (StatusCode::BAD_REQUEST, "TARGET_MISSING"),
                    ExportError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_EXPORT_REQUEST"),
                    ExportError::AlreadyInFlight => (StatusCode::CONFLICT, "EXPORT_IN_PROGRESS"),
                    ExportError::Upstream { .. } => (StatusCode::BAD_GATEWAY, "RENDER_SERVICE_ERROR"),
                    ExportError::BackendUnavailable(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "BACKEND_UNAVAILABLE")
                    }
                    ExportError::Timeout { .. } => (StatusCode::GATEWAY_TIMEOUT, "EXPORT_TIMEOUT"),
                    ExportError::Render(_) => (StatusCode::INTERNAL_SERVER_ERROR, "RENDER_FAILED"),
                    ExportError::AllBackendsFailed { .. } => {
                        (StatusCode::INTERNAL_SERVER_ERROR, "ALL_BACKENDS_FAILED")
                    }
                };
                let details = match e {
                    ExportError::Upstream {
                        status: Some(upstream), ..
                    } => Some(format!("render service responded with status {upstream}")),
                    ExportError::Timeout { stage, .. } => Some(format!("stage: {stage}")),
                    _ => None,
                };
                (status, code, e.to_string(), details)
            }
            AppError::Store(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORAGE_ERROR",
                    "The résumé could not be saved".to_string(),
                    Some(e.to_string()),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = self.parts();

        let mut body = json!({
            "error": message,
            "code": code,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(details) = details {
            body["details"] = json!(details);
        }

        (status, Json(body)).into_response()
    }
}
