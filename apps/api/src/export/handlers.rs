use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;

use crate::errors::AppError;
use crate::export::orchestrator::ExportReceipt;
use crate::export::{ExportOptions, ExportOrchestrator, ExportRequest, ExportState};
use crate::state::AppState;

const JOB_ID_HEADER: HeaderName = HeaderName::from_static("x-export-job-id");
const BACKEND_HEADER: HeaderName = HeaderName::from_static("x-export-backend");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPdfRequest {
    /// Full page snapshot containing the export target.
    pub html: String,
    pub filename: Option<String>,
    pub base_url: Option<String>,
    pub target_selector: Option<String>,
}

impl ExportPdfRequest {
    fn into_parts(self) -> Result<(ExportRequest, ExportOptions), AppError> {
        if self.html.trim().is_empty() {
            return Err(AppError::Validation("html must not be empty".to_string()));
        }
        let base_url = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(|u| Url::parse(u).map_err(|e| AppError::Validation(format!("invalid baseUrl '{u}': {e}"))))
            .transpose()?;

        Ok((
            ExportRequest {
                page_html: self.html,
                base_url,
                target_selector: self.target_selector,
            },
            ExportOptions {
                filename: self.filename,
            },
        ))
    }
}

/// POST /api/v1/export/pdf
pub async fn handle_export_pdf(
    State(state): State<AppState>,
    Json(req): Json<ExportPdfRequest>,
) -> Result<Response, AppError> {
    let (request, options) = req.into_parts()?;
    let receipt = spawn_export(state.exporter.clone(), request, options, false).await?;
    Ok(pdf_response(receipt))
}

/// POST /api/v1/export/smart
pub async fn handle_smart_export(
    State(state): State<AppState>,
    Json(req): Json<ExportPdfRequest>,
) -> Result<Response, AppError> {
    let (request, options) = req.into_parts()?;
    let receipt = spawn_export(state.exporter.clone(), request, options, true).await?;
    Ok(pdf_response(receipt))
}

/// GET /api/v1/export/status
pub async fn handle_export_status(State(state): State<AppState>) -> Json<ExportState> {
    Json(state.exporter.state())
}

/// Runs the job on its own task so a dropped connection cannot cut a render short.
pub async fn spawn_export(
    exporter: Arc<ExportOrchestrator>,
    request: ExportRequest,
    options: ExportOptions,
    smart: bool,
) -> Result<ExportReceipt, AppError> {
    let job = tokio::spawn(async move {
        if smart {
            exporter.smart_export(&request, &options).await
        } else {
            exporter.export_resume(&request, &options).await
        }
    });
    let receipt = job.await.map_err(anyhow::Error::from)??;
    Ok(receipt)
}

/// The PDF as a download. The bytes are handed over here and not kept anywhere.
pub fn pdf_response(receipt: ExportReceipt) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&receipt.filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Ok(value) = HeaderValue::from_str(&receipt.job_id.to_string()) {
        headers.insert(JOB_ID_HEADER, value);
    }
    headers.insert(BACKEND_HEADER, HeaderValue::from_static(receipt.backend.as_str()));

    (headers, Bytes::from(receipt.artifact.bytes)).into_response()
}

/// `attachment` with an ASCII `filename` and an RFC 5987 `filename*` for the real name.
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{ascii}\"; filename*=UTF-8''{}",
        percent_encode(filename)
    )
}

fn percent_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
