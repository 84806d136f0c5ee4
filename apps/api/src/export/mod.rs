// HTML-to-PDF export pipeline.
// harvest CSS → sanitize target subtree → assemble one self-contained document
// → render through exactly one configured backend (plus one fallback for smart export).

pub mod assembler;
pub mod backends;
pub mod handlers;
pub mod harvester;
pub mod orchestrator;
pub mod page;
pub mod print_styles;
pub mod sanitizer;

use thiserror::Error;

/// Well-known id of the résumé preview node the editor renders.
pub const DEFAULT_TARGET_SELECTOR: &str = "#resume-preview";

pub use orchestrator::{ExportOptions, ExportOrchestrator, ExportRequest, ExportState};

#[derive(Debug, Clone, Error)]
pub enum ExportError {
    #[error("Export target not found: {0}")]
    TargetMissing(String),

    #[error("{stage} timed out: {message}")]
    Timeout { stage: &'static str, message: String },

    #[error("Render backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Render service error: {message}")]
    Upstream { status: Option<u16>, message: String },

    #[error("PDF rendering failed: {0}")]
    Render(String),

    #[error("An export is already in progress")]
    AlreadyInFlight,

    #[error("Invalid export request: {0}")]
    InvalidRequest(String),

    #[error("Export failed on both backends. Primary: {primary}. Fallback: {fallback}")]
    AllBackendsFailed { primary: String, fallback: String },
}

/// Terminal output of a successful export. Handed to the client once, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfArtifact {
    pub filename: String,
    pub bytes: Vec<u8>,
}
