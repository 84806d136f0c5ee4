//! Export Orchestrator — drives one export job through harvest → assemble → render.
//!
//! Owns the job state machine (`Idle → Harvesting → Assembling → Rendering → Done | Failed`)
//! and publishes every transition on a `watch` channel. At most one job is in flight;
//! a second request is rejected, never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::export::assembler::{assemble, AssembledDocument};
use crate::export::backends::{BackendKind, RenderBackend};
use crate::export::harvester::{scan_page, HeadMetadata, StyleHarvester};
use crate::export::sanitizer::{extract_target, sanitize, SanitizeStrategy};
use crate::export::{ExportError, PdfArtifact};

const DEFAULT_FILENAME: &str = "resume.pdf";
const CANCELLED_REASON: &str = "export cancelled before completion";

const PROGRESS_TARGET_LOCATED: u8 = 10;
const PROGRESS_ASSEMBLED: u8 = 30;
const PROGRESS_RENDERED: u8 = 70;
const PROGRESS_DONE: u8 = 100;

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ExportState {
    Idle,
    Harvesting {
        job_id: Uuid,
        progress: u8,
    },
    Assembling {
        job_id: Uuid,
        progress: u8,
    },
    Rendering {
        job_id: Uuid,
        progress: u8,
        backend: BackendKind,
    },
    Done {
        job_id: Uuid,
        filename: String,
    },
    Failed {
        job_id: Uuid,
        reason: String,
    },
}

impl ExportState {
    pub fn progress(&self) -> u8 {
        match self {
            ExportState::Idle | ExportState::Failed { .. } => 0,
            ExportState::Harvesting { progress, .. }
            | ExportState::Assembling { progress, .. }
            | ExportState::Rendering { progress, .. } => *progress,
            ExportState::Done { .. } => PROGRESS_DONE,
        }
    }

    pub fn is_exporting(&self) -> bool {
        matches!(
            self,
            ExportState::Harvesting { .. } | ExportState::Assembling { .. } | ExportState::Rendering { .. }
        )
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request / receipt
// ────────────────────────────────────────────────────────────────────────────

/// The page snapshot to export from.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub page_html: String,
    /// Resolves relative stylesheet and asset URLs.
    pub base_url: Option<Url>,
    /// Overrides the configured target selector.
    pub target_selector: Option<String>,
}

impl ExportRequest {
    pub fn new(page_html: impl Into<String>) -> Self {
        Self {
            page_html: page_html.into(),
            base_url: None,
            target_selector: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExportOptions {
    pub filename: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExportReceipt {
    pub success: bool,
    pub filename: String,
    pub job_id: Uuid,
    pub backend: BackendKind,
    pub artifact: PdfArtifact,
}

/// Target markup and styles shared by every attempt of one job.
struct PreparedPage {
    head: HeadMetadata,
    target_html: String,
    css: String,
}

/// Clears the in-flight flag on drop, whichever way the job ends. A job dropped
/// before it published `Done` or `Failed` is recorded as `Failed`.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
    state: &'a watch::Sender<ExportState>,
    job_id: Uuid,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool, state: &'a watch::Sender<ExportState>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag,
                state,
                job_id: Uuid::new_v4(),
            })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if self.state.borrow().is_exporting() {
            warn!(job_id = %self.job_id, "Export was cancelled before completion");
            self.state.send_replace(ExportState::Failed {
                job_id: self.job_id,
                reason: CANCELLED_REASON.to_string(),
            });
        }
        self.flag.store(false, Ordering::Release);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Orchestrator
// ────────────────────────────────────────────────────────────────────────────

pub struct ExportOrchestrator {
    harvester: StyleHarvester,
    primary: Arc<dyn RenderBackend>,
    fallback: Option<Arc<dyn RenderBackend>>,
    default_selector: String,
    in_flight: AtomicBool,
    state: watch::Sender<ExportState>,
}

impl ExportOrchestrator {
    pub fn new(
        harvester: StyleHarvester,
        primary: Arc<dyn RenderBackend>,
        fallback: Option<Arc<dyn RenderBackend>>,
        default_selector: impl Into<String>,
    ) -> Self {
        let (state, _) = watch::channel(ExportState::Idle);
        Self {
            harvester,
            primary,
            fallback,
            default_selector: default_selector.into(),
            in_flight: AtomicBool::new(false),
            state,
        }
    }

    /// Receives every state transition from now on.
    pub fn subscribe(&self) -> watch::Receiver<ExportState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ExportState {
        self.state.borrow().clone()
    }

    pub fn is_exporting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn primary_backend(&self) -> BackendKind {
        self.primary.kind()
    }

    pub fn fallback_backend(&self) -> Option<BackendKind> {
        self.fallback.as_ref().map(|b| b.kind())
    }

    /// Exports through the primary backend only.
    pub async fn export_resume(
        &self,
        request: &ExportRequest,
        options: &ExportOptions,
    ) -> Result<ExportReceipt, ExportError> {
        self.run(request, options, false).await
    }

    /// Exports through the primary backend, then once through the fallback
    /// backend if the primary fails. Without a fallback this is `export_resume`.
    pub async fn smart_export(
        &self,
        request: &ExportRequest,
        options: &ExportOptions,
    ) -> Result<ExportReceipt, ExportError> {
        self.run(request, options, true).await
    }

    async fn run(
        &self,
        request: &ExportRequest,
        options: &ExportOptions,
        allow_fallback: bool,
    ) -> Result<ExportReceipt, ExportError> {
        let Some(guard) = InFlightGuard::acquire(&self.in_flight, &self.state) else {
            warn!("Rejected export request: another export is in progress");
            return Err(ExportError::AlreadyInFlight);
        };

        let job_id = guard.job_id;
        let filename = normalize_filename(options.filename.as_deref());
        info!(%job_id, "Starting export of {filename}");

        match self.pipeline(job_id, request, &filename, allow_fallback).await {
            Ok((backend, artifact)) => {
                self.publish(ExportState::Done {
                    job_id,
                    filename: filename.clone(),
                });
                info!(%job_id, %backend, size = artifact.bytes.len(), "Export finished: {filename}");
                Ok(ExportReceipt {
                    success: true,
                    filename,
                    job_id,
                    backend,
                    artifact,
                })
            }
            Err(e) => {
                error!(%job_id, "Export failed: {e}");
                self.publish(ExportState::Failed {
                    job_id,
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn pipeline(
        &self,
        job_id: Uuid,
        request: &ExportRequest,
        filename: &str,
        allow_fallback: bool,
    ) -> Result<(BackendKind, PdfArtifact), ExportError> {
        self.publish(ExportState::Harvesting { job_id, progress: 0 });
        let page = self.prepare(request).await?;
        let base_url = request.base_url.as_ref();

        self.publish(ExportState::Assembling {
            job_id,
            progress: PROGRESS_TARGET_LOCATED,
        });
        let primary_strategy = self.primary.sanitize_strategy();
        let document = assemble_for(&page, primary_strategy, base_url);

        let primary_error = match self.attempt(job_id, self.primary.as_ref(), &document, filename).await {
            Ok(artifact) => return Ok((self.primary.kind(), artifact)),
            Err(e) => e,
        };

        let fallback = match (&self.fallback, allow_fallback) {
            (Some(fallback), true) if is_retryable(&primary_error) => fallback,
            _ => return Err(primary_error),
        };

        warn!(
            %job_id,
            primary = %self.primary.kind(),
            fallback = %fallback.kind(),
            "Primary backend failed, trying fallback: {primary_error}"
        );

        let fallback_strategy = fallback.sanitize_strategy();
        let document = if fallback_strategy == primary_strategy {
            document
        } else {
            self.publish(ExportState::Assembling {
                job_id,
                progress: PROGRESS_TARGET_LOCATED,
            });
            assemble_for(&page, fallback_strategy, base_url)
        };

        match self.attempt(job_id, fallback.as_ref(), &document, filename).await {
            Ok(artifact) => Ok((fallback.kind(), artifact)),
            Err(fallback_error) => Err(ExportError::AllBackendsFailed {
                primary: primary_error.to_string(),
                fallback: fallback_error.to_string(),
            }),
        }
    }

    /// Locates the target and harvests the page styles.
    async fn prepare(&self, request: &ExportRequest) -> Result<PreparedPage, ExportError> {
        if request.page_html.trim().is_empty() {
            return Err(ExportError::InvalidRequest("page HTML is empty".to_string()));
        }
        let selector = request
            .target_selector
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_selector);

        let target_html = extract_target(&request.page_html, selector)?;
        let sources = scan_page(&request.page_html, request.base_url.as_ref());
        let harvested = self.harvester.harvest(&sources).await;

        Ok(PreparedPage {
            head: sources.head,
            target_html,
            css: harvested.css,
        })
    }

    async fn attempt(
        &self,
        job_id: Uuid,
        backend: &dyn RenderBackend,
        document: &AssembledDocument,
        filename: &str,
    ) -> Result<PdfArtifact, ExportError> {
        self.publish(ExportState::Rendering {
            job_id,
            progress: PROGRESS_ASSEMBLED,
            backend: backend.kind(),
        });
        let artifact = backend.render(document, filename).await?;
        if artifact.bytes.is_empty() {
            return Err(ExportError::Render(format!("{} backend returned an empty PDF", backend.kind())));
        }
        self.publish(ExportState::Rendering {
            job_id,
            progress: PROGRESS_RENDERED,
            backend: backend.kind(),
        });
        Ok(artifact)
    }

    fn publish(&self, state: ExportState) {
        self.state.send_replace(state);
    }
}

fn assemble_for(page: &PreparedPage, strategy: SanitizeStrategy, base_url: Option<&Url>) -> AssembledDocument {
    let markup = sanitize(&page.target_html, strategy, base_url);
    assemble(&page.head, &markup, &page.css)
}

/// Input errors fail identically on every backend and are not retried.
fn is_retryable(error: &ExportError) -> bool {
    !matches!(
        error,
        ExportError::TargetMissing(_) | ExportError::InvalidRequest(_) | ExportError::AlreadyInFlight
    )
}

/// Non-empty, `.pdf`-suffixed, with path separators and control characters removed.
pub fn normalize_filename(raw: Option<&str>) -> String {
    let cleaned: String = raw
        .unwrap_or_default()
        .chars()
        .filter(|c| !matches!(c, '/' | '\\') && !c.is_control())
        .collect();
    let cleaned = cleaned.trim();

    let (stem, suffix) = if cleaned.to_ascii_lowercase().ends_with(".pdf") {
        cleaned.split_at(cleaned.len() - 4)
    } else {
        (cleaned, ".pdf")
    };
    let stem = stem.trim().trim_start_matches('.').trim();
    if stem.is_empty() {
        return DEFAULT_FILENAME.to_string();
    }
    format!("{stem}{suffix}")
}
