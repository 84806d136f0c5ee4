//! Render backends — three interchangeable PDF engines behind one trait.
//!
//! The backend is picked once at startup from configuration and carried in the
//! orchestrator as `Arc<dyn RenderBackend>`. No per-call branching anywhere else.

pub mod browser;
pub mod canvas;
pub mod external;
pub mod headless;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::export::assembler::AssembledDocument;
use crate::export::sanitizer::SanitizeStrategy;
use crate::export::{ExportError, PdfArtifact};

use canvas::CanvasBackend;
use external::ExternalServiceBackend;
use headless::HeadlessBrowserBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Headless,
    Canvas,
    External,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Headless => "headless",
            BackendKind::Canvas => "canvas",
            BackendKind::External => "external",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "headless" | "puppeteer" | "chrome" => Ok(BackendKind::Headless),
            "canvas" | "client" => Ok(BackendKind::Canvas),
            "external" | "service" => Ok(BackendKind::External),
            other => Err(format!(
                "unknown render backend '{other}' (expected headless, canvas or external)"
            )),
        }
    }
}

/// One PDF engine. Implementations must release every resource they acquire
/// before returning, on success and on error.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Which sanitization the backend's input should get.
    fn sanitize_strategy(&self) -> SanitizeStrategy {
        SanitizeStrategy::OverrideStylesheet
    }

    async fn render(
        &self,
        document: &AssembledDocument,
        filename: &str,
    ) -> Result<PdfArtifact, ExportError>;
}

/// Builds the configured backend.
pub fn build_backend(kind: BackendKind, config: &Config) -> anyhow::Result<Arc<dyn RenderBackend>> {
    let backend: Arc<dyn RenderBackend> = match kind {
        BackendKind::Headless => Arc::new(HeadlessBrowserBackend::new(config.browser.clone())),
        BackendKind::Canvas => Arc::new(CanvasBackend::with_chrome(
            config.browser.clone(),
            config.target_selector.clone(),
        )),
        BackendKind::External => {
            let settings = config.external_service.clone().ok_or_else(|| {
                anyhow::anyhow!("EXTERNAL_SERVICE_URL must be set to use the external backend")
            })?;
            Arc::new(ExternalServiceBackend::new(settings)?)
        }
    };
    Ok(backend)
}
