//! Headless-browser backend: load the assembled document into Chromium and print it.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use tracing::{debug, info, warn};

use crate::export::assembler::AssembledDocument;
use crate::export::backends::browser::{with_timeout, BrowserSession, BrowserSettings};
use crate::export::backends::{BackendKind, RenderBackend};
use crate::export::page::{PageConfig, A4};
use crate::export::{ExportError, PdfArtifact};

pub struct HeadlessBrowserBackend {
    settings: BrowserSettings,
    page: PageConfig,
}

impl HeadlessBrowserBackend {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings, page: A4 }
    }

    async fn print(&self, session: &BrowserSession, document: &AssembledDocument) -> Result<Vec<u8>, ExportError> {
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ExportError::Render(format!("failed to open page: {e}")))?;

        with_timeout("Page load", self.settings.page_load_timeout, async {
            page.set_content(document.html())
                .await
                .map(|_| ())
                .map_err(|e| ExportError::Render(format!("failed to load document: {e}")))
        })
        .await?;

        tokio::time::sleep(self.settings.settle_delay).await;

        let bytes = page
            .pdf(print_params(&self.page))
            .await
            .map_err(|e| ExportError::Render(format!("failed to print PDF: {e}")))?;

        if let Err(e) = page.close().await {
            warn!("Failed to close page: {e}");
        }
        Ok(bytes)
    }
}

/// A4, fixed margins, backgrounds printed.
pub fn print_params(page: &PageConfig) -> PrintToPdfParams {
    PrintToPdfParams::builder()
        .landscape(false)
        .print_background(true)
        .prefer_css_page_size(false)
        .paper_width(page.width_in())
        .paper_height(page.height_in())
        .margin_top(page.margin_in())
        .margin_bottom(page.margin_in())
        .margin_left(page.margin_in())
        .margin_right(page.margin_in())
        .build()
}

#[async_trait]
impl RenderBackend for HeadlessBrowserBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Headless
    }

    async fn render(
        &self,
        document: &AssembledDocument,
        filename: &str,
    ) -> Result<PdfArtifact, ExportError> {
        debug!(
            title = %document.head().title,
            css_bytes = document.css().len(),
            "Printing assembled document"
        );
        let session = BrowserSession::launch(&self.settings, self.page.viewport_px()).await?;

        let result = with_timeout(
            "PDF generation",
            self.settings.generation_timeout,
            self.print(&session, document),
        )
        .await;

        session.shutdown().await;

        let bytes = result?;
        info!(size = bytes.len(), "Headless browser produced {filename}");
        Ok(PdfArtifact {
            filename: filename.to_string(),
            bytes,
        })
    }
}
