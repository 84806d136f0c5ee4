//! One headless Chromium process per export request.
//!
//! Never pooled: the session is launched at the start of a render and shut down at
//! its end, whatever the outcome.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::export::ExportError;

pub const DEFAULT_PAGE_LOAD_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    /// Chrome/Chromium executable; `None` lets chromiumoxide detect one.
    pub chrome_path: Option<String>,
    /// Disables the Chromium sandbox (needed in most containers).
    pub no_sandbox: bool,
    pub page_load_timeout: Duration,
    pub generation_timeout: Duration,
    /// Pause after content load for late layout and font shaping.
    pub settle_delay: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            no_sandbox: false,
            page_load_timeout: Duration::from_secs(DEFAULT_PAGE_LOAD_TIMEOUT_SECS),
            generation_timeout: Duration::from_secs(DEFAULT_GENERATION_TIMEOUT_SECS),
            settle_delay: Duration::from_millis(DEFAULT_SETTLE_DELAY_MS),
        }
    }
}

pub struct BrowserSession {
    pub browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(settings: &BrowserSettings, viewport: (u32, u32)) -> Result<Self, ExportError> {
        let mut builder = BrowserConfig::builder()
            .window_size(viewport.0, viewport.1)
            .request_timeout(settings.page_load_timeout)
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--hide-scrollbars")
            .arg("--font-render-hinting=none");

        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = settings.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let config = builder
            .build()
            .map_err(|e| ExportError::Render(format!("invalid browser configuration: {e}")))?;

        let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
            ExportError::BackendUnavailable(format!("failed to launch headless browser: {e}"))
        })?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        info!("Headless browser launched ({}x{})", viewport.0, viewport.1);
        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Closes the browser and stops the event handler. Failures are logged only,
    /// so they never replace the render error the caller is about to return.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("Failed to close headless browser cleanly: {e}");
            if let Some(Err(e)) = self.browser.kill().await {
                warn!("Failed to kill headless browser process: {e}");
            }
        }
        if let Err(e) = self.browser.wait().await {
            warn!("Failed to reap headless browser process: {e}");
        }
        self.handler_task.abort();
        debug!("Headless browser shut down");
    }
}

/// Runs `fut` under `limit`, mapping expiry to a `Timeout` for `stage`.
pub async fn with_timeout<T, F>(stage: &'static str, limit: Duration, fut: F) -> Result<T, ExportError>
where
    F: std::future::Future<Output = Result<T, ExportError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ExportError::Timeout {
            stage,
            message: format!("exceeded {}ms", limit.as_millis()),
        })?
}
