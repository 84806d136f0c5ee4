//! External rendering service backend (QuestPDF-style HTTP service).
//!
//! Every render probes `GET {base}/health` first and fails fast with
//! `BackendUnavailable` when the probe fails. The generation call is never attempted then.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::export::assembler::AssembledDocument;
use crate::export::backends::{BackendKind, RenderBackend};
use crate::export::page::A4;
use crate::export::sanitizer::SanitizeStrategy;
use crate::export::{ExportError, PdfArtifact};

const HEALTH_PATH: &str = "/health";
const GENERATE_PATH: &str = "/api/pdf/generate";
const DOWNLOAD_PATH: &str = "/api/pdf/download";
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u64 = 5;

// ────────────────────────────────────────────────────────────────────────────
// Settings and wire types
// ────────────────────────────────────────────────────────────────────────────

/// `Detailed` gets a JSON envelope with base64 PDF data and timing;
/// `Raw` gets the PDF bytes directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceMode {
    Detailed,
    Raw,
}

impl FromStr for ServiceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "detailed" | "json" => Ok(ServiceMode::Detailed),
            "raw" | "download" | "bytes" => Ok(ServiceMode::Raw),
            other => Err(format!("unknown service mode '{other}' (expected detailed or raw)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Margins {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FontOptions {
    pub family: String,
    pub size: f32,
}

/// Paper configuration sent with every request. Margins in millimetres.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaperConfig {
    pub paper_size: String,
    pub orientation: String,
    pub margins: Margins,
    pub font: FontOptions,
    pub page_numbers: bool,
    pub header_text: Option<String>,
    pub footer_text: Option<String>,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            paper_size: "A4".to_string(),
            orientation: "portrait".to_string(),
            margins: Margins {
                top: A4.margin_mm,
                right: A4.margin_mm,
                bottom: A4.margin_mm,
                left: A4.margin_mm,
            },
            font: FontOptions {
                family: "Inter".to_string(),
                size: 11.0,
            },
            page_numbers: false,
            header_text: None,
            footer_text: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorOptions {
    pub text: String,
    pub background: String,
    pub accent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FontPair {
    pub body: String,
    pub heading: String,
}

/// Style flags the service applies on its side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleOptions {
    pub remove_shadows: bool,
    pub remove_borders: bool,
    pub remove_rounded_corners: bool,
    pub remove_animations: bool,
    pub flatten_backgrounds: bool,
    pub convert_to_grayscale: bool,
    pub colors: ColorOptions,
    pub fonts: FontPair,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            remove_shadows: true,
            remove_borders: true,
            remove_rounded_corners: true,
            remove_animations: true,
            flatten_backgrounds: true,
            convert_to_grayscale: false,
            colors: ColorOptions {
                text: "#1f2937".to_string(),
                background: "#ffffff".to_string(),
                accent: "#2563eb".to_string(),
            },
            fonts: FontPair {
                body: "Inter".to_string(),
                heading: "Inter".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExternalServiceSettings {
    /// Service root, e.g. `http://localhost:5000`.
    pub base_url: String,
    pub mode: ServiceMode,
    pub health_timeout: Duration,
    pub request_timeout: Duration,
    pub paper: PaperConfig,
    pub styles: StyleOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    html: &'a str,
    filename: &'a str,
    config: &'a PaperConfig,
    styles: &'a StyleOptions,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailedResponse {
    success: bool,
    message: Option<String>,
    pdf_data: Option<String>,
    file_size: Option<u64>,
    generation_time: Option<serde_json::Value>,
    generated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    message: Option<String>,
    error: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Backend
// ────────────────────────────────────────────────────────────────────────────

pub struct ExternalServiceBackend {
    client: Client,
    settings: ExternalServiceSettings,
}

impl ExternalServiceBackend {
    pub fn new(settings: ExternalServiceSettings) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(settings.request_timeout).build()?;
        Ok(Self { client, settings })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.settings.base_url.trim_end_matches('/'), path)
    }

    /// 2xx from the health endpoint means available. Anything else is `BackendUnavailable`.
    pub async fn probe(&self) -> Result<(), ExportError> {
        let url = self.url(HEALTH_PATH);
        let response = self
            .client
            .get(&url)
            .timeout(self.settings.health_timeout)
            .send()
            .await
            .map_err(|e| {
                ExportError::BackendUnavailable(format!(
                    "PDF service at {} is not reachable ({e}). Start the service and retry.",
                    self.settings.base_url
                ))
            })?;

        if !response.status().is_success() {
            return Err(ExportError::BackendUnavailable(format!(
                "PDF service health check returned {}",
                response.status()
            )));
        }
        debug!("PDF service health check passed");
        Ok(())
    }

    async fn generate(&self, document: &AssembledDocument, filename: &str) -> Result<Vec<u8>, ExportError> {
        let path = match self.settings.mode {
            ServiceMode::Detailed => GENERATE_PATH,
            ServiceMode::Raw => DOWNLOAD_PATH,
        };
        let body = GenerateRequest {
            html: document.html(),
            filename,
            config: &self.settings.paper,
            styles: &self.settings.styles,
        };

        let response = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ServiceErrorBody>(&text)
                .ok()
                .and_then(|b| b.message.or(b.error))
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| format!("PDF service returned {status}"));
            warn!("PDF service returned {status}: {message}");
            return Err(ExportError::Upstream {
                status: Some(status.as_u16()),
                message,
            });
        }

        let bytes = match self.settings.mode {
            ServiceMode::Detailed => {
                let envelope: DetailedResponse = response.json().await.map_err(|e| ExportError::Upstream {
                    status: Some(status.as_u16()),
                    message: format!("malformed response from PDF service: {e}"),
                })?;
                decode_envelope(envelope)?
            }
            ServiceMode::Raw => response
                .bytes()
                .await
                .map_err(map_send_error)?
                .to_vec(),
        };

        if !bytes.starts_with(b"%PDF") {
            return Err(ExportError::Upstream {
                status: Some(status.as_u16()),
                message: "PDF service response is not a PDF document".to_string(),
            });
        }
        Ok(bytes)
    }
}

fn decode_envelope(envelope: DetailedResponse) -> Result<Vec<u8>, ExportError> {
    if !envelope.success {
        return Err(ExportError::Upstream {
            status: None,
            message: envelope
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| "PDF service reported a failure".to_string()),
        });
    }

    let data = envelope.pdf_data.ok_or_else(|| ExportError::Upstream {
        status: None,
        message: "PDF service response carried no PDF data".to_string(),
    })?;
    let bytes = BASE64.decode(data.trim()).map_err(|e| ExportError::Upstream {
        status: None,
        message: format!("PDF service returned undecodable data: {e}"),
    })?;

    info!(
        file_size = envelope.file_size,
        generation_time = ?envelope.generation_time,
        generated_at = envelope.generated_at.as_deref().unwrap_or("-"),
        "PDF service generated document"
    );
    Ok(bytes)
}

fn map_send_error(e: reqwest::Error) -> ExportError {
    if e.is_timeout() {
        ExportError::Timeout {
            stage: "PDF service request",
            message: e.to_string(),
        }
    } else if e.is_connect() {
        ExportError::BackendUnavailable(format!("PDF service connection failed: {e}"))
    } else {
        ExportError::Upstream {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

#[async_trait]
impl RenderBackend for ExternalServiceBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::External
    }

    /// The service applies its own style flags and does not take injected sheets.
    fn sanitize_strategy(&self) -> SanitizeStrategy {
        SanitizeStrategy::RegexStrip
    }

    async fn render(
        &self,
        document: &AssembledDocument,
        filename: &str,
    ) -> Result<PdfArtifact, ExportError> {
        self.probe().await?;
        debug!(css_bytes = document.css().len(), "Sending assembled document to PDF service");
        let bytes = self.generate(document, filename).await?;
        info!(size = bytes.len(), mode = ?self.settings.mode, "PDF service produced {filename}");
        Ok(PdfArtifact {
            filename: filename.to_string(),
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::assembler::assemble;
    use crate::export::harvester::HeadMetadata;
    use crate::export::sanitizer::SanitizedMarkup;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FAKE_PDF: &[u8] = b"%PDF-1.7\n%fake\n%%EOF";

    fn settings(base_url: String, mode: ServiceMode) -> ExternalServiceSettings {
        ExternalServiceSettings {
            base_url,
            mode,
            health_timeout: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            paper: PaperConfig::default(),
            styles: StyleOptions::default(),
        }
    }

    fn document() -> AssembledDocument {
        assemble(
            &HeadMetadata::default(),
            &SanitizedMarkup {
                html: "<div id=\"resume-preview\">Ada</div>".to_string(),
                strategy: SanitizeStrategy::RegexStrip,
            },
            "",
        )
    }

    async fn healthy_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_failed_probe_skips_generation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let backend = ExternalServiceBackend::new(settings(server.uri(), ServiceMode::Detailed)).unwrap();
        let err = backend.render(&document(), "cv.pdf").await.unwrap_err();
        assert!(matches!(err, ExportError::BackendUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        let backend =
            ExternalServiceBackend::new(settings("http://127.0.0.1:9".to_string(), ServiceMode::Raw)).unwrap();
        let err = backend.render(&document(), "cv.pdf").await.unwrap_err();
        assert!(matches!(err, ExportError::BackendUnavailable(_)));
        assert!(err.to_string().contains("Start the service"));
    }

    #[tokio::test]
    async fn test_detailed_mode_decodes_envelope() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .and(body_partial_json(json!({
                "filename": "cv.pdf",
                "config": {"paperSize": "A4", "orientation": "portrait"},
                "styles": {"removeShadows": true, "removeRoundedCorners": true}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "message": "ok",
                "pdfData": BASE64.encode(FAKE_PDF),
                "fileSize": FAKE_PDF.len(),
                "generationTime": 142,
                "generatedAt": "2026-10-17T10:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let backend = ExternalServiceBackend::new(settings(server.uri(), ServiceMode::Detailed)).unwrap();
        let artifact = backend.render(&document(), "cv.pdf").await.unwrap();
        assert_eq!(artifact.bytes, FAKE_PDF);
        assert_eq!(artifact.filename, "cv.pdf");
    }

    #[tokio::test]
    async fn test_raw_mode_returns_bytes() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw(FAKE_PDF, "application/pdf"))
            .expect(1)
            .mount(&server)
            .await;

        let backend = ExternalServiceBackend::new(settings(server.uri(), ServiceMode::Raw)).unwrap();
        let artifact = backend.render(&document(), "cv.pdf").await.unwrap();
        assert_eq!(artifact.bytes, FAKE_PDF);
    }

    #[tokio::test]
    async fn test_error_status_surfaces_server_message() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"message": "QuestPDF layout overflow"})),
            )
            .mount(&server)
            .await;

        let backend = ExternalServiceBackend::new(settings(server.uri(), ServiceMode::Detailed)).unwrap();
        let err = backend.render(&document(), "cv.pdf").await.unwrap_err();
        match err {
            ExportError::Upstream { status, message } => {
                assert_eq!(status, Some(500));
                assert_eq!(message, "QuestPDF layout overflow");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_error_status_without_body_uses_generic_message() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .mount(&server)
            .await;

        let backend = ExternalServiceBackend::new(settings(server.uri(), ServiceMode::Raw)).unwrap();
        let err = backend.render(&document(), "cv.pdf").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Render service error: PDF service returned 502 Bad Gateway"
        );
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_upstream_error() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "message": "Template font missing"
            })))
            .mount(&server)
            .await;

        let backend = ExternalServiceBackend::new(settings(server.uri(), ServiceMode::Detailed)).unwrap();
        let err = backend.render(&document(), "cv.pdf").await.unwrap_err();
        assert_eq!(err.to_string(), "Render service error: Template font missing");
    }

    #[tokio::test]
    async fn test_non_pdf_payload_is_rejected() {
        let server = healthy_server().await;
        Mock::given(method("POST"))
            .and(path(DOWNLOAD_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_raw("hello", "text/plain"))
            .mount(&server)
            .await;

        let backend = ExternalServiceBackend::new(settings(server.uri(), ServiceMode::Raw)).unwrap();
        let err = backend.render(&document(), "cv.pdf").await.unwrap_err();
        assert!(matches!(err, ExportError::Upstream { .. }));
    }

    #[test]
    fn test_service_mode_parses() {
        assert_eq!("detailed".parse::<ServiceMode>(), Ok(ServiceMode::Detailed));
        assert_eq!("RAW".parse::<ServiceMode>(), Ok(ServiceMode::Raw));
        assert!("xml".parse::<ServiceMode>().is_err());
    }

    #[test]
    fn test_backend_uses_regex_strategy() {
        let backend =
            ExternalServiceBackend::new(settings("http://localhost:5000".to_string(), ServiceMode::Raw)).unwrap();
        assert_eq!(backend.sanitize_strategy(), SanitizeStrategy::RegexStrip);
        assert_eq!(backend.url("/health"), "http://localhost:5000/health");
    }
}
