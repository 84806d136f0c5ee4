//! Canvas backend — rasterize the résumé at 2x and slice the bitmap into A4 pages.
//!
//! Capture happens in a browser tab holding the assembled document. The target node is
//! temporarily restyled (its original `style` attribute snapshotted first) and cloned into
//! a wrapper that reproduces the editor's hierarchy: page background → centered
//! max-width container → white card. After the screenshot, the original `style` is put
//! back and the wrapper removed, on the error path too.
//!
//! Pagination: `content_height = content_height_mm / content_width_mm × bitmap_width`;
//! each page consumes `content_height` pixels until `height_left` reaches zero.

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use image::{DynamicImage, Rgb, RgbImage};
use printpdf::{Image, ImageTransform, Mm, PdfDocument};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::export::assembler::AssembledDocument;
use crate::export::backends::browser::{with_timeout, BrowserSession, BrowserSettings};
use crate::export::backends::{BackendKind, RenderBackend};
use crate::export::page::{PageConfig, A4};
use crate::export::{ExportError, PdfArtifact};

/// Device pixels per CSS pixel for the capture.
pub const CAPTURE_SCALE: f64 = 2.0;

const CAPTURE_WRAPPER_ID: &str = "vitae-capture-page";
const CAPTURE_CARD_ID: &str = "vitae-capture-card";
const PAGE_BACKGROUND: &str = "#f3f4f6";

// ────────────────────────────────────────────────────────────────────────────
// Rasterization
// ────────────────────────────────────────────────────────────────────────────

/// Produces a PNG snapshot of the résumé card.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, document: &AssembledDocument) -> Result<Vec<u8>, ExportError>;
}

pub struct ChromeRasterizer {
    settings: BrowserSettings,
    target_selector: String,
    page: PageConfig,
}

#[derive(Debug, Deserialize)]
struct CaptureBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl ChromeRasterizer {
    pub fn new(settings: BrowserSettings, target_selector: String) -> Self {
        Self {
            settings,
            target_selector,
            page: A4,
        }
    }

    async fn capture(&self, session: &BrowserSession, document: &AssembledDocument) -> Result<Vec<u8>, ExportError> {
        let (width, height) = self.page.viewport_px();
        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ExportError::Render(format!("failed to open page: {e}")))?;

        page.execute(SetDeviceMetricsOverrideParams::new(
            width as i64,
            height as i64,
            CAPTURE_SCALE,
            false,
        ))
        .await
        .map_err(|e| ExportError::Render(format!("failed to set capture scale: {e}")))?;

        with_timeout("Page load", self.settings.page_load_timeout, async {
            page.set_content(document.html())
                .await
                .map(|_| ())
                .map_err(|e| ExportError::Render(format!("failed to load document: {e}")))
        })
        .await?;

        let shot = self.snapshot_card(&page, width).await;
        self.restore(&page).await;

        if let Err(e) = page.close().await {
            warn!("Failed to close capture page: {e}");
        }
        shot
    }

    async fn snapshot_card(&self, page: &Page, width: u32) -> Result<Vec<u8>, ExportError> {
        let prepared: bool = page
            .evaluate(capture_script(&self.target_selector, width))
            .await
            .map_err(|e| ExportError::Render(format!("capture script failed: {e}")))?
            .into_value()
            .map_err(|e| ExportError::Render(format!("capture script returned garbage: {e}")))?;
        if !prepared {
            return Err(ExportError::TargetMissing(format!(
                "no element matches `{}` in the capture page",
                self.target_selector
            )));
        }

        tokio::time::sleep(self.settings.settle_delay).await;

        let bounds: CaptureBox = page
            .evaluate(bounds_script())
            .await
            .map_err(|e| ExportError::Render(format!("failed to measure capture card: {e}")))?
            .into_value()
            .map_err(|e| ExportError::Render(format!("failed to measure capture card: {e}")))?;
        debug!(
            "Capture card at ({}, {}) {}x{} css px",
            bounds.x, bounds.y, bounds.width, bounds.height
        );

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(Viewport {
                x: bounds.x,
                y: bounds.y,
                width: bounds.width,
                height: bounds.height,
                scale: 1.0,
            })
            .capture_beyond_viewport(true)
            .omit_background(false)
            .build();

        page.screenshot(params)
            .await
            .map_err(|e| ExportError::Render(format!("screenshot failed: {e}")))
    }

    /// Puts the target's original `style` back and removes the wrapper.
    async fn restore(&self, page: &Page) {
        match page.evaluate(restore_script(&self.target_selector)).await {
            Ok(_) => debug!("Capture mutations reverted"),
            Err(e) => warn!("Failed to revert capture mutations: {e}"),
        }
    }
}

#[async_trait]
impl Rasterizer for ChromeRasterizer {
    async fn rasterize(&self, document: &AssembledDocument) -> Result<Vec<u8>, ExportError> {
        let session = BrowserSession::launch(&self.settings, self.page.viewport_px()).await?;
        let result = with_timeout(
            "Canvas capture",
            self.settings.generation_timeout,
            self.capture(&session, document),
        )
        .await;
        session.shutdown().await;
        result
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// Snapshots the target's `style`, restyles it, and clones it into the capture wrapper.
/// The assembled body starts with the target, so its first element stands in when the
/// selector does not match. Evaluates to `false` on an empty body (nothing is mutated then).
pub fn capture_script(selector: &str, width_px: u32) -> String {
    format!(
        r#"(() => {{
  const source = document.querySelector({selector}) || document.body.firstElementChild;
  if (!source) return false;
  window.__vitaeCapture = {{ style: source.getAttribute('style') }};
  const set = (el, prop, value) => el.style.setProperty(prop, value, 'important');
  set(source, 'width', '{width_px}px');
  set(source, 'max-width', '{width_px}px');
  set(source, 'margin', '0');
  set(source, 'transform', 'none');
  set(source, 'box-shadow', 'none');
  const wrapper = document.createElement('div');
  wrapper.id = {wrapper_id};
  set(wrapper, 'position', 'absolute');
  set(wrapper, 'left', '0');
  set(wrapper, 'top', '0');
  set(wrapper, 'width', '100%');
  set(wrapper, 'z-index', '2147483647');
  set(wrapper, 'background-color', '{page_bg}');
  const container = document.createElement('div');
  set(container, 'max-width', '{width_px}px');
  set(container, 'margin', '0 auto');
  const card = document.createElement('div');
  card.id = {card_id};
  set(card, 'background-color', '#ffffff');
  set(card, 'width', '{width_px}px');
  const clone = source.cloneNode(true);
  clone.removeAttribute('id');
  clone.querySelectorAll('img').forEach((img) => {{
    img.crossOrigin = 'anonymous';
    img.loading = 'eager';
  }});
  card.appendChild(clone);
  container.appendChild(card);
  wrapper.appendChild(container);
  document.body.appendChild(wrapper);
  return true;
}})()"#,
        selector = js_string(selector),
        wrapper_id = js_string(CAPTURE_WRAPPER_ID),
        card_id = js_string(CAPTURE_CARD_ID),
        page_bg = PAGE_BACKGROUND,
    )
}

/// Restores the snapshotted `style` attribute and removes the wrapper.
pub fn restore_script(selector: &str) -> String {
    format!(
        r#"(() => {{
  const source = document.querySelector({selector}) || document.body.firstElementChild;
  const saved = window.__vitaeCapture;
  if (source && saved) {{
    if (saved.style === null) source.removeAttribute('style');
    else source.setAttribute('style', saved.style);
  }}
  const wrapper = document.getElementById({wrapper_id});
  if (wrapper) wrapper.remove();
  delete window.__vitaeCapture;
  return true;
}})()"#,
        selector = js_string(selector),
        wrapper_id = js_string(CAPTURE_WRAPPER_ID),
    )
}

fn bounds_script() -> String {
    format!(
        r#"(() => {{
  const r = document.getElementById({card_id}).getBoundingClientRect();
  return {{ x: r.left + window.scrollX, y: r.top + window.scrollY, width: r.width, height: r.height }};
}})()"#,
        card_id = js_string(CAPTURE_CARD_ID),
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Pagination
// ────────────────────────────────────────────────────────────────────────────

/// One page's crop of the bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSlice {
    pub index: usize,
    pub offset_px: u32,
    pub height_px: u32,
}

/// Bitmap pixels that fit in one page's content box when the bitmap is scaled to
/// the content width.
pub fn content_height_px(bitmap_width_px: u32, page: &PageConfig) -> u32 {
    let ratio = page.content_height_mm() / page.content_width_mm();
    ((bitmap_width_px as f64 * ratio).floor() as u32).max(1)
}

/// Splits a bitmap of `bitmap_height` into `ceil(bitmap_height / content_height)` slices,
/// each starting `content_height` below the previous one.
pub fn paginate(bitmap_height: u32, content_height: u32) -> Vec<PageSlice> {
    let mut slices = Vec::new();
    if content_height == 0 {
        return slices;
    }
    let mut height_left = bitmap_height as i64;
    let mut offset_px = 0u32;
    while height_left > 0 {
        slices.push(PageSlice {
            index: slices.len(),
            offset_px,
            height_px: height_left.min(content_height as i64) as u32,
        });
        height_left -= content_height as i64;
        offset_px += content_height;
    }
    slices
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut out = RgbImage::from_pixel(rgba.width(), rgba.height(), Rgb([255, 255, 255]));
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let alpha = a as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

#[derive(Debug)]
pub struct PaginatedPdf {
    pub bytes: Vec<u8>,
    pub pages: usize,
}

/// Decodes the PNG, composites it onto white, and writes one PDF page per slice.
/// CPU-bound; run it on the blocking pool.
pub fn bitmap_to_pdf(png: &[u8], page: &PageConfig, title: &str) -> Result<PaginatedPdf, ExportError> {
    let decoded = image::load_from_memory(png)
        .map_err(|e| ExportError::Render(format!("captured bitmap is not a valid image: {e}")))?;
    let bitmap = flatten_onto_white(&decoded);
    let (width, height) = bitmap.dimensions();
    if width == 0 || height == 0 {
        return Err(ExportError::Render("captured bitmap is empty".to_string()));
    }

    let slices = paginate(height, content_height_px(width, page));
    let dpi = width as f64 / (page.content_width_mm() / 25.4);
    let page_width = Mm(page.width_mm as f32);
    let page_height = Mm(page.height_mm as f32);

    let (doc, first_page, first_layer) = PdfDocument::new(title, page_width, page_height, "Page 1");
    for slice in &slices {
        let layer = if slice.index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (p, l) = doc.add_page(page_width, page_height, format!("Page {}", slice.index + 1));
            doc.get_page(p).get_layer(l)
        };

        let crop = image::imageops::crop_imm(&bitmap, 0, slice.offset_px, width, slice.height_px).to_image();
        let slice_height_mm = slice.height_px as f64 / dpi * 25.4;

        Image::from_dynamic_image(&DynamicImage::ImageRgb8(crop)).add_to_layer(
            layer,
            ImageTransform {
                translate_x: Some(Mm(page.margin_mm as f32)),
                translate_y: Some(Mm((page.height_mm - page.margin_mm - slice_height_mm) as f32)),
                dpi: Some(dpi as f32),
                ..Default::default()
            },
        );
    }

    let bytes = doc
        .save_to_bytes()
        .map_err(|e| ExportError::Render(format!("failed to write PDF: {e}")))?;
    Ok(PaginatedPdf {
        bytes,
        pages: slices.len(),
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Backend
// ────────────────────────────────────────────────────────────────────────────

pub struct CanvasBackend {
    rasterizer: Arc<dyn Rasterizer>,
    page: PageConfig,
}

impl CanvasBackend {
    pub fn new(rasterizer: Arc<dyn Rasterizer>) -> Self {
        Self { rasterizer, page: A4 }
    }

    pub fn with_chrome(settings: BrowserSettings, target_selector: String) -> Self {
        Self::new(Arc::new(ChromeRasterizer::new(settings, target_selector)))
    }
}

#[async_trait]
impl RenderBackend for CanvasBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Canvas
    }

    async fn render(
        &self,
        document: &AssembledDocument,
        filename: &str,
    ) -> Result<PdfArtifact, ExportError> {
        debug!(css_bytes = document.css().len(), "Rasterizing assembled document");
        let png = self.rasterizer.rasterize(document).await?;
        debug!(bytes = png.len(), "Canvas snapshot captured");

        let page = self.page;
        let title = pdf_title(document, filename);
        let pdf = tokio::task::spawn_blocking(move || bitmap_to_pdf(&png, &page, &title))
            .await
            .map_err(|e| ExportError::Render(format!("pagination task failed: {e}")))??;

        info!(pages = pdf.pages, size = pdf.bytes.len(), "Canvas backend produced {filename}");
        Ok(PdfArtifact {
            filename: filename.to_string(),
            bytes: pdf.bytes,
        })
    }
}

/// The page `<title>`, or the filename stem when the title is blank.
fn pdf_title(document: &AssembledDocument, filename: &str) -> String {
    let title = document.head().title.trim();
    if title.is_empty() {
        filename.trim_end_matches(".pdf").to_string()
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::assembler::assemble;
    use crate::export::harvester::HeadMetadata;
    use crate::export::sanitizer::{SanitizeStrategy, SanitizedMarkup};
    use image::{Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ExportError> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), image::ImageOutputFormat::Png)
            .map_err(|e| ExportError::Render(format!("failed to encode PNG: {e}")))?;
        Ok(buf)
    }

    struct FakeRasterizer {
        width: u32,
        height: u32,
    }

    #[async_trait]
    impl Rasterizer for FakeRasterizer {
        async fn rasterize(&self, _document: &AssembledDocument) -> Result<Vec<u8>, ExportError> {
            let image = RgbaImage::from_pixel(self.width, self.height, Rgba([20, 40, 60, 255]));
            encode_png(&DynamicImage::ImageRgba8(image))
        }
    }

    struct FailingRasterizer;

    #[async_trait]
    impl Rasterizer for FailingRasterizer {
        async fn rasterize(&self, _document: &AssembledDocument) -> Result<Vec<u8>, ExportError> {
            Err(ExportError::Render("capture failed".to_string()))
        }
    }

    fn document() -> AssembledDocument {
        assemble(
            &HeadMetadata::default(),
            &SanitizedMarkup {
                html: "<div id=\"resume-preview\">Ada</div>".to_string(),
                strategy: SanitizeStrategy::OverrideStylesheet,
            },
            "",
        )
    }

    #[test]
    fn test_pdf_title_prefers_page_title() {
        assert_eq!(pdf_title(&document(), "Ada_Resume.pdf"), "Resume");

        let untitled = assemble(
            &HeadMetadata {
                title: "  ".to_string(),
                ..HeadMetadata::default()
            },
            &SanitizedMarkup {
                html: "<div id=\"resume-preview\">Ada</div>".to_string(),
                strategy: SanitizeStrategy::OverrideStylesheet,
            },
            "",
        );
        assert_eq!(pdf_title(&untitled, "Ada_Resume.pdf"), "Ada_Resume");
    }

    #[test]
    fn test_paginate_emits_ceil_pages() {
        let slices = paginate(1000, 300);
        assert_eq!(slices.len(), 4);
        let offsets: Vec<u32> = slices.iter().map(|s| s.offset_px).collect();
        assert_eq!(offsets, vec![0, 300, 600, 900]);
        let heights: Vec<u32> = slices.iter().map(|s| s.height_px).collect();
        assert_eq!(heights, vec![300, 300, 300, 100]);
    }

    #[test]
    fn test_paginate_exact_multiple() {
        let slices = paginate(900, 300);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices.last().unwrap().height_px, 300);
    }

    #[test]
    fn test_paginate_small_and_empty_bitmaps() {
        assert_eq!(paginate(1, 300).len(), 1);
        assert!(paginate(0, 300).is_empty());
        assert!(paginate(100, 0).is_empty());
    }

    #[test]
    fn test_paginate_matches_ceil_for_many_sizes() {
        for height in [1u32, 299, 300, 301, 2339, 5000] {
            for content in [1u32, 7, 300, 2338] {
                let slices = paginate(height, content);
                assert_eq!(slices.len() as u32, height.div_ceil(content));
                for (i, slice) in slices.iter().enumerate() {
                    assert_eq!(slice.offset_px, i as u32 * content);
                }
            }
        }
    }

    #[test]
    fn test_content_height_for_a4() {
        // 1588 px wide capture (794 css px at 2x) → 1588 × 277 / 190 = 2315.1
        assert_eq!(content_height_px(1588, &A4), 2315);
    }

    #[test]
    fn test_flatten_composites_transparency_onto_white() {
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        image.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(image));
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_bitmap_to_pdf_writes_one_page_per_slice() {
        let image = RgbaImage::from_pixel(200, 700, Rgba([255, 0, 0, 255]));
        let png = encode_png(&DynamicImage::ImageRgba8(image)).unwrap();
        // 200 × 277 / 190 = 291 px per page → ceil(700 / 291) = 3
        let pdf = bitmap_to_pdf(&png, &A4, "resume").unwrap();
        assert_eq!(pdf.pages, 3);
        assert!(pdf.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_bitmap_to_pdf_rejects_garbage() {
        let err = bitmap_to_pdf(b"not a png", &A4, "resume").unwrap_err();
        assert!(matches!(err, ExportError::Render(_)));
    }

    #[test]
    fn test_capture_script_snapshots_before_mutating() {
        let script = capture_script("#resume-preview", 794);
        let snapshot = script.find("window.__vitaeCapture = { style: source.getAttribute('style') }").unwrap();
        let first_mutation = script.find("set(source, 'width', '794px')").unwrap();
        assert!(snapshot < first_mutation);
        assert!(script.contains(r##"document.querySelector("#resume-preview")"##));
    }

    #[test]
    fn test_restore_script_reverts_style_and_removes_wrapper() {
        let script = restore_script("#resume-preview");
        assert!(script.contains("source.setAttribute('style', saved.style)"));
        assert!(script.contains("source.removeAttribute('style')"));
        assert!(script.contains(r#"document.getElementById("vitae-capture-page")"#));
        assert!(script.contains("wrapper.remove()"));
    }

    #[test]
    fn test_selector_is_escaped_in_scripts() {
        let script = capture_script(r#"div[data-x="a"]"#, 794);
        assert!(script.contains(r#"document.querySelector("div[data-x=\"a\"]")"#));
    }

    #[tokio::test]
    async fn test_render_paginates_rasterized_snapshot() {
        let backend = CanvasBackend::new(Arc::new(FakeRasterizer {
            width: 400,
            height: 1200,
        }));
        let artifact = backend.render(&document(), "cv.pdf").await.unwrap();
        assert_eq!(artifact.filename, "cv.pdf");
        assert!(artifact.bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_render_surfaces_rasterizer_failure() {
        let backend = CanvasBackend::new(Arc::new(FailingRasterizer));
        let err = backend.render(&document(), "cv.pdf").await.unwrap_err();
        assert_eq!(err.to_string(), "PDF rendering failed: capture failed");
    }
}
