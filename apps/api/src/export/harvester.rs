//! Style Harvester — collects every active stylesheet of a page snapshot into one CSS string.
//!
//! Linked sheets are fetched over HTTP and come first, inline `<style>` blocks follow,
//! each group in DOM order. A sheet that cannot be fetched is logged and skipped; the
//! result is a best-effort superset of the page's styling.

use std::time::Duration;

use futures_util::future::join_all;
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

// ────────────────────────────────────────────────────────────────────────────
// Page scan (sync — `scraper::Html` must not be held across an await)
// ────────────────────────────────────────────────────────────────────────────

/// `<head>` metadata carried over into the assembled document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadMetadata {
    pub charset: String,
    pub viewport: String,
    pub title: String,
}

impl Default for HeadMetadata {
    fn default() -> Self {
        Self {
            charset: "utf-8".to_string(),
            viewport: "width=device-width, initial-scale=1.0".to_string(),
            title: "Resume".to_string(),
        }
    }
}

/// Everything the harvester needs from the page, extracted in one parse.
#[derive(Debug, Clone, Default)]
pub struct StyleSources {
    pub head: HeadMetadata,
    /// Resolved `<link rel="stylesheet">` URLs in DOM order.
    pub linked: Vec<Url>,
    /// Literal `<style>` contents in DOM order.
    pub inline: Vec<String>,
}

/// Parses the page snapshot and lists its style sources.
///
/// Relative hrefs are resolved against `base_url`; hrefs that cannot be resolved to an
/// http(s) URL are dropped with a debug log.
pub fn scan_page(page_html: &str, base_url: Option<&Url>) -> StyleSources {
    let doc = Html::parse_document(page_html);

    let mut head = HeadMetadata::default();
    if let Some(charset) = select_attr(&doc, "meta[charset]", "charset") {
        head.charset = charset;
    }
    if let Some(viewport) = select_attr(&doc, r#"meta[name="viewport"]"#, "content") {
        head.viewport = viewport;
    }
    if let Some(title) = Selector::parse("title")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
    {
        head.title = title;
    }

    let linked = Selector::parse(r#"link[rel~="stylesheet"]"#)
        .map(|sel| {
            doc.select(&sel)
                .filter_map(|link| link.value().attr("href"))
                .filter_map(|href| resolve_stylesheet_url(href, base_url))
                .collect()
        })
        .unwrap_or_default();

    let inline = Selector::parse("style")
        .map(|sel| {
            doc.select(&sel)
                .map(|style| style.text().collect::<String>())
                .filter(|css| !css.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    StyleSources {
        head,
        linked,
        inline,
    }
}

fn select_attr(doc: &Html, selector: &str, attr: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    doc.select(&sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resolve_stylesheet_url(href: &str, base_url: Option<&Url>) -> Option<Url> {
    let href = href.trim();
    let resolved = match Url::parse(href) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base_url?.join(href).ok()?,
        Err(e) => {
            debug!("Ignoring unparseable stylesheet href '{href}': {e}");
            return None;
        }
    };
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        other => {
            debug!("Ignoring stylesheet with unsupported scheme '{other}': {href}");
            None
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Harvesting
// ────────────────────────────────────────────────────────────────────────────

/// Concatenated CSS plus counters for logging.
#[derive(Debug, Clone, Default)]
pub struct HarvestedStyles {
    pub css: String,
    pub linked_fetched: usize,
    pub linked_skipped: usize,
    pub inline_blocks: usize,
}

#[derive(Clone)]
pub struct StyleHarvester {
    client: reqwest::Client,
}

impl StyleHarvester {
    pub fn new(fetch_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .connect_timeout(fetch_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Fetches every linked sheet concurrently and concatenates them (DOM order)
    /// ahead of the inline blocks. Never fails.
    pub async fn harvest(&self, sources: &StyleSources) -> HarvestedStyles {
        let fetched = join_all(sources.linked.iter().map(|url| self.fetch_sheet(url))).await;

        let mut harvested = HarvestedStyles::default();
        for (url, result) in sources.linked.iter().zip(fetched) {
            match result {
                Ok(css) => {
                    harvested.css.push_str(&format!("/* {url} */\n"));
                    harvested.css.push_str(&css);
                    harvested.css.push('\n');
                    harvested.linked_fetched += 1;
                }
                Err(e) => {
                    warn!("Skipping stylesheet {url}: {e}");
                    harvested.linked_skipped += 1;
                }
            }
        }

        for css in &sources.inline {
            harvested.css.push_str(css);
            harvested.css.push('\n');
            harvested.inline_blocks += 1;
        }

        debug!(
            fetched = harvested.linked_fetched,
            skipped = harvested.linked_skipped,
            inline = harvested.inline_blocks,
            bytes = harvested.css.len(),
            "Harvested page styles"
        );
        harvested
    }

    async fn fetch_sheet(&self, url: &Url) -> Result<String, reqwest::Error> {
        self.client
            .get(url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn harvester() -> StyleHarvester {
        StyleHarvester::new(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_scan_collects_head_metadata() {
        let html = r#"<html><head><meta charset="UTF-8"><meta name="viewport" content="width=1024"><title> My CV </title></head><body></body></html>"#;
        let sources = scan_page(html, None);
        assert_eq!(sources.head.charset, "UTF-8");
        assert_eq!(sources.head.viewport, "width=1024");
        assert_eq!(sources.head.title, "My CV");
    }

    #[test]
    fn test_scan_defaults_head_metadata() {
        let sources = scan_page("<html><body><p>x</p></body></html>", None);
        assert_eq!(sources.head, HeadMetadata::default());
    }

    #[test]
    fn test_scan_resolves_relative_links_against_base() {
        let base = Url::parse("http://localhost:3000/editor/").unwrap();
        let html = r#"<html><head>
            <link rel="stylesheet" href="/assets/app.css">
            <link rel="preload stylesheet" href="theme.css">
            <link rel="icon" href="/favicon.ico">
            <link rel="stylesheet" href="data:text/css,body{}">
        </head><body></body></html>"#;
        let sources = scan_page(html, Some(&base));
        let urls: Vec<String> = sources.linked.iter().map(|u| u.to_string()).collect();
        assert_eq!(
            urls,
            vec![
                "http://localhost:3000/assets/app.css",
                "http://localhost:3000/editor/theme.css",
            ]
        );
    }

    #[test]
    fn test_scan_drops_relative_links_without_base() {
        let html = r#"<html><head><link rel="stylesheet" href="/app.css"></head></html>"#;
        assert!(scan_page(html, None).linked.is_empty());
    }

    #[test]
    fn test_scan_keeps_inline_styles_in_dom_order() {
        let html = r#"<html><head><style>.a{color:red}</style></head>
            <body><style>.b{color:blue}</style><style>   </style></body></html>"#;
        let sources = scan_page(html, None);
        assert_eq!(sources.inline, vec![".a{color:red}", ".b{color:blue}"]);
    }

    #[tokio::test]
    async fn test_harvest_puts_linked_sheets_before_inline() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/one.css"))
            .respond_with(ResponseTemplate::new(200).set_body_string(".one{margin:0}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/two.css"))
            .respond_with(ResponseTemplate::new(200).set_body_string(".two{margin:1px}"))
            .mount(&server)
            .await;

        let base = Url::parse(&server.uri()).unwrap();
        let html = r#"<html><head><style>.inline{padding:0}</style>
            <link rel="stylesheet" href="/one.css"><link rel="stylesheet" href="/two.css">
            </head><body></body></html>"#;
        let sources = scan_page(html, Some(&base));
        let harvested = harvester().harvest(&sources).await;

        let one = harvested.css.find(".one{margin:0}").unwrap();
        let two = harvested.css.find(".two{margin:1px}").unwrap();
        let inline = harvested.css.find(".inline{padding:0}").unwrap();
        assert!(one < two && two < inline);
        assert_eq!(harvested.linked_fetched, 2);
        assert_eq!(harvested.inline_blocks, 1);
    }

    #[tokio::test]
    async fn test_harvest_skips_failed_sheets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ok.css"))
            .respond_with(ResponseTemplate::new(200).set_body_string(".ok{}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/missing.css"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let sources = StyleSources {
            head: HeadMetadata::default(),
            linked: vec![
                Url::parse(&format!("{}/missing.css", server.uri())).unwrap(),
                Url::parse("http://127.0.0.1:9/unreachable.css").unwrap(),
                Url::parse(&format!("{}/ok.css", server.uri())).unwrap(),
            ],
            inline: vec![],
        };
        let harvested = harvester().harvest(&sources).await;

        assert!(harvested.css.contains(".ok{}"));
        assert_eq!(harvested.linked_fetched, 1);
        assert_eq!(harvested.linked_skipped, 2);
    }
}
