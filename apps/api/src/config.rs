use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::export::backends::browser::{
    BrowserSettings, DEFAULT_GENERATION_TIMEOUT_SECS, DEFAULT_PAGE_LOAD_TIMEOUT_SECS,
    DEFAULT_SETTLE_DELAY_MS,
};
use crate::export::backends::external::{
    ExternalServiceSettings, PaperConfig, ServiceMode, StyleOptions, DEFAULT_HEALTH_TIMEOUT_SECS,
};
use crate::export::backends::BackendKind;
use crate::export::DEFAULT_TARGET_SELECTOR;

const DEFAULT_STYLESHEET_FETCH_TIMEOUT_SECS: u64 = 5;
const DEFAULT_EXTERNAL_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Application configuration loaded from environment variables.
/// Fails at startup if a variable is malformed or one the chosen backends need is missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub rust_log: String,
    pub data_dir: PathBuf,
    pub export_backend: BackendKind,
    pub fallback_backend: Option<BackendKind>,
    pub target_selector: String,
    pub stylesheet_fetch_timeout: Duration,
    pub browser: BrowserSettings,
    /// Present whenever `EXTERNAL_SERVICE_URL` is set.
    pub external_service: Option<ExternalServiceSettings>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key → value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let export_backend: BackendKind = parse_or(&get, "EXPORT_BACKEND", BackendKind::Headless)?;
        let fallback_backend = get("EXPORT_FALLBACK_BACKEND")
            .map(|v| {
                v.parse::<BackendKind>()
                    .map_err(anyhow::Error::msg)
                    .context("EXPORT_FALLBACK_BACKEND is invalid")
            })
            .transpose()?;
        if fallback_backend == Some(export_backend) {
            bail!("EXPORT_FALLBACK_BACKEND must differ from EXPORT_BACKEND ({export_backend})");
        }

        let browser = BrowserSettings {
            chrome_path: get("CHROME_PATH"),
            no_sandbox: parse_or(&get, "CHROME_NO_SANDBOX", false)?,
            page_load_timeout: Duration::from_secs(parse_or(
                &get,
                "PAGE_LOAD_TIMEOUT_SECS",
                DEFAULT_PAGE_LOAD_TIMEOUT_SECS,
            )?),
            generation_timeout: Duration::from_secs(parse_or(
                &get,
                "GENERATION_TIMEOUT_SECS",
                DEFAULT_GENERATION_TIMEOUT_SECS,
            )?),
            settle_delay: Duration::from_millis(parse_or(&get, "RENDER_SETTLE_MS", DEFAULT_SETTLE_DELAY_MS)?),
        };

        let needs_external = export_backend == BackendKind::External
            || fallback_backend == Some(BackendKind::External);
        let external_url = if needs_external {
            Some(require_env(&get, "EXTERNAL_SERVICE_URL")?)
        } else {
            get("EXTERNAL_SERVICE_URL")
        };
        let external_service = external_url
            .map(|base_url| -> Result<ExternalServiceSettings> {
                url::Url::parse(&base_url)
                    .with_context(|| format!("EXTERNAL_SERVICE_URL '{base_url}' is not a valid URL"))?;
                Ok(ExternalServiceSettings {
                    base_url,
                    mode: parse_or(&get, "EXTERNAL_SERVICE_MODE", ServiceMode::Detailed)?,
                    health_timeout: Duration::from_secs(DEFAULT_HEALTH_TIMEOUT_SECS),
                    request_timeout: Duration::from_secs(parse_or(
                        &get,
                        "EXTERNAL_SERVICE_TIMEOUT_SECS",
                        DEFAULT_EXTERNAL_REQUEST_TIMEOUT_SECS,
                    )?),
                    paper: PaperConfig::default(),
                    styles: StyleOptions::default(),
                })
            })
            .transpose()?;

        Ok(Config {
            port: parse_or(&get, "PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: get("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            data_dir: get("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            export_backend,
            fallback_backend,
            target_selector: get("EXPORT_TARGET_SELECTOR")
                .unwrap_or_else(|| DEFAULT_TARGET_SELECTOR.to_string()),
            stylesheet_fetch_timeout: Duration::from_secs(parse_or(
                &get,
                "STYLESHEET_FETCH_TIMEOUT_SECS",
                DEFAULT_STYLESHEET_FETCH_TIMEOUT_SECS,
            )?),
            browser,
            external_service,
        })
    }
}

fn require_env<F>(get: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn parse_or<F, T>(get: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{key}='{raw}' is invalid: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.rust_log, "info");
        assert_eq!(config.data_dir, PathBuf::from("./data"));
        assert_eq!(config.export_backend, BackendKind::Headless);
        assert_eq!(config.fallback_backend, None);
        assert_eq!(config.target_selector, "#resume-preview");
        assert_eq!(config.stylesheet_fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.browser.page_load_timeout, Duration::from_secs(10));
        assert_eq!(config.browser.generation_timeout, Duration::from_secs(20));
        assert_eq!(config.browser.settle_delay, Duration::from_millis(500));
        assert!(config.external_service.is_none());
    }

    #[test]
    fn test_external_backend_requires_url() {
        let err = config(&[("EXPORT_BACKEND", "external")]).unwrap_err();
        assert!(err.to_string().contains("EXTERNAL_SERVICE_URL"));

        let err = config(&[("EXPORT_FALLBACK_BACKEND", "external")]).unwrap_err();
        assert!(err.to_string().contains("EXTERNAL_SERVICE_URL"));
    }

    #[test]
    fn test_external_settings() {
        let config = config(&[
            ("EXPORT_BACKEND", "canvas"),
            ("EXPORT_FALLBACK_BACKEND", "external"),
            ("EXTERNAL_SERVICE_URL", "http://localhost:5000"),
            ("EXTERNAL_SERVICE_MODE", "raw"),
        ])
        .unwrap();
        assert_eq!(config.export_backend, BackendKind::Canvas);
        assert_eq!(config.fallback_backend, Some(BackendKind::External));
        let external = config.external_service.unwrap();
        assert_eq!(external.base_url, "http://localhost:5000");
        assert_eq!(external.mode, ServiceMode::Raw);
        assert_eq!(external.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(config(&[("PORT", "http")]).is_err());
        assert!(config(&[("EXPORT_BACKEND", "wkhtmltopdf")]).is_err());
        assert!(config(&[("CHROME_NO_SANDBOX", "maybe")]).is_err());
        assert!(config(&[("EXTERNAL_SERVICE_URL", "not a url")]).is_err());
        assert!(config(&[("EXPORT_FALLBACK_BACKEND", "headless")]).is_err());
    }

    #[test]
    fn test_browser_overrides() {
        let config = config(&[
            ("CHROME_PATH", "/usr/bin/chromium"),
            ("CHROME_NO_SANDBOX", "true"),
            ("GENERATION_TIMEOUT_SECS", "45"),
            ("RENDER_SETTLE_MS", "0"),
        ])
        .unwrap();
        assert_eq!(config.browser.chrome_path.as_deref(), Some("/usr/bin/chromium"));
        assert!(config.browser.no_sandbox);
        assert_eq!(config.browser.generation_timeout, Duration::from_secs(45));
        assert!(config.browser.settle_delay.is_zero());
    }
}
