//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TIDYREAD_*)
//! 2. TOML config file (if TIDYREAD_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TIDYREAD_*, nested keys split on `__`)
/// 2. TOML config file (if TIDYREAD_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// User-Agent string for plain HTTP requests.
    ///
    /// Set via TIDYREAD_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via TIDYREAD_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Plain HTTP request timeout in milliseconds.
    ///
    /// Set via TIDYREAD_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum number of redirects a plain fetch follows.
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,

    /// Resolve hostnames before fetching and reject private answers.
    #[serde(default = "default_true")]
    pub resolve_dns: bool,

    /// Total deadline for one `fetch_content` call in milliseconds.
    ///
    /// Set via TIDYREAD_REQUEST_BUDGET_MS environment variable.
    #[serde(default = "default_request_budget_ms")]
    pub request_budget_ms: u64,

    /// Whether the headless browser fallback is enabled.
    ///
    /// Set via TIDYREAD_RENDER_ENABLED environment variable.
    #[serde(default = "default_true")]
    pub render_enabled: bool,

    /// Quality gate thresholds.
    #[serde(default)]
    pub quality: QualityThresholds,

    /// Headless browser settings.
    #[serde(default)]
    pub browser: BrowserSettings,

    /// What the handler chain does after a handler rewrites the URL.
    #[serde(default)]
    pub rewrite_policy: RewritePolicy,
}

/// Thresholds of the content quality gate.
///
/// Content is probably readable only when every threshold is met.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    pub min_characters: usize,
    pub min_text_length: usize,
    pub min_readability_score: f64,
    pub min_paragraphs: usize,
    pub max_link_density: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_characters: 500,
            min_text_length: 140,
            min_readability_score: 20.0,
            min_paragraphs: 3,
            max_link_density: 0.2,
        }
    }
}

/// Headless browser settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Hard timeout for page navigation.
    pub navigation_timeout_ms: u64,
    /// Quiet window the DOM must stay unmutated for.
    pub settle_debounce_ms: u64,
    /// Absolute ceiling of the DOM-settle wait.
    pub settle_ceiling_ms: u64,
    /// Time box for auto-scrolling lazy content into view.
    pub scroll_timeout_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Chrome/Chromium binary; auto-detected when unset.
    pub executable: Option<PathBuf>,
    /// Hosts (suffix match) that get script execution disabled.
    pub script_disabled_hosts: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            navigation_timeout_ms: 30_000,
            settle_debounce_ms: 1_000,
            settle_ceiling_ms: 5_000,
            scroll_timeout_ms: 3_000,
            viewport_width: 1280,
            viewport_height: 720,
            executable: None,
            script_disabled_hosts: vec![
                "nytimes.com".into(),
                "wsj.com".into(),
                "bloomberg.com".into(),
                "researchgate.net".into(),
                "sciencedirect.com".into(),
            ],
        }
    }
}

impl BrowserSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

/// Chain behavior after a handler returns a different URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewritePolicy {
    /// Keep going with the remaining handlers, tested against the new URL.
    #[default]
    Continue,
    /// Start over from the first handler with the new URL.
    Restart,
}

fn default_user_agent() -> String {
    "tidyread/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_redirects() -> usize {
    5
}

fn default_request_budget_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            max_redirects: default_max_redirects(),
            resolve_dns: true,
            request_budget_ms: default_request_budget_ms(),
            render_enabled: true,
            quality: QualityThresholds::default(),
            browser: BrowserSettings::default(),
            rewrite_policy: RewritePolicy::default(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Request budget as Duration.
    pub fn request_budget(&self) -> Duration {
        Duration::from_millis(self.request_budget_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TIDYREAD_`
    /// 2. TOML file from `TIDYREAD_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TIDYREAD_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TIDYREAD_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
