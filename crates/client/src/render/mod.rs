//! Headless browser fallback for JS-heavy pages.
//!
//! The renderer trait is always available; the chromiumoxide implementation
//! sits behind the `render` feature.
//!
//! ### Per-request lifecycle
//! - Acquire the shared browser from the supervisor (launched lazily,
//!   relaunched after a disconnect).
//! - Create an isolated browser context and a blank page in it.
//! - Configure: script execution per host, `Accept-Language`, timezone,
//!   request interception driven by [`network::NetworkPolicy`].
//! - Navigate under a hard timeout, wait for the DOM to settle, auto-scroll.
//! - Capture title, HTML, final URL and the document content type.
//! - Release the page and context on every exit path.

pub mod network;
pub mod scripts;

#[cfg(feature = "render")]
mod headless;

#[cfg(feature = "render")]
pub use headless::{BrowserLease, BrowserSupervisor, HeadlessRenderer};

use std::time::Duration;

use thiserror::Error;
use tidyread_core::{BrowserSettings, Error};
use url::Url;

use crate::Deadline;

/// Errors that can occur during page rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to launch or connect to browser.
    #[error("browser launch failed: {0}")]
    BrowserLaunch(String),

    /// Failed to set up the browsing context or page.
    #[error("page setup failed: {0}")]
    Setup(String),

    /// Failed to navigate to URL.
    #[error("navigation failed: {0}")]
    Navigation(String),

    /// Failed to get page content.
    #[error("content retrieval failed: {0}")]
    ContentRetrieval(String),

    /// Timeout waiting for page to load.
    #[error("render timeout after {0}ms")]
    Timeout(u64),

    /// Browser closed unexpectedly.
    #[error("browser closed unexpectedly")]
    BrowserClosed,
}

impl From<RenderError> for Error {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Timeout(_) => Error::Timeout(e.to_string()),
            other => Error::RenderFailed(other.to_string()),
        }
    }
}

/// Options for rendering a page.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Sent as `Accept-Language`.
    pub locale: Option<String>,

    /// IANA timezone to emulate.
    pub timezone: Option<String>,

    /// Navigation timeout (default: 30s).
    pub navigation_timeout: Duration,

    /// Quiet period that ends the settle wait (default: 1s).
    pub settle_debounce: Duration,

    /// Hard ceiling of the settle wait (default: 5s).
    pub settle_ceiling: Duration,

    /// Time box of the auto-scroll (default: 3s).
    pub scroll_timeout: Duration,

    /// Hosts (suffix match) rendered with JavaScript disabled.
    pub script_disabled_hosts: Vec<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::from(&BrowserSettings::default())
    }
}

impl From<&BrowserSettings> for RenderOptions {
    fn from(settings: &BrowserSettings) -> Self {
        Self {
            locale: None,
            timezone: None,
            navigation_timeout: settings.navigation_timeout(),
            settle_debounce: Duration::from_millis(settings.settle_debounce_ms),
            settle_ceiling: Duration::from_millis(settings.settle_ceiling_ms),
            scroll_timeout: Duration::from_millis(settings.scroll_timeout_ms),
            script_disabled_hosts: settings.script_disabled_hosts.clone(),
        }
    }
}

impl RenderOptions {
    pub fn with_locale(mut self, locale: Option<String>) -> Self {
        self.locale = locale.filter(|l| !l.trim().is_empty());
        self
    }

    pub fn with_timezone(mut self, timezone: Option<String>) -> Self {
        self.timezone = timezone.filter(|t| !t.trim().is_empty());
        self
    }

    /// Whether JavaScript stays off for `url`.
    pub fn scripts_disabled_for(&self, url: &Url) -> bool {
        url.host_str().is_some_and(|host| {
            let host = host.to_ascii_lowercase();
            self.script_disabled_hosts.iter().any(|domain| {
                let domain = domain.to_ascii_lowercase();
                host == domain || host.ends_with(&format!(".{domain}"))
            })
        })
    }
}

/// Result of rendering a page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Rendered HTML content.
    pub html: String,

    /// `document.title`, when non-empty.
    pub title: Option<String>,

    /// Final URL after redirects.
    pub final_url: Url,

    /// Content type of the main document response.
    pub content_type: String,

    /// Time taken to render in milliseconds.
    pub render_time_ms: u64,
}

/// Renders a URL in a real browser.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    /// Render `url` under `deadline`. The browsing context is released
    /// before this returns, and also when the future is dropped.
    async fn render(&self, url: &Url, opts: &RenderOptions, deadline: &Deadline) -> Result<RenderedPage, Error>;
}
