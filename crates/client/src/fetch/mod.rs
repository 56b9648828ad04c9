//! HTTP fetch pipeline with SSRF protection.
//!
//! ### URL Normalization
//! - Pick the first `http(s)://` URL out of free text
//! - Lowercase host, remove fragments and tracking parameters
//!
//! ### SSRF & Safety Gates
//! - Deny private ranges (RFC1918, link-local, localhost, etc.)
//! - Resolve DNS and validate all A/AAAA answers are public (configurable).
//! - Every redirect hop and the final URL pass the same guard, and every
//!   connection goes through [`PublicResolver`] so hops are DNS-checked too.
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable), enforced while streaming
//!
//! ### Deadlines
//! - Each request runs under the shorter of its own timeout and the
//!   request-wide [`Deadline`].

pub mod ssrf;
pub mod url;

use std::error::Error as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::Url;
use reqwest::{Client, StatusCode, header};

pub use ssrf::{
    PublicResolver, SsrfError, ensure_public_host, guard_url, is_private_or_reserved, public_answers, validate_ip,
};
pub use url::{UrlError, normalize, strip_tracking_params};

use crate::Deadline;
use tidyread_core::{AppConfig, Error};

const DEFAULT_ACCEPT: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Default user agent string (default: "tidyread/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Upper bound of any request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Whether to resolve hosts and reject private answers (default: true)
    pub resolve_dns: bool,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "tidyread/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            resolve_dns: true,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: config.max_redirects,
            resolve_dns: config.resolve_dns,
        }
    }
}

/// Whether a request follows redirects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectPolicy {
    /// Follow up to the client's redirect limit, guarding every hop.
    #[default]
    Follow,
    /// Treat any redirect response as a failure.
    None,
}

/// Per-handler HTTP request settings.
#[derive(Debug, Clone)]
pub struct HttpRequestConfig {
    /// Overrides the client's default user agent.
    pub user_agent: Option<String>,
    pub timeout: Duration,
    pub headers: Vec<(String, String)>,
    pub redirect: RedirectPolicy,
}

impl Default for HttpRequestConfig {
    fn default() -> Self {
        Self {
            user_agent: None,
            timeout: Duration::from_secs(15),
            headers: Vec::new(),
            redirect: RedirectPolicy::Follow,
        }
    }
}

impl HttpRequestConfig {
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The original URL requested
    pub url: Url,
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    /// Lowercased MIME essence of the Content-Type, without parameters.
    pub fn mime(&self) -> Option<String> {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
    }

    /// Whether the body should be parsed as HTML. A missing Content-Type counts as HTML.
    pub fn is_html(&self) -> bool {
        match self.mime() {
            None => true,
            Some(m) => m == "text/html" || m == "application/xhtml+xml" || m == "text/plain",
        }
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Something that can fetch a page over plain HTTP.
#[async_trait::async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url` with the given request settings under `deadline`.
    async fn fetch(&self, url: &Url, request: &HttpRequestConfig, deadline: &Deadline) -> Result<FetchResponse, Error>;
}

/// HTTP fetch client with safety checks.
pub struct FetchClient {
    follow: Client,
    manual: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let max_redirects = config.max_redirects;
        let guarded = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > max_redirects {
                return attempt.error(format!("too many redirects (max {max_redirects})"));
            }
            match guard_url(attempt.url()) {
                Ok(()) => attempt.follow(),
                Err(e) => attempt.error(e),
            }
        });

        let follow = Self::builder(&config)
            .redirect(guarded)
            .build()
            .map_err(|e| Error::NetworkFailure(format!("failed to build HTTP client: {}", e)))?;
        let manual = Self::builder(&config)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| Error::NetworkFailure(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { follow, manual, config })
    }

    fn builder(config: &FetchConfig) -> reqwest::ClientBuilder {
        let builder = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);
        if config.resolve_dns { builder.dns_resolver(Arc::new(PublicResolver)) } else { builder }
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn fetch_inner(&self, url: &Url, request: &HttpRequestConfig, timeout: Duration) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        if self.config.resolve_dns {
            ensure_public_host(url).await.map_err(|e| match e {
                SsrfError::DnsError(msg) => Error::NetworkFailure(msg),
                other => Error::InvalidUrl(other.to_string()),
            })?;
        } else {
            guard_url(url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        }

        let client = match request.redirect {
            RedirectPolicy::Follow => &self.follow,
            RedirectPolicy::None => &self.manual,
        };

        let mut builder = client
            .get(url.as_str())
            .timeout(timeout)
            .header(header::ACCEPT, DEFAULT_ACCEPT);
        if let Some(ua) = &request.user_agent {
            builder = builder.header(header::USER_AGENT, ua.as_str());
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::NetworkFailure(format!("status {}", status.as_u16())));
        }

        let final_url = response.url().clone();
        guard_url(&final_url).map_err(|e| Error::InvalidUrl(format!("redirected to blocked target: {e}")))?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::TooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_reqwest_error)? {
            if body.len() + chunk.len() > self.config.max_bytes {
                return Err(Error::TooLarge(format!("body exceeds {} bytes", self.config.max_bytes)));
            }
            body.extend_from_slice(&chunk);
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("fetched {} -> {} in {}ms ({} bytes)", url, final_url, fetch_ms, body.len());

        Ok(FetchResponse { url: url.clone(), final_url, status, content_type, bytes: Bytes::from(body), fetch_ms })
    }
}

#[async_trait::async_trait]
impl PageFetcher for FetchClient {
    async fn fetch(&self, url: &Url, request: &HttpRequestConfig, deadline: &Deadline) -> Result<FetchResponse, Error> {
        let timeout = deadline.cap(request.timeout.min(self.config.timeout));
        deadline
            .run(timeout, "fetch", self.fetch_inner(url, request, timeout))
            .await
    }
}

fn map_reqwest_error(e: reqwest::Error) -> Error {
    let mut source = e.source();
    while let Some(inner) = source {
        if let Some(ssrf) = inner.downcast_ref::<SsrfError>() {
            return match ssrf {
                SsrfError::DnsError(msg) => Error::NetworkFailure(msg.clone()),
                blocked => Error::InvalidUrl(format!("blocked address: {blocked}")),
            };
        }
        source = inner.source();
    }

    if e.is_timeout() {
        Error::Timeout(format!("fetch: {e}"))
    } else if e.is_redirect() {
        Error::InvalidUrl(format!("redirect rejected: {e}"))
    } else {
        Error::NetworkFailure(format!("network error: {e}"))
    }
}
