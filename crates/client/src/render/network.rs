//! Request interception policy for the headless browser.
//!
//! Pure decision logic: the browser layer maps protocol events onto
//! [`InterceptedRequest`] and applies the [`Verdict`].

use url::Url;

use crate::fetch::guard_url;

/// Main-document content types the browser may load.
pub const ALLOWED_DOCUMENT_TYPES: &[&str] = &["text/html", "text/plain", "application/octet-stream", "application/pdf"];

/// Font file extensions blocked regardless of the reported resource type.
const FONT_EXTENSIONS: &[&str] = &[".woff2", ".woff", ".ttf", ".otf", ".eot"];

/// Ad and tracking hosts (suffix match).
pub const BLOCKED_TRACKER_HOSTS: &[&str] = &[
    "doubleclick.net",
    "googlesyndication.com",
    "googletagmanager.com",
    "googletagservices.com",
    "google-analytics.com",
    "adservice.google.com",
    "amazon-adsystem.com",
    "scorecardresearch.com",
    "quantserve.com",
    "taboola.com",
    "outbrain.com",
    "criteo.com",
    "criteo.net",
    "adnxs.com",
    "moatads.com",
    "chartbeat.com",
    "hotjar.com",
    "segment.io",
    "facebook.net",
    "connect.facebook.net",
];

/// Resource type reported by the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Document,
    Stylesheet,
    Image,
    Media,
    Font,
    Script,
    Xhr,
    Other,
}

/// Where in its lifetime a request was paused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptStage {
    /// Before the request is sent.
    Request,
    /// Headers received; `content_type` is the raw header value.
    Response { content_type: Option<String> },
}

#[derive(Debug, Clone)]
pub struct InterceptedRequest<'a> {
    pub url: &'a str,
    pub kind: ResourceKind,
    pub stage: InterceptStage,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Fails the SSRF guard.
    UnsafeUrl,
    Font,
    Tracker,
    /// Main document with a content type outside the allow-list.
    ContentType(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Block(BlockReason),
}

/// Decides which requests the browser may make.
#[derive(Debug, Clone)]
pub struct NetworkPolicy {
    blocked_hosts: Vec<String>,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self { blocked_hosts: BLOCKED_TRACKER_HOSTS.iter().map(|h| h.to_string()).collect() }
    }
}

impl NetworkPolicy {
    pub fn with_blocked_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.push(host.into().to_ascii_lowercase());
        self
    }

    pub fn decide(&self, request: &InterceptedRequest<'_>) -> Verdict {
        match &request.stage {
            InterceptStage::Request => self.decide_request(request),
            InterceptStage::Response { content_type } => match request.kind {
                ResourceKind::Document => decide_document_type(content_type.as_deref()),
                _ => Verdict::Continue,
            },
        }
    }

    fn decide_request(&self, request: &InterceptedRequest<'_>) -> Verdict {
        let Ok(url) = Url::parse(request.url) else {
            return Verdict::Block(BlockReason::UnsafeUrl);
        };
        if matches!(url.scheme(), "data" | "blob") {
            return Verdict::Continue;
        }
        if guard_url(&url).is_err() {
            return Verdict::Block(BlockReason::UnsafeUrl);
        }

        let path = url.path().to_ascii_lowercase();
        if request.kind == ResourceKind::Font || FONT_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) {
            return Verdict::Block(BlockReason::Font);
        }

        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let tracker = self
            .blocked_hosts
            .iter()
            .any(|blocked| host == *blocked || host.ends_with(&format!(".{blocked}")));
        if tracker {
            return Verdict::Block(BlockReason::Tracker);
        }

        Verdict::Continue
    }
}

/// A missing header is allowed; the browser sniffs it as HTML.
fn decide_document_type(content_type: Option<&str>) -> Verdict {
    let Some(mime) = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .filter(|m| !m.is_empty())
    else {
        return Verdict::Continue;
    };
    if ALLOWED_DOCUMENT_TYPES.contains(&mime.as_str()) {
        Verdict::Continue
    } else {
        Verdict::Block(BlockReason::ContentType(mime))
    }
}
