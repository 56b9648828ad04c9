//! Data model shared by the extraction pipeline and its callers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Content type of HTML results produced by DOM extraction.
pub const CONTENT_TYPE_HTML: &str = "text/html";

/// Content type that ends the pipeline without further extraction.
pub const CONTENT_TYPE_PDF: &str = "application/pdf";

/// Partial extraction result threaded through the handler chain.
///
/// Merging never erases: a field is only replaced by a non-empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreHandleResult {
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_type: Option<String>,
}

impl PreHandleResult {
    /// Start an accumulator for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Default::default() }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Fold a handler's partial result into this accumulator.
    ///
    /// Returns `true` when the URL changed.
    pub fn merge(&mut self, other: PreHandleResult) -> bool {
        let url_changed = !other.url.is_empty() && other.url != self.url;
        if url_changed {
            self.url = other.url;
        }
        overwrite_if_present(&mut self.title, other.title);
        overwrite_if_present(&mut self.content, other.content);
        overwrite_if_present(&mut self.content_type, other.content_type);
        url_changed
    }

    /// Whether the accumulator carries non-blank content.
    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }

    /// Whether the content type is `application/pdf`, ignoring parameters.
    pub fn is_pdf(&self) -> bool {
        self.content_type.as_deref().is_some_and(is_pdf_content_type)
    }
}

fn overwrite_if_present(slot: &mut Option<String>, value: Option<String>) {
    if let Some(value) = value
        && !value.trim().is_empty()
    {
        *slot = Some(value);
    }
}

/// Compare a `Content-Type` header value against `application/pdf`.
pub fn is_pdf_content_type(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(CONTENT_TYPE_PDF))
}

/// Input of `fetch_content`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FetchContentInput {
    /// The URL, or free text containing a URL.
    pub url: String,

    /// Value for the `Accept-Language` header in the browser fallback.
    #[serde(default)]
    pub locale: Option<String>,

    /// IANA timezone the browser fallback emulates.
    #[serde(default)]
    pub timezone: Option<String>,

    /// Overall deadline in milliseconds; the configured budget when absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl FetchContentInput {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), ..Default::default() }
    }
}

/// Final result of `fetch_content`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedContentOutput {
    pub final_url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_type: Option<String>,
}

impl From<PreHandleResult> for ScrapedContentOutput {
    fn from(result: PreHandleResult) -> Self {
        Self { final_url: result.url, title: result.title, content: result.content, content_type: result.content_type }
    }
}

/// Quality metrics derived from extracted content. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentQualityMetrics {
    pub character_count: usize,
    pub paragraph_count: usize,
    pub link_density: f64,
    pub readability_score: f64,
    pub is_probably_readable: bool,
}
