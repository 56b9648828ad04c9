//! Content extraction.
//!
//! ### Readability
//! - Used for pages rendered by the headless browser, and by the generic
//!   fallback handler.
//! - Mozilla Readability port: scoring, best-candidate selection, cleanup.
//! - Behind the [`Extractor`] trait so the engine can be swapped.
//!
//! ### Per-site extraction
//! - [`dom`]: build a tree honoring a script policy, locate content by
//!   selector (longest match or union of fragments).
//! - [`clean`]: ordered cleaning stages folded over the located element.
//! - [`title`]: ordered title selectors with suffix stripping.
//!
//! ### Quality gate
//! - [`quality`]: deterministic scoring deciding browser escalation.

pub mod clean;
pub mod dom;
pub mod quality;
pub mod title;

pub use clean::{CleanContext, ContentCleaningConfig};
pub use dom::DomConfig;
pub use quality::{evaluate, should_use_browser};
pub use title::{TitleExtractionConfig, extract_title};

use readabilityrs::{Readability, ReadabilityOptions};
use tidyread_core::Error;
use url::Url;

/// Configuration for readability extraction.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Minimum character count for content (default: 500)
    pub char_threshold: Option<usize>,

    /// Maximum number of top candidates to consider (default: 5)
    pub max_top_candidates: Option<usize>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { char_threshold: Some(500), max_top_candidates: Some(5) }
    }
}

impl ExtractConfig {
    fn to_readability_options(&self) -> ReadabilityOptions {
        let mut builder = ReadabilityOptions::builder();
        if let Some(threshold) = self.char_threshold {
            builder = builder.char_threshold(threshold);
        }
        if let Some(max) = self.max_top_candidates {
            builder = builder.nb_top_candidates(max);
        }
        builder.build()
    }
}

/// Article body found by readability extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadableArticle {
    pub title: Option<String>,
    /// Article HTML
    pub content: String,
    /// Plain-text length of the article
    pub text_length: usize,
    pub excerpt: Option<String>,
}

/// Locates the primary article body within arbitrary markup.
///
/// Synchronous: implementations build their own tree and must not hold it
/// across an await point.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, base_url: &Url, config: &ExtractConfig) -> Result<ReadableArticle, Error>;
}

/// Readability-based extractor.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReadabilityExtractor;

impl ReadabilityExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for ReadabilityExtractor {
    fn extract(&self, html: &str, base_url: &Url, config: &ExtractConfig) -> Result<ReadableArticle, Error> {
        if html.trim().is_empty() {
            return Err(Error::ExtractFailed("empty document".into()));
        }

        let readability = Readability::new(html, Some(base_url.as_str()), Some(config.to_readability_options()))
            .map_err(|e| Error::DomConstruction(format!("failed to parse HTML: {}", e)))?;

        let article = readability
            .parse()
            .ok_or_else(|| Error::ExtractFailed("no article content found".into()))?;

        let content = article
            .content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| Error::ExtractFailed("article content is empty".into()))?;

        Ok(ReadableArticle {
            title: article.title.filter(|t| !t.trim().is_empty()),
            content,
            text_length: article.length,
            excerpt: article.excerpt,
        })
    }
}

/// Extract the article body with the default extractor and config.
pub fn extract_readable(html: &str, base_url: &Url) -> Result<ReadableArticle, Error> {
    ReadabilityExtractor::new().extract(html, base_url, &ExtractConfig::default())
}
