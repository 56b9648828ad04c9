//! Extraction pipeline for tidyread.
//!
//! This crate provides the URL guard, the guarded HTTP fetcher, the
//! quality-gated handler chain with its per-site strategies, DOM cleaning,
//! the headless browser fallback, and the [`Scraper`] that composes them.

pub mod deadline;
pub mod extract;
pub mod fetch;
pub mod handlers;
pub mod render;
pub mod scrape;

pub use deadline::Deadline;
pub use extract::{ExtractConfig, Extractor, ReadabilityExtractor, ReadableArticle, extract_readable};
pub use fetch::{FetchClient, FetchConfig, FetchResponse, HttpRequestConfig, PageFetcher, RedirectPolicy};
pub use handlers::{Handler, HandlerRegistry};
pub use render::{RenderOptions, RenderedPage, Renderer};
pub use scrape::Scraper;
