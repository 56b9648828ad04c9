//! Core types and shared functionality for tidyread.
//!
//! This crate provides:
//! - Unified error types
//! - Layered configuration
//! - The extraction data model
//! - Collaborator contracts (article store, URL safety)

pub mod collaborators;
pub mod config;
pub mod error;
pub mod types;

pub use collaborators::{ArticleStore, SaveOptions, UrlSafetyProvider};
pub use config::{AppConfig, BrowserSettings, ConfigError, QualityThresholds, RewritePolicy};
pub use error::Error;
pub use types::{
    CONTENT_TYPE_HTML, CONTENT_TYPE_PDF, ContentQualityMetrics, FetchContentInput, PreHandleResult,
    ScrapedContentOutput, is_pdf_content_type,
};
