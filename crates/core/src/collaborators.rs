//! Contracts of the services the pipeline consumes but does not implement.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, ScrapedContentOutput};

/// Options forwarded to the article store when saving scraped content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOptions {
    /// Destination folder, store default when absent.
    #[serde(default)]
    pub folder: Option<String>,
    /// Labels attached to the saved article.
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Persistence of scraped articles.
///
/// Failures are reported to the caller of `fetch_content_with_save` as
/// warnings only.
#[async_trait::async_trait]
pub trait ArticleStore: Send + Sync {
    async fn save_scraped_content(
        &self, user_id: &str, content: &ScrapedContentOutput, options: &SaveOptions,
    ) -> Result<(), Error>;
}

/// Third-party threat-intelligence lookup.
///
/// Implementations return `Error::UnsafeUrl` only on a positive match. Any
/// other error means the provider could not answer and the URL is let through.
#[async_trait::async_trait]
pub trait UrlSafetyProvider: Send + Sync {
    async fn check_url_safety(&self, url: &Url) -> Result<(), Error>;
}
