//! Extraction strategies.
//!
//! Every handler decides applicability from the URL alone and returns a
//! partial [`PreHandleResult`]. The [`registry`] runs them in priority order
//! and merges what they produce.
//!
//! | Priority | Handlers |
//! |---|---|
//! | file type | pdf, rss, video |
//! | platform | github, stackoverflow, wikipedia |
//! | newsletter | substack, medium, ghost, beehiiv, buttondown, hashnode, devto, mirror |
//! | url rewrite | social, news, domain |
//! | generic | readability over the fetched page |

pub mod file_type;
pub mod generic;
pub mod platforms;
pub mod registry;
pub mod rewrite;
pub mod site;

pub use file_type::{PdfHandler, RssHandler, VideoHandler};
pub use generic::GenericHandler;
pub use registry::{HandlerRegistry, MAX_RESTARTS};
pub use rewrite::{RewriteRule, UrlRewriteHandler};
pub use site::{ContentStrategy, SiteConfig, SiteHandler};

use async_trait::async_trait;
use tidyread_core::{Error, PreHandleResult};
use url::Url;

use crate::Deadline;
use crate::extract::{ContentCleaningConfig, DomConfig, Extractor, TitleExtractionConfig};
use crate::fetch::{HttpRequestConfig, PageFetcher};

/// Position of a handler in the chain. Lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandlerPriority {
    FileType,
    Platform,
    Newsletter,
    UrlRewrite,
    Generic,
}

/// Everything a handler needs to run once.
pub struct HandleContext<'a> {
    pub fetcher: &'a dyn PageFetcher,
    pub extractor: &'a dyn Extractor,
    pub deadline: Deadline,
}

/// Per-handler settings, built once with the handler.
#[derive(Debug, Clone, Default)]
pub struct HandlerConfig {
    pub http: HttpRequestConfig,
    pub dom: DomConfig,
    pub cleaning: ContentCleaningConfig,
    pub title: TitleExtractionConfig,
}

/// An extraction strategy.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    fn priority(&self) -> HandlerPriority;

    /// Whether this handler applies to `url`. Must not do I/O.
    fn can_handle(&self, url: &Url) -> bool;

    /// Whether a URL this handler returns is a rewrite of the input rather
    /// than where a fetch landed. Only rewrites restart the chain under
    /// [`RewritePolicy::Restart`](tidyread_core::RewritePolicy::Restart).
    fn rewrites_url(&self) -> bool {
        false
    }

    /// Produce a partial result for `url`.
    ///
    /// `Ok(None)` means the handler had nothing to add.
    async fn handle(&self, url: &Url, ctx: &HandleContext<'_>) -> Result<Option<PreHandleResult>, Error>;
}

/// Whether the host of `url` is `domain` or a subdomain of it.
pub fn host_matches(url: &Url, domain: &str) -> bool {
    url.host_str().is_some_and(|host| {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        host == domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// Lowercased path of `url`.
pub(crate) fn lower_path(url: &Url) -> String {
    url.path().to_ascii_lowercase()
}
