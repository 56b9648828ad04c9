//! Configuration-driven site handler.
//!
//! Per-site behavior is data: which hosts, where the content lives, which
//! extra elements to drop, and an optional readiness selector. One
//! extraction routine serves every site.

use async_trait::async_trait;
use kuchikiki::NodeRef;
use tidyread_core::{CONTENT_TYPE_HTML, Error, PreHandleResult};
use url::Url;

use super::{HandleContext, Handler, HandlerConfig, HandlerPriority, host_matches};
use crate::extract::{clean, dom, title};

/// Default minimum text length for the longest-match strategy.
pub const DEFAULT_MIN_CONTENT_CHARS: usize = 100;

/// How the content element is located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentStrategy {
    /// Longest match above `min_chars`, else the body.
    Longest { min_chars: usize },
    /// Every match of every selector, concatenated.
    Union,
}

impl Default for ContentStrategy {
    fn default() -> Self {
        Self::Longest { min_chars: DEFAULT_MIN_CONTENT_CHARS }
    }
}

/// Description of one site.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub name: &'static str,
    pub priority: HandlerPriority,
    /// Host suffixes this site is served from.
    pub domains: &'static [&'static str],
    /// Extra applicability check on the URL, e.g. only question pages.
    pub url_filter: Option<fn(&Url) -> bool>,
    pub content_selectors: &'static [&'static str],
    pub strategy: ContentStrategy,
    /// Site chrome removed before content is located.
    pub remove: &'static [&'static str],
    /// Present only once the page has rendered its content. When missing the
    /// handler contributes a title but no content.
    pub ready_selector: Option<&'static str>,
    pub handler: HandlerConfig,
}

impl SiteConfig {
    pub fn new(name: &'static str, priority: HandlerPriority, domains: &'static [&'static str]) -> Self {
        Self {
            name,
            priority,
            domains,
            url_filter: None,
            content_selectors: &["article", "main"],
            strategy: ContentStrategy::default(),
            remove: &[],
            ready_selector: None,
            handler: HandlerConfig::default(),
        }
    }

    pub fn content(mut self, selectors: &'static [&'static str]) -> Self {
        self.content_selectors = selectors;
        self
    }

    pub fn union(mut self) -> Self {
        self.strategy = ContentStrategy::Union;
        self
    }

    pub fn remove(mut self, selectors: &'static [&'static str]) -> Self {
        self.remove = selectors;
        self
    }

    pub fn ready_when(mut self, selector: &'static str) -> Self {
        self.ready_selector = Some(selector);
        self
    }

    pub fn filter(mut self, filter: fn(&Url) -> bool) -> Self {
        self.url_filter = Some(filter);
        self
    }

    pub fn title(mut self, selectors: &[&str], strip_patterns: &[&str]) -> Self {
        self.handler.title = crate::extract::TitleExtractionConfig::new(selectors, strip_patterns);
        self
    }

    pub fn handler_config(mut self, handler: HandlerConfig) -> Self {
        self.handler = handler;
        self
    }
}

/// Handler running the shared extraction routine for one [`SiteConfig`].
#[derive(Debug, Clone)]
pub struct SiteHandler {
    config: SiteConfig,
    selectors: Vec<String>,
}

impl SiteHandler {
    pub fn new(config: SiteConfig) -> Self {
        let selectors = config.content_selectors.iter().map(|s| s.to_string()).collect();
        Self { config, selectors }
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }

    /// Run the DOM half of the handler on already-fetched HTML.
    pub fn extract(&self, html: &str, page_url: &Url) -> Result<PreHandleResult, Error> {
        let handler = &self.config.handler;
        let document = dom::build_document(html, &handler.dom)?;

        let host = page_url.host_str().unwrap_or_default();
        let title = if handler.cleaning.refine_title {
            handler.title.extract(&document, host)
        } else {
            title::extract_title(&document, &handler.title.selectors, &[])
        };

        let mut result = PreHandleResult::new(page_url.as_str());
        result.title = title;

        if let Some(ready) = self.config.ready_selector
            && document.select_first(ready).is_err()
        {
            tracing::debug!(handler = self.config.name, selector = ready, "content not ready in static HTML");
            return Ok(result);
        }

        for selector in self.config.remove {
            dom::detach_all(&document, selector);
        }

        let Some(located) = self.locate(&document) else {
            return Ok(result);
        };

        let ctx = clean::CleanContext::new(page_url.clone());
        let cleaned = clean::clean(located, &handler.cleaning, &ctx);
        let content = dom::content_html(&cleaned);

        Ok(result.with_content(content).with_content_type(CONTENT_TYPE_HTML))
    }

    fn locate(&self, document: &NodeRef) -> Option<NodeRef> {
        match self.config.strategy {
            ContentStrategy::Longest { min_chars } => dom::locate_longest(document, &self.selectors, min_chars),
            ContentStrategy::Union => dom::locate_union(document, &self.selectors),
        }
    }
}

#[async_trait]
impl Handler for SiteHandler {
    fn name(&self) -> &str {
        self.config.name
    }

    fn priority(&self) -> HandlerPriority {
        self.config.priority
    }

    fn can_handle(&self, url: &Url) -> bool {
        self.config.domains.iter().any(|domain| host_matches(url, domain))
            && self.config.url_filter.is_none_or(|filter| filter(url))
    }

    async fn handle(&self, url: &Url, ctx: &HandleContext<'_>) -> Result<Option<PreHandleResult>, Error> {
        let mut request = self.config.handler.http.clone();
        if request.user_agent.is_none() {
            request.user_agent = self.config.handler.dom.user_agent.clone();
        }

        let response = ctx.fetcher.fetch(url, &request, &ctx.deadline).await?;
        if !response.is_html() {
            let mut result = PreHandleResult::new(response.final_url.as_str());
            result.content_type = response.mime();
            return Ok(Some(result));
        }

        let result = self.extract(&response.text(), &response.final_url)?;
        tracing::debug!(
            handler = self.config.name,
            url = %response.final_url,
            content = result.has_content(),
            "site extraction finished"
        );
        Ok(Some(result))
    }
}
