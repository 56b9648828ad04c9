//! `fetch_content`: the public entry point of the extraction pipeline.
//!
//! Guard the input, run the handler chain, and escalate to the headless
//! browser only when the chain did not produce readable content.

use std::sync::Arc;
use std::time::Duration;

use tidyread_core::{
    AppConfig, ArticleStore, Error, FetchContentInput, PreHandleResult, SaveOptions, ScrapedContentOutput,
    UrlSafetyProvider, is_pdf_content_type,
};
use url::Url;

use crate::Deadline;
use crate::extract::{Extractor, ExtractConfig, ReadabilityExtractor, quality};
use crate::fetch::{FetchClient, FetchConfig, PageFetcher, guard_url, normalize};
use crate::handlers::{HandleContext, HandlerRegistry};
use crate::render::{RenderOptions, RenderedPage, Renderer};

/// Composes fetcher, handler chain and renderer. Cheap to share behind an
/// `Arc`; every call to [`fetch_content`](Self::fetch_content) is independent.
pub struct Scraper {
    fetcher: Arc<dyn PageFetcher>,
    extractor: Arc<dyn Extractor>,
    registry: Arc<HandlerRegistry>,
    renderer: Option<Arc<dyn Renderer>>,
    safety: Option<Arc<dyn UrlSafetyProvider>>,
    config: AppConfig,
    render_options: RenderOptions,
    #[cfg(feature = "render")]
    supervisor: Option<Arc<crate::render::BrowserSupervisor>>,
}

impl Scraper {
    /// A scraper without renderer or safety provider.
    pub fn new(fetcher: Arc<dyn PageFetcher>, registry: HandlerRegistry, config: AppConfig) -> Self {
        let render_options = RenderOptions::from(&config.browser);
        Self {
            fetcher,
            extractor: Arc::new(ReadabilityExtractor::new()),
            registry: Arc::new(registry),
            renderer: None,
            safety: None,
            config,
            render_options,
            #[cfg(feature = "render")]
            supervisor: None,
        }
    }

    /// The production wiring: HTTP fetcher, the full handler catalogue and,
    /// when compiled in and enabled, the headless renderer.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let fetcher = FetchClient::new(FetchConfig::from(config))?;
        let scraper = Self::new(Arc::new(fetcher), HandlerRegistry::with_defaults(config), config.clone());

        #[cfg(feature = "render")]
        if config.render_enabled {
            use crate::render::{BrowserSupervisor, HeadlessRenderer};

            let supervisor = Arc::new(BrowserSupervisor::new(config.browser.clone()));
            let renderer = HeadlessRenderer::new(supervisor.clone());
            let mut scraper = scraper.with_renderer(Arc::new(renderer));
            scraper.supervisor = Some(supervisor);
            return Ok(scraper);
        }

        Ok(scraper)
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_safety_provider(mut self, provider: Arc<dyn UrlSafetyProvider>) -> Self {
        self.safety = Some(provider);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Fetch `input.url` and return its readable content.
    ///
    /// # Errors
    ///
    /// Only before any page I/O: `InvalidUrl` for malformed or blocked
    /// input, `InvalidInput` for a zero timeout, `UnsafeUrl` when the safety
    /// provider flags the URL. Past that point the result is best effort and
    /// may lack content.
    pub async fn fetch_content(&self, input: &FetchContentInput) -> Result<ScrapedContentOutput, Error> {
        let budget = match input.timeout_ms {
            Some(0) => return Err(Error::InvalidInput("timeout_ms must be positive".into())),
            Some(ms) => Duration::from_millis(ms),
            None => self.config.request_budget(),
        };
        let url = self.admit(input).await?;
        let deadline = Deadline::after(budget);
        let started = std::time::Instant::now();

        let ctx = HandleContext { fetcher: self.fetcher.as_ref(), extractor: self.extractor.as_ref(), deadline };
        let mut acc = self.registry.execute(&url, &ctx).await;

        if acc.is_pdf() {
            tracing::debug!(url = %acc.url, "pdf result, skipping extraction");
            return Ok(acc.into());
        }

        if let Some(content) = acc.content.as_deref()
            && !quality::should_use_browser(&quality::evaluate(content, None, &self.config.quality))
        {
            tracing::debug!(url = %acc.url, elapsed_ms = started.elapsed().as_millis() as u64, "chain result accepted");
            return Ok(acc.into());
        }

        self.escalate(&mut acc, input, &deadline).await;
        tracing::debug!(url = %acc.url, elapsed_ms = started.elapsed().as_millis() as u64, "fetch_content finished");
        Ok(acc.into())
    }

    /// [`fetch_content`](Self::fetch_content), then hand the result to
    /// `store`. A store failure is logged and the result returned anyway.
    pub async fn fetch_content_with_save(
        &self, input: &FetchContentInput, user_id: &str, options: &SaveOptions, store: &dyn ArticleStore,
    ) -> Result<ScrapedContentOutput, Error> {
        let output = self.fetch_content(input).await?;
        if let Err(e) = store.save_scraped_content(user_id, &output, options).await {
            tracing::warn!(user_id, url = %output.final_url, error = %e, "failed to save scraped content");
        }
        Ok(output)
    }

    /// Stop the shared browser, if one was started.
    pub async fn shutdown(&self) {
        #[cfg(feature = "render")]
        if let Some(supervisor) = &self.supervisor {
            supervisor.shutdown().await;
        }
    }

    /// Normalize, guard and safety-check the input. No page I/O happens here.
    async fn admit(&self, input: &FetchContentInput) -> Result<Url, Error> {
        let url = normalize(&input.url).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        guard_url(&url).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        if let Some(safety) = &self.safety {
            match safety.check_url_safety(&url).await {
                Ok(()) => {}
                Err(e @ Error::UnsafeUrl(_)) => return Err(e),
                Err(e) => tracing::warn!(url = %url, error = %e, "url safety check unavailable, continuing"),
            }
        }
        Ok(url)
    }

    /// Replace the chain result with a browser rendering, keeping the chain
    /// result when rendering is unavailable or fails.
    async fn escalate(&self, acc: &mut PreHandleResult, input: &FetchContentInput, deadline: &Deadline) {
        let Some(renderer) = self.renderer.as_ref().filter(|_| self.config.render_enabled) else {
            tracing::debug!(url = %acc.url, "browser fallback unavailable");
            return;
        };
        let Ok(target) = Url::parse(&acc.url) else {
            tracing::warn!(url = %acc.url, "unparsable url after handler chain");
            return;
        };

        tracing::info!(url = %target, has_content = acc.has_content(), "escalating to headless browser");
        let options = self
            .render_options
            .clone()
            .with_locale(input.locale.clone())
            .with_timezone(input.timezone.clone());

        let page = match renderer.render(&target, &options, deadline).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(url = %target, error = %e, "browser fallback failed");
                return;
            }
        };

        if let Err(e) = guard_url(&page.final_url) {
            tracing::warn!(url = %target, final_url = %page.final_url, error = %e, "discarding render of blocked final url");
            return;
        }

        let rendered = self.rendered_result(page);
        if rendered.is_pdf() {
            // The browser's content type wins, so chain HTML no longer applies.
            acc.content = None;
        }
        acc.merge(rendered);
    }

    fn rendered_result(&self, page: RenderedPage) -> PreHandleResult {
        let mut result = PreHandleResult::new(page.final_url.as_str()).with_content_type(page.content_type.as_str());
        if let Some(title) = page.title {
            result = result.with_title(title);
        }
        if is_pdf_content_type(&page.content_type) {
            return result;
        }

        match self.extractor.extract(&page.html, &page.final_url, &ExtractConfig::default()) {
            Ok(article) => {
                tracing::debug!(
                    url = %page.final_url,
                    text_length = article.text_length,
                    render_ms = page.render_time_ms,
                    "readability on rendered page"
                );
                if result.title.is_none()
                    && let Some(title) = article.title
                {
                    result = result.with_title(title);
                }
                result.with_content(article.content)
            }
            Err(e) => {
                tracing::warn!(url = %page.final_url, error = %e, "no article in rendered page");
                result
            }
        }
    }
}
