//! Handler registry and chain executor.

use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tidyread_core::{AppConfig, PreHandleResult, QualityThresholds, RewritePolicy};
use url::Url;

use super::file_type::{PdfHandler, RssHandler, VideoHandler};
use super::generic::GenericHandler;
use super::platforms::{newsletter_handlers, platform_handlers};
use super::rewrite::UrlRewriteHandler;
use super::{HandleContext, Handler};
use crate::extract::{ExtractConfig, quality};
use crate::fetch::HttpRequestConfig;

/// Upper bound on chain restarts under [`RewritePolicy::Restart`].
pub const MAX_RESTARTS: usize = 3;

/// Ordered handlers plus the fallback that applies to everything.
///
/// Built once and shared read-only between requests.
pub struct HandlerRegistry {
    handlers: Vec<Box<dyn Handler>>,
    fallback: Box<dyn Handler>,
    quality: QualityThresholds,
    rewrite_policy: RewritePolicy,
}

impl HandlerRegistry {
    /// An empty chain in front of `fallback`.
    pub fn new(fallback: Box<dyn Handler>, quality: QualityThresholds, rewrite_policy: RewritePolicy) -> Self {
        Self { handlers: Vec::new(), fallback, quality, rewrite_policy }
    }

    /// The full handler catalogue.
    pub fn with_defaults(config: &AppConfig) -> Self {
        let request = HttpRequestConfig::default().with_timeout(config.timeout());
        let fallback = GenericHandler::new(request, ExtractConfig::default());
        let mut registry = Self::new(Box::new(fallback), config.quality.clone(), config.rewrite_policy);

        registry.register(Box::new(PdfHandler));
        registry.register(Box::new(RssHandler));
        registry.register(Box::new(VideoHandler));
        for handler in platform_handlers().into_iter().chain(newsletter_handlers()) {
            registry.register(Box::new(handler));
        }
        registry.register(Box::new(UrlRewriteHandler::social()));
        registry.register(Box::new(UrlRewriteHandler::news()));
        registry.register(Box::new(UrlRewriteHandler::domain()));
        registry
    }

    /// Add a handler. Order within a priority is registration order.
    pub fn register(&mut self, handler: Box<dyn Handler>) {
        self.handlers.push(handler);
        self.handlers.sort_by_key(|h| h.priority());
    }

    /// All handlers in execution order, fallback last.
    pub fn handlers(&self) -> impl Iterator<Item = &dyn Handler> {
        self.handlers
            .iter()
            .map(|h| h.as_ref())
            .chain(std::iter::once(self.fallback.as_ref()))
    }

    /// The first handler applicable to `url`; the fallback when none is.
    pub fn resolve(&self, url: &Url) -> &dyn Handler {
        self.handlers
            .iter()
            .map(|h| h.as_ref())
            .find(|h| h.can_handle(url))
            .unwrap_or(self.fallback.as_ref())
    }

    pub fn rewrite_policy(&self) -> RewritePolicy {
        self.rewrite_policy
    }

    /// Run the chain for `url`.
    ///
    /// Never fails: a handler error or panic is logged and skipped, and when
    /// no handler produces readable content the best accumulator so far is
    /// returned, possibly without content. Stops early on readable content
    /// or a PDF content type.
    pub async fn execute(&self, url: &Url, ctx: &HandleContext<'_>) -> PreHandleResult {
        let mut acc = PreHandleResult::new(url.as_str());
        let mut current = url.clone();
        let mut restarts = 0;

        'chain: loop {
            for handler in self.handlers() {
                if ctx.deadline.is_expired() {
                    tracing::warn!(url = %current, "request deadline reached inside the handler chain");
                    return acc;
                }
                if !handler.can_handle(&current) {
                    continue;
                }

                let name = handler.name();
                let outcome = AssertUnwindSafe(handler.handle(&current, ctx)).catch_unwind().await;
                let partial = match outcome {
                    Ok(Ok(Some(partial))) => partial,
                    Ok(Ok(None)) => {
                        tracing::debug!(handler = name, url = %current, "handler contributed nothing");
                        continue;
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(handler = name, url = %current, error = %e, "handler failed");
                        continue;
                    }
                    Err(_) => {
                        tracing::warn!(handler = name, url = %current, "handler panicked");
                        continue;
                    }
                };

                let produced_content = partial.has_content();
                let url_changed = acc.merge(partial);

                if acc.is_pdf() {
                    tracing::debug!(handler = name, url = %acc.url, "pdf content type ends the chain");
                    return acc;
                }

                if produced_content && let Some(content) = acc.content.as_deref() {
                    let metrics = quality::evaluate(content, None, &self.quality);
                    tracing::debug!(
                        handler = name,
                        characters = metrics.character_count,
                        paragraphs = metrics.paragraph_count,
                        readable = metrics.is_probably_readable,
                        "quality gate"
                    );
                    if metrics.is_probably_readable {
                        return acc;
                    }
                }

                if url_changed {
                    match Url::parse(&acc.url) {
                        Ok(next) => current = next,
                        Err(e) => {
                            tracing::warn!(handler = name, url = %acc.url, error = %e, "handler returned an unparsable url");
                            acc.url = current.to_string();
                            continue;
                        }
                    }
                    // A redirect reported by a fetching handler only moves the URL forward.
                    let restart = handler.rewrites_url() && self.rewrite_policy == RewritePolicy::Restart;
                    if restart && restarts < MAX_RESTARTS {
                        restarts += 1;
                        tracing::debug!(handler = name, url = %current, restarts, "restarting chain");
                        continue 'chain;
                    }
                }
            }
            return acc;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tidyread_core::{CONTENT_TYPE_PDF, Error};

    use super::*;
    use crate::Deadline;
    use crate::extract::ReadabilityExtractor;
    use crate::fetch::{FetchResponse, PageFetcher};
    use crate::handlers::HandlerPriority;

    struct NoFetch;

    #[async_trait]
    impl PageFetcher for NoFetch {
        async fn fetch(&self, url: &Url, _: &HttpRequestConfig, _: &Deadline) -> Result<FetchResponse, Error> {
            Err(Error::NetworkFailure(format!("offline: {url}")))
        }
    }

    enum Behavior {
        Fail,
        Panic,
        Nothing,
        Content(String),
        Redirected(&'static str, String),
        Rewrite(&'static str),
        ContentType(&'static str),
    }

    struct Scripted {
        name: &'static str,
        priority: HandlerPriority,
        host: Option<&'static str>,
        behavior: Behavior,
        calls: Arc<AtomicUsize>,
        seen: Arc<std::sync::Mutex<Vec<String>>>,
    }

    impl Scripted {
        fn new(name: &'static str, priority: HandlerPriority, behavior: Behavior) -> Self {
            Self {
                name,
                priority,
                host: None,
                behavior,
                calls: Arc::new(AtomicUsize::new(0)),
                seen: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }

        fn on_host(mut self, host: &'static str) -> Self {
            self.host = Some(host);
            self
        }
    }

    #[async_trait]
    impl Handler for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> HandlerPriority {
            self.priority
        }

        fn can_handle(&self, url: &Url) -> bool {
            self.host.is_none_or(|host| url.host_str() == Some(host))
        }

        fn rewrites_url(&self) -> bool {
            matches!(self.behavior, Behavior::Rewrite(_))
        }

        async fn handle(&self, url: &Url, _ctx: &HandleContext<'_>) -> Result<Option<PreHandleResult>, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(url.to_string());
            match &self.behavior {
                Behavior::Fail => Err(Error::NetworkFailure("boom".into())),
                Behavior::Panic => panic!("handler bug"),
                Behavior::Nothing => Ok(None),
                Behavior::Content(html) => Ok(Some(PreHandleResult::new(url.as_str()).with_content(html.clone()))),
                Behavior::Redirected(to, html) => Ok(Some(PreHandleResult::new(*to).with_content(html.clone()))),
                Behavior::Rewrite(to) => Ok(Some(PreHandleResult::new(*to))),
                Behavior::ContentType(ct) => Ok(Some(PreHandleResult::new(url.as_str()).with_content_type(*ct))),
            }
        }
    }

    fn readable() -> String {
        (0..8)
            .map(|i| format!("<p>Paragraph {i} carries enough readable prose to pass every threshold of the gate.</p>"))
            .collect()
    }

    fn registry(policy: RewritePolicy) -> HandlerRegistry {
        HandlerRegistry::new(
            Box::new(Scripted::new("fallback", HandlerPriority::Generic, Behavior::Nothing)),
            QualityThresholds::default(),
            policy,
        )
    }

    fn ctx(fetcher: &NoFetch) -> HandleContext<'_> {
        HandleContext { fetcher, extractor: &ReadabilityExtractor, deadline: Deadline::none() }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_resolve_is_total() {
        let registry = HandlerRegistry::with_defaults(&AppConfig::default());
        for u in [
            "https://example.com/plain-article",
            "https://site.example/whitepaper.pdf",
            "https://github.com/rust-lang/rust",
            "https://www.reddit.com/r/rust/",
            "http://10-0-0-1.nip.io/",
        ] {
            let _ = registry.resolve(&url(u)).name();
        }
        assert_eq!(registry.resolve(&url("https://example.com/plain-article")).name(), "generic");
        assert_eq!(registry.resolve(&url("https://site.example/whitepaper.pdf")).name(), "pdf");
        assert_eq!(registry.resolve(&url("https://github.com/rust-lang/rust")).name(), "github");
        assert_eq!(registry.resolve(&url("https://www.reddit.com/r/rust/")).name(), "social");
    }

    #[test]
    fn test_handlers_sorted_by_priority() {
        let registry = HandlerRegistry::with_defaults(&AppConfig::default());
        let priorities: Vec<_> = registry.handlers().map(|h| h.priority()).collect();
        let mut sorted = priorities.clone();
        sorted.sort();
        assert_eq!(priorities, sorted);
        assert_eq!(registry.handlers().last().map(|h| h.name().to_string()).as_deref(), Some("generic"));
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_do_not_stop_the_chain() {
        let mut registry = registry(RewritePolicy::Continue);
        let last = Scripted::new("good", HandlerPriority::Newsletter, Behavior::Content(readable()));
        let last_calls = last.calls.clone();
        registry.register(Box::new(Scripted::new("fails", HandlerPriority::FileType, Behavior::Fail)));
        registry.register(Box::new(Scripted::new("panics", HandlerPriority::Platform, Behavior::Panic)));
        registry.register(Box::new(last));

        let fetcher = NoFetch;
        let result = registry.execute(&url("https://example.com/a"), &ctx(&fetcher)).await;
        assert_eq!(last_calls.load(Ordering::SeqCst), 1);
        assert!(result.has_content());
    }

    #[tokio::test]
    async fn test_readable_content_short_circuits() {
        let mut registry = registry(RewritePolicy::Continue);
        let later = Scripted::new("later", HandlerPriority::UrlRewrite, Behavior::Content("<p>x</p>".into()));
        let later_calls = later.calls.clone();
        registry.register(Box::new(Scripted::new("first", HandlerPriority::Platform, Behavior::Content(readable()))));
        registry.register(Box::new(later));

        let fetcher = NoFetch;
        let result = registry.execute(&url("https://example.com/a"), &ctx(&fetcher)).await;
        assert_eq!(later_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.content, Some(readable()));
    }

    #[tokio::test]
    async fn test_unreadable_content_is_kept_and_chain_continues() {
        let mut registry = registry(RewritePolicy::Continue);
        let next = Scripted::new("next", HandlerPriority::UrlRewrite, Behavior::Nothing);
        let next_calls = next.calls.clone();
        registry.register(Box::new(Scripted::new("thin", HandlerPriority::Platform, Behavior::Content("<p>Loading</p>".into()))));
        registry.register(Box::new(next));

        let fetcher = NoFetch;
        let result = registry.execute(&url("https://example.com/a"), &ctx(&fetcher)).await;
        assert_eq!(next_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.content.as_deref(), Some("<p>Loading</p>"));
    }

    #[tokio::test]
    async fn test_pdf_content_type_is_terminal() {
        let mut registry = registry(RewritePolicy::Continue);
        let after = Scripted::new("after", HandlerPriority::Platform, Behavior::Content(readable()));
        let after_calls = after.calls.clone();
        registry.register(Box::new(Scripted::new("pdf", HandlerPriority::FileType, Behavior::ContentType(CONTENT_TYPE_PDF))));
        registry.register(Box::new(after));

        let fetcher = NoFetch;
        let result = registry.execute(&url("https://site.example/whitepaper.pdf"), &ctx(&fetcher)).await;
        assert!(result.is_pdf());
        assert!(result.content.is_none());
        assert_eq!(after_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rewrite_continue_runs_remaining_handlers_with_new_url() {
        let mut registry = registry(RewritePolicy::Continue);
        let platform = Scripted::new("platform", HandlerPriority::Platform, Behavior::Nothing).on_host("new.example");
        let platform_calls = platform.calls.clone();
        let tail = Scripted::new("tail", HandlerPriority::UrlRewrite, Behavior::Nothing);
        let tail_seen = tail.seen.clone();
        registry.register(Box::new(
            Scripted::new("rewrite", HandlerPriority::Newsletter, Behavior::Rewrite("https://new.example/a")).on_host("old.example"),
        ));
        registry.register(Box::new(platform));
        registry.register(Box::new(tail));

        let fetcher = NoFetch;
        let result = registry.execute(&url("https://old.example/a"), &ctx(&fetcher)).await;
        assert_eq!(result.url, "https://new.example/a");
        assert_eq!(platform_calls.load(Ordering::SeqCst), 0);
        assert_eq!(tail_seen.lock().unwrap().as_slice(), ["https://new.example/a".to_string()]);
    }

    #[tokio::test]
    async fn test_rewrite_restart_reruns_earlier_handlers() {
        let mut registry = registry(RewritePolicy::Restart);
        let platform = Scripted::new("platform", HandlerPriority::Platform, Behavior::Content(readable())).on_host("new.example");
        let platform_calls = platform.calls.clone();
        registry.register(Box::new(
            Scripted::new("rewrite", HandlerPriority::Newsletter, Behavior::Rewrite("https://new.example/a")).on_host("old.example"),
        ));
        registry.register(Box::new(platform));

        let fetcher = NoFetch;
        let result = registry.execute(&url("https://old.example/a"), &ctx(&fetcher)).await;
        assert_eq!(platform_calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.url, "https://new.example/a");
        assert!(result.has_content());
    }

    #[tokio::test]
    async fn test_redirect_under_restart_policy_fetches_once() {
        let mut registry = registry(RewritePolicy::Restart);
        let fetching = Scripted::new(
            "fetching",
            HandlerPriority::Platform,
            Behavior::Redirected("https://example.com/post?session=1", "<p>Loading</p>".into()),
        );
        let calls = fetching.calls.clone();
        let tail = Scripted::new("tail", HandlerPriority::UrlRewrite, Behavior::Nothing);
        let tail_seen = tail.seen.clone();
        registry.register(Box::new(fetching));
        registry.register(Box::new(tail));

        let fetcher = NoFetch;
        let result = registry.execute(&url("https://example.com/post"), &ctx(&fetcher)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.url, "https://example.com/post?session=1");
        assert_eq!(tail_seen.lock().unwrap().as_slice(), ["https://example.com/post?session=1".to_string()]);
    }

    #[tokio::test]
    async fn test_restarts_are_bounded() {
        let mut registry = registry(RewritePolicy::Restart);
        let flip = Scripted::new("flip", HandlerPriority::UrlRewrite, Behavior::Rewrite("https://b.example/"));
        let flip_calls = flip.calls.clone();
        let flop = Scripted::new("flop", HandlerPriority::UrlRewrite, Behavior::Rewrite("https://a.example/"));
        registry.register(Box::new(flip));
        registry.register(Box::new(flop));

        let fetcher = NoFetch;
        let _ = registry.execute(&url("https://a.example/"), &ctx(&fetcher)).await;
        assert_eq!(flip_calls.load(Ordering::SeqCst), MAX_RESTARTS + 1);
    }

    #[tokio::test]
    async fn test_expired_deadline_returns_accumulator() {
        let mut registry = registry(RewritePolicy::Continue);
        let handler = Scripted::new("never", HandlerPriority::Platform, Behavior::Content(readable()));
        let calls = handler.calls.clone();
        registry.register(Box::new(handler));

        let fetcher = NoFetch;
        let ctx = HandleContext {
            fetcher: &fetcher,
            extractor: &ReadabilityExtractor,
            deadline: Deadline::after(std::time::Duration::ZERO),
        };
        let result = registry.execute(&url("https://example.com/a"), &ctx).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.url, "https://example.com/a");
    }
}
