//! End-to-end scenarios of `Scraper::fetch_content` over in-memory fakes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use tidyread_client::{
    Deadline, ExtractConfig, Extractor, FetchResponse, HandlerRegistry, HttpRequestConfig, PageFetcher, ReadableArticle,
    RenderOptions, RenderedPage, Renderer, Scraper,
};
use tidyread_core::{
    AppConfig, ArticleStore, Error, FetchContentInput, RewritePolicy, SaveOptions, ScrapedContentOutput,
    UrlSafetyProvider,
};
use url::Url;

const SENTENCE: &str = "The committee met on a quiet Tuesday morning to review the proposal in detail, \
     weighing the costs of the new bridge against the long term benefits for the town and its residents.";

fn article_page(title: &str) -> String {
    let paragraphs: String = (0..8).map(|i| format!("<p>{i}. {SENTENCE}</p>\n")).collect();
    format!(
        "<!DOCTYPE html><html><head><title>{title}</title></head><body>\
         <nav><a href=\"/\">Home</a></nav>\
         <article><h1>{title}</h1>{paragraphs}</article>\
         <footer>Copyright</footer></body></html>"
    )
}

const SPA_SHELL: &str = "<!DOCTYPE html><html><head><title>App</title></head>\
     <body><div id=\"root\">Loading...</div><script src=\"/bundle.js\"></script></body></html>";

#[derive(Default)]
struct CountingFetcher {
    pages: HashMap<String, (&'static str, String)>,
    redirects: HashMap<String, String>,
    requested: Mutex<Vec<String>>,
}

impl CountingFetcher {
    fn with_page(mut self, url: &str, content_type: &'static str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), (content_type, body.into()));
        self
    }

    /// Serve the page at `from` as if the server redirected to `to`.
    fn redirecting(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    fn calls(&self) -> usize {
        self.requested.lock().unwrap().len()
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for CountingFetcher {
    async fn fetch(&self, url: &Url, _request: &HttpRequestConfig, _deadline: &Deadline) -> Result<FetchResponse, Error> {
        self.requested.lock().unwrap().push(url.to_string());
        let (content_type, body) = self
            .pages
            .get(url.as_str())
            .ok_or_else(|| Error::NetworkFailure(format!("status 404 for {url}")))?;
        let final_url = match self.redirects.get(url.as_str()) {
            Some(to) => Url::parse(to).unwrap(),
            None => url.clone(),
        };
        Ok(FetchResponse {
            url: url.clone(),
            final_url,
            status: StatusCode::OK,
            content_type: Some(content_type.to_string()),
            bytes: Bytes::from(body.clone()),
            fetch_ms: 1,
        })
    }
}

struct CountingRenderer {
    html: String,
    final_url: Option<&'static str>,
    title: Option<&'static str>,
    content_type: &'static str,
    calls: AtomicUsize,
    locale: Mutex<Option<String>>,
}

impl CountingRenderer {
    fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            final_url: None,
            title: Some("Rendered title"),
            content_type: "text/html",
            calls: AtomicUsize::new(0),
            locale: Mutex::new(None),
        }
    }

    fn landing_on(mut self, final_url: &'static str) -> Self {
        self.final_url = Some(final_url);
        self
    }

    fn untitled(mut self) -> Self {
        self.title = None;
        self
    }

    fn serving(mut self, content_type: &'static str) -> Self {
        self.content_type = content_type;
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for CountingRenderer {
    async fn render(&self, url: &Url, opts: &RenderOptions, _deadline: &Deadline) -> Result<RenderedPage, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.locale.lock().unwrap() = opts.locale.clone();
        let final_url = match self.final_url {
            Some(u) => Url::parse(u).unwrap(),
            None => url.clone(),
        };
        Ok(RenderedPage {
            html: self.html.clone(),
            title: self.title.map(str::to_string),
            final_url,
            content_type: self.content_type.into(),
            render_time_ms: 5,
        })
    }
}

/// Titles the static shell and nothing else, so only the chain can supply a title.
struct ShellTitleExtractor;

impl Extractor for ShellTitleExtractor {
    fn extract(&self, html: &str, _base_url: &Url, _config: &ExtractConfig) -> Result<ReadableArticle, Error> {
        let title = html.contains("Loading...").then(|| "Chain title".to_string());
        Ok(ReadableArticle { title, content: html.to_string(), text_length: html.len(), excerpt: None })
    }
}

struct FailingStore {
    calls: AtomicUsize,
}

#[async_trait]
impl ArticleStore for FailingStore {
    async fn save_scraped_content(
        &self, _user_id: &str, _content: &ScrapedContentOutput, _options: &SaveOptions,
    ) -> Result<(), Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::Persistence("database is gone".into()))
    }
}

struct SafetyStub(fn() -> Result<(), Error>);

#[async_trait]
impl UrlSafetyProvider for SafetyStub {
    async fn check_url_safety(&self, _url: &Url) -> Result<(), Error> {
        (self.0)()
    }
}

fn scraper(fetcher: &Arc<CountingFetcher>, config: AppConfig) -> Scraper {
    let registry = HandlerRegistry::with_defaults(&config);
    Scraper::new(fetcher.clone(), registry, config)
}

#[tokio::test]
async fn plain_article_is_served_by_the_chain() {
    let url = "https://example.com/plain-article";
    let fetcher = Arc::new(CountingFetcher::default().with_page(url, "text/html; charset=utf-8", article_page("Bridge")));
    let renderer = Arc::new(CountingRenderer::new(article_page("Unused")));
    let scraper = scraper(&fetcher, AppConfig::default()).with_renderer(renderer.clone());

    let output = scraper.fetch_content(&FetchContentInput::new(url)).await.unwrap();

    assert_eq!(output.final_url, url);
    assert_eq!(output.content_type.as_deref(), Some("text/html"));
    assert!(output.content.as_deref().unwrap().contains("quiet Tuesday morning"));
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn spa_shell_escalates_to_the_browser() {
    let url = "https://spa-heavy-site.example/post";
    let fetcher = Arc::new(CountingFetcher::default().with_page(url, "text/html", SPA_SHELL));
    let renderer = Arc::new(CountingRenderer::new(article_page("Hydrated")));
    let scraper = scraper(&fetcher, AppConfig::default()).with_renderer(renderer.clone());

    let input = FetchContentInput { locale: Some("de-DE".into()), ..FetchContentInput::new(url) };
    let output = scraper.fetch_content(&input).await.unwrap();

    assert_eq!(renderer.calls(), 1);
    assert!(output.content.as_deref().unwrap().contains("quiet Tuesday morning"));
    assert_eq!(output.title.as_deref(), Some("Rendered title"));
    assert_eq!(output.final_url, url);
    assert_eq!(renderer.locale.lock().unwrap().as_deref(), Some("de-DE"));
}

#[tokio::test]
async fn pdf_ends_the_pipeline_without_io() {
    let fetcher = Arc::new(CountingFetcher::default());
    let renderer = Arc::new(CountingRenderer::new(article_page("Unused")));
    let scraper = scraper(&fetcher, AppConfig::default()).with_renderer(renderer.clone());

    let output = scraper
        .fetch_content(&FetchContentInput::new("https://site.example/whitepaper.pdf"))
        .await
        .unwrap();

    assert_eq!(output.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(output.content, None);
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn invalid_input_fails_before_any_io() {
    let fetcher = Arc::new(CountingFetcher::default());
    let renderer = Arc::new(CountingRenderer::new(article_page("Unused")));
    let scraper = scraper(&fetcher, AppConfig::default()).with_renderer(renderer.clone());

    for input in [
        "not a url",
        "",
        "ftp://example.com/file",
        "http://localhost/a",
        "http://10.0.0.5/a",
        "http://192.168.1.1/a",
        "http://0.0.0.0/",
    ] {
        let err = scraper.fetch_content(&FetchContentInput::new(input)).await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)), "{input}: {err}");
    }
    assert_eq!(fetcher.calls(), 0);
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn zero_timeout_is_rejected() {
    let fetcher = Arc::new(CountingFetcher::default());
    let scraper = scraper(&fetcher, AppConfig::default());
    let input = FetchContentInput { timeout_ms: Some(0), ..FetchContentInput::new("https://example.com/") };

    let err = scraper.fetch_content(&input).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn render_landing_on_private_address_is_discarded() {
    let url = "https://spa-heavy-site.example/post";
    let fetcher = Arc::new(CountingFetcher::default().with_page(url, "text/html", SPA_SHELL));
    let renderer = Arc::new(CountingRenderer::new(article_page("Internal")).landing_on("http://127.0.0.1/admin"));
    let scraper = scraper(&fetcher, AppConfig::default()).with_renderer(renderer.clone());

    let output = scraper.fetch_content(&FetchContentInput::new(url)).await.unwrap();

    assert_eq!(renderer.calls(), 1);
    assert_eq!(output.final_url, url);
    assert!(!output.content.as_deref().unwrap_or_default().contains("quiet Tuesday morning"));
}

#[tokio::test]
async fn disabled_rendering_returns_the_chain_result() {
    let url = "https://spa-heavy-site.example/post";
    let fetcher = Arc::new(CountingFetcher::default().with_page(url, "text/html", SPA_SHELL));
    let renderer = Arc::new(CountingRenderer::new(article_page("Unused")));
    let config = AppConfig { render_enabled: false, ..AppConfig::default() };
    let scraper = scraper(&fetcher, config).with_renderer(renderer.clone());

    let output = scraper.fetch_content(&FetchContentInput::new(url)).await.unwrap();

    assert_eq!(renderer.calls(), 0);
    assert_eq!(output.final_url, url);
    assert_eq!(output.content_type.as_deref(), Some("text/html"));
}

#[tokio::test]
async fn unreachable_pages_still_return_a_result() {
    let fetcher = Arc::new(CountingFetcher::default());
    let scraper = scraper(&fetcher, AppConfig::default());

    let output = scraper
        .fetch_content(&FetchContentInput::new("see https://example.com/missing?utm_source=x for details"))
        .await
        .unwrap();

    assert_eq!(output, ScrapedContentOutput { final_url: "https://example.com/missing".into(), ..Default::default() });
    assert_eq!(fetcher.requested(), vec!["https://example.com/missing".to_string()]);
}

#[tokio::test]
async fn persistence_failure_is_swallowed() {
    let url = "https://example.com/plain-article";
    let fetcher = Arc::new(CountingFetcher::default().with_page(url, "text/html", article_page("Bridge")));
    let scraper = scraper(&fetcher, AppConfig::default());
    let store = FailingStore { calls: AtomicUsize::new(0) };

    let output = scraper
        .fetch_content_with_save(&FetchContentInput::new(url), "user-1", &SaveOptions::default(), &store)
        .await
        .unwrap();

    assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    assert!(output.content.is_some());
}

#[tokio::test]
async fn flagged_urls_fail_closed() {
    let fetcher = Arc::new(CountingFetcher::default());
    let scraper = scraper(&fetcher, AppConfig::default())
        .with_safety_provider(Arc::new(SafetyStub(|| Err(Error::UnsafeUrl("malware".into())))));

    let err = scraper
        .fetch_content(&FetchContentInput::new("https://example.com/plain-article"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsafeUrl(_)));
    assert_eq!(fetcher.calls(), 0);
}

#[tokio::test]
async fn unavailable_safety_provider_fails_open() {
    let url = "https://example.com/plain-article";
    let fetcher = Arc::new(CountingFetcher::default().with_page(url, "text/html", article_page("Bridge")));
    let scraper = scraper(&fetcher, AppConfig::default())
        .with_safety_provider(Arc::new(SafetyStub(|| Err(Error::Timeout("lookup".into())))));

    let output = scraper.fetch_content(&FetchContentInput::new(url)).await.unwrap();

    assert!(output.content.is_some());
    assert_eq!(fetcher.calls(), 1);
}

#[tokio::test]
async fn rewritten_urls_are_fetched_under_both_policies() {
    for policy in [RewritePolicy::Continue, RewritePolicy::Restart] {
        let fetcher = Arc::new(CountingFetcher::default());
        let config = AppConfig { rewrite_policy: policy, ..AppConfig::default() };
        let scraper = scraper(&fetcher, config);

        let output = scraper
            .fetch_content(&FetchContentInput::new("https://mobile.twitter.com/someone/status/42"))
            .await
            .unwrap();

        assert_eq!(output.final_url, "https://twitter.com/someone/status/42", "{policy:?}");
        assert_eq!(fetcher.requested(), vec!["https://twitter.com/someone/status/42".to_string()], "{policy:?}");
    }
}

#[tokio::test]
async fn chain_title_survives_an_untitled_render() {
    let url = "https://spa-heavy-site.example/post";
    let fetcher = Arc::new(CountingFetcher::default().with_page(url, "text/html", SPA_SHELL));
    let rendered: String = (0..8).map(|i| format!("<p>{i}. {SENTENCE}</p>")).collect();
    let renderer = Arc::new(CountingRenderer::new(rendered).untitled());
    let scraper = scraper(&fetcher, AppConfig::default())
        .with_extractor(Arc::new(ShellTitleExtractor))
        .with_renderer(renderer.clone());

    let output = scraper.fetch_content(&FetchContentInput::new(url)).await.unwrap();

    assert_eq!(renderer.calls(), 1);
    assert_eq!(output.title.as_deref(), Some("Chain title"));
    assert!(output.content.as_deref().unwrap().contains("quiet Tuesday morning"));
}

#[tokio::test]
async fn public_render_landing_url_becomes_final_url() {
    let url = "https://spa-heavy-site.example/post";
    let landing = "https://spa-heavy-site.example/articles/7";
    let fetcher = Arc::new(CountingFetcher::default().with_page(url, "text/html", SPA_SHELL));
    let renderer = Arc::new(CountingRenderer::new(article_page("Hydrated")).landing_on(landing));
    let scraper = scraper(&fetcher, AppConfig::default()).with_renderer(renderer.clone());

    let output = scraper.fetch_content(&FetchContentInput::new(url)).await.unwrap();

    assert_eq!(output.final_url, landing);
    assert!(output.content.as_deref().unwrap().contains("quiet Tuesday morning"));
}

#[tokio::test]
async fn rendered_pdf_replaces_chain_html() {
    let url = "https://spa-heavy-site.example/report";
    let fetcher = Arc::new(CountingFetcher::default().with_page(url, "text/html", SPA_SHELL));
    let renderer = Arc::new(CountingRenderer::new("%PDF-1.7").serving("application/pdf"));
    let scraper = scraper(&fetcher, AppConfig::default()).with_renderer(renderer.clone());

    let output = scraper.fetch_content(&FetchContentInput::new(url)).await.unwrap();

    assert_eq!(renderer.calls(), 1);
    assert_eq!(output.content_type.as_deref(), Some("application/pdf"));
    assert_eq!(output.content, None);
}

#[tokio::test]
async fn fetch_redirect_does_not_restart_the_chain() {
    let url = "https://example.com/post";
    let landing = "https://example.com/post?session=1";
    for policy in [RewritePolicy::Continue, RewritePolicy::Restart] {
        let fetcher = Arc::new(
            CountingFetcher::default()
                .with_page(url, "text/html", SPA_SHELL)
                .redirecting(url, landing),
        );
        let config = AppConfig { rewrite_policy: policy, render_enabled: false, ..AppConfig::default() };
        let scraper = scraper(&fetcher, config);

        let output = scraper.fetch_content(&FetchContentInput::new(url)).await.unwrap();

        assert_eq!(fetcher.calls(), 1, "{policy:?}");
        assert_eq!(output.final_url, landing, "{policy:?}");
    }
}
