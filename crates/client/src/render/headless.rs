//! chromiumoxide-backed renderer with a supervised shared browser.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{SetScriptExecutionDisabledParams, SetTimezoneOverrideParams};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self as cdp_fetch, ContinueRequestParams, EventRequestPaused, FailRequestParams, HeaderEntry, RequestPattern,
    RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self as cdp_network, ErrorReason, Headers, ResourceType, SetExtraHttpHeadersParams,
};
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::listeners::EventStream;
use futures_util::StreamExt;
use tidyread_core::{BrowserSettings, CONTENT_TYPE_HTML, Error};
use tokio::task::JoinHandle;
use url::Url;

use super::network::{InterceptStage, InterceptedRequest, NetworkPolicy, ResourceKind, Verdict};
use super::{RenderError, RenderOptions, RenderedPage, Renderer, scripts};
use crate::Deadline;

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(20);
const SETUP_TIMEOUT: Duration = Duration::from_secs(5);
const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(2);
/// Added to in-page time boxes so the page resolves before the outer timeout.
const SCRIPT_SLACK: Duration = Duration::from_millis(500);

struct ManagedBrowser {
    browser: Browser,
    alive: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
}

impl Drop for ManagedBrowser {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

/// A shared reference to the running browser.
#[derive(Clone)]
pub struct BrowserLease {
    inner: Arc<ManagedBrowser>,
}

impl BrowserLease {
    fn browser(&self) -> &Browser {
        &self.inner.browser
    }

    pub fn is_alive(&self) -> bool {
        self.inner.alive.load(Ordering::SeqCst)
    }
}

/// Owns the browser process: launches it on first use and relaunches it
/// after the connection drops.
pub struct BrowserSupervisor {
    settings: BrowserSettings,
    current: tokio::sync::Mutex<Option<Arc<ManagedBrowser>>>,
}

impl BrowserSupervisor {
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings, current: tokio::sync::Mutex::new(None) }
    }

    /// The running browser, launching or relaunching it if needed.
    pub async fn acquire(&self) -> Result<BrowserLease, RenderError> {
        let mut current = self.current.lock().await;
        if let Some(managed) = current.as_ref()
            && managed.alive.load(Ordering::SeqCst)
        {
            return Ok(BrowserLease { inner: managed.clone() });
        }

        if current.take().is_some() {
            tracing::info!("relaunching disconnected browser");
        }
        let managed = Arc::new(launch(&self.settings).await?);
        *current = Some(managed.clone());
        Ok(BrowserLease { inner: managed })
    }

    /// Give a lease back. The browser keeps running for other requests.
    pub fn release(&self, lease: BrowserLease) {
        tracing::trace!(alive = lease.is_alive(), "browser lease released");
        drop(lease);
    }

    /// Probe the running browser. An unresponsive browser is marked dead so
    /// the next [`acquire`](Self::acquire) relaunches it. `false` when no
    /// browser is running.
    pub async fn health_check(&self) -> bool {
        let Some(managed) = self.current.lock().await.clone() else {
            return false;
        };
        if !managed.alive.load(Ordering::SeqCst) {
            return false;
        }

        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, managed.browser.version()).await {
            Ok(Ok(version)) => {
                tracing::trace!(product = %version.product, "browser healthy");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "browser health check failed");
                managed.alive.store(false, Ordering::SeqCst);
                false
            }
            Err(_) => {
                tracing::warn!("browser health check timed out");
                managed.alive.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Drop the running browser, if any.
    pub async fn shutdown(&self) {
        if let Some(managed) = self.current.lock().await.take() {
            managed.alive.store(false, Ordering::SeqCst);
        }
    }
}

async fn launch(settings: &BrowserSettings) -> Result<ManagedBrowser, RenderError> {
    let mut builder = BrowserConfig::builder()
        .viewport(Some(Viewport {
            width: settings.viewport_width,
            height: settings.viewport_height,
            ..Default::default()
        }))
        .request_timeout(settings.navigation_timeout())
        .arg("--disable-gpu")
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--mute-audio");
    if let Some(executable) = &settings.executable {
        builder = builder.chrome_executable(executable);
    }
    let config = builder.build().map_err(RenderError::BrowserLaunch)?;

    let (browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;

    let alive = Arc::new(AtomicBool::new(true));
    let flag = alive.clone();
    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                tracing::debug!("browser handler event error: {e}");
                break;
            }
        }
        flag.store(false, Ordering::SeqCst);
        tracing::debug!("browser handler loop ended");
    });

    tracing::info!("headless browser launched");
    Ok(ManagedBrowser { browser, alive, handler_task })
}

/// One page in its own browser context. Closed explicitly with
/// [`close`](Self::close); on any other exit path `Drop` schedules the
/// cleanup on the runtime.
struct PageSession {
    page: Option<Page>,
    context_id: Option<BrowserContextId>,
    lease: Option<BrowserLease>,
    interceptor: Option<JoinHandle<()>>,
    url: String,
    runtime: tokio::runtime::Handle,
}

impl PageSession {
    async fn open(lease: BrowserLease, url: &Url) -> Result<Self, RenderError> {
        let context_id = lease
            .browser()
            .execute(CreateBrowserContextParams::default())
            .await
            .map_err(|e| RenderError::Setup(format!("create browser context: {e}")))?
            .result
            .browser_context_id;

        let mut session = Self {
            page: None,
            context_id: Some(context_id.clone()),
            lease: Some(lease),
            interceptor: None,
            url: url.to_string(),
            runtime: tokio::runtime::Handle::current(),
        };

        let target = CreateTargetParams::builder()
            .url("about:blank")
            .browser_context_id(context_id)
            .build()
            .map_err(RenderError::Setup)?;
        let page = session
            .lease
            .as_ref()
            .ok_or(RenderError::BrowserClosed)?
            .browser()
            .new_page(target)
            .await
            .map_err(|e| RenderError::Setup(format!("create page: {e}")))?;
        session.page = Some(page);
        Ok(session)
    }

    fn page(&self) -> Result<&Page, RenderError> {
        self.page.as_ref().ok_or(RenderError::BrowserClosed)
    }

    async fn close(mut self) {
        let (interceptor, page, context_id, lease) =
            (self.interceptor.take(), self.page.take(), self.context_id.take(), self.lease.take());
        teardown(interceptor, page, context_id, lease, &self.url).await;
    }
}

impl Drop for PageSession {
    fn drop(&mut self) {
        if self.page.is_none() && self.context_id.is_none() {
            return;
        }
        let (interceptor, page, context_id, lease) =
            (self.interceptor.take(), self.page.take(), self.context_id.take(), self.lease.take());
        let url = std::mem::take(&mut self.url);
        self.runtime.spawn(async move {
            teardown(interceptor, page, context_id, lease, &url).await;
        });
    }
}

async fn teardown(
    interceptor: Option<JoinHandle<()>>, page: Option<Page>, context_id: Option<BrowserContextId>,
    lease: Option<BrowserLease>, url: &str,
) {
    if let Some(task) = interceptor {
        task.abort();
    }
    if let Some(page) = page
        && let Err(e) = page.close().await
    {
        tracing::warn!(url, error = %e, "failed to close page");
    }
    if let (Some(id), Some(lease)) = (context_id, lease.as_ref())
        && let Err(e) = lease.browser().execute(DisposeBrowserContextParams::new(id)).await
    {
        tracing::warn!(url, error = %e, "failed to dispose browser context");
    }
    tracing::trace!(url, "page session released");
}

/// [`Renderer`] driving headless Chrome/Chromium.
pub struct HeadlessRenderer {
    supervisor: Arc<BrowserSupervisor>,
    policy: NetworkPolicy,
}

impl HeadlessRenderer {
    pub fn new(supervisor: Arc<BrowserSupervisor>) -> Self {
        Self { supervisor, policy: NetworkPolicy::default() }
    }

    pub fn with_policy(mut self, policy: NetworkPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn supervisor(&self) -> &Arc<BrowserSupervisor> {
        &self.supervisor
    }

    async fn configure(page: &Page, url: &Url, opts: &RenderOptions) -> Result<bool, RenderError> {
        let scripts_disabled = opts.scripts_disabled_for(url);
        if scripts_disabled {
            page.execute(SetScriptExecutionDisabledParams::new(true))
                .await
                .map_err(|e| RenderError::Setup(format!("disable scripts: {e}")))?;
        }

        if let Some(locale) = &opts.locale {
            page.execute(cdp_network::EnableParams::default())
                .await
                .map_err(|e| RenderError::Setup(format!("enable network: {e}")))?;
            let headers = Headers::new(serde_json::json!({ "Accept-Language": locale }));
            page.execute(SetExtraHttpHeadersParams::new(headers))
                .await
                .map_err(|e| RenderError::Setup(format!("set locale: {e}")))?;
        }

        if let Some(timezone) = &opts.timezone
            && let Err(e) = page.execute(SetTimezoneOverrideParams::new(timezone.clone())).await
        {
            tracing::warn!(timezone = %timezone, error = %e, "ignoring unsupported timezone");
        }

        Ok(scripts_disabled)
    }

    async fn install_interception(
        &self, page: &Page, document_type: Arc<Mutex<Option<String>>>,
    ) -> Result<JoinHandle<()>, RenderError> {
        let events = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| RenderError::Setup(format!("listen for paused requests: {e}")))?;
        let task = tokio::spawn(intercept(page.clone(), events, self.policy.clone(), document_type));

        let enable = cdp_fetch::EnableParams::builder()
            .patterns([
                RequestPattern::builder()
                    .url_pattern("*")
                    .request_stage(RequestStage::Request)
                    .build(),
                RequestPattern::builder()
                    .url_pattern("*")
                    .resource_type(ResourceType::Document)
                    .request_stage(RequestStage::Response)
                    .build(),
            ])
            .build();
        if let Err(e) = page.execute(enable).await {
            task.abort();
            return Err(RenderError::Setup(format!("enable request interception: {e}")));
        }
        Ok(task)
    }

    async fn evaluate_bounded(page: &Page, script: String, limit: Duration, deadline: &Deadline, what: &str) {
        let params = match EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
        {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!(step = what, error = %e, "invalid evaluate params");
                return;
            }
        };
        match tokio::time::timeout(deadline.cap(limit + SCRIPT_SLACK), page.evaluate_expression(params)).await {
            Ok(Ok(result)) => {
                tracing::trace!(step = what, value = ?result.value(), "page script finished");
            }
            Ok(Err(e)) => tracing::debug!(step = what, error = %e, "page script failed"),
            Err(_) => tracing::debug!(step = what, "page script timed out"),
        }
    }

    async fn render_in(
        &self, session: &mut PageSession, url: &Url, opts: &RenderOptions, deadline: &Deadline,
    ) -> Result<RenderedPage, Error> {
        let start = Instant::now();
        let page = session.page()?.clone();

        let scripts_disabled = deadline
            .run(SETUP_TIMEOUT, "page setup", async { Ok::<_, Error>(Self::configure(&page, url, opts).await?) })
            .await?;

        let document_type = Arc::new(Mutex::new(None));
        let interceptor = deadline
            .run(SETUP_TIMEOUT, "page setup", async {
                Ok::<_, Error>(self.install_interception(&page, document_type.clone()).await?)
            })
            .await?;
        session.interceptor = Some(interceptor);

        deadline
            .run(opts.navigation_timeout, "navigation", async {
                page.goto(url.as_str())
                    .await
                    .map_err(|e| RenderError::Navigation(e.to_string()))?;
                Ok::<_, Error>(())
            })
            .await?;

        if scripts_disabled {
            tracing::debug!(url = %url, "scripts disabled; skipping settle and scroll");
        } else {
            let settle = scripts::settle_script(opts.settle_debounce, opts.settle_ceiling);
            Self::evaluate_bounded(&page, settle, opts.settle_ceiling, deadline, "settle").await;
            let scroll = scripts::scroll_script(opts.scroll_timeout);
            Self::evaluate_bounded(&page, scroll, opts.scroll_timeout, deadline, "scroll").await;
        }

        let (title, html, final_url) = deadline
            .run(SETUP_TIMEOUT, "content capture", async {
                let title = page.get_title().await.ok().flatten().filter(|t| !t.trim().is_empty());
                let html = page
                    .content()
                    .await
                    .map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;
                let current = page
                    .url()
                    .await
                    .map_err(|e| RenderError::ContentRetrieval(e.to_string()))?;
                Ok::<_, Error>((title, html, current))
            })
            .await?;

        let final_url = final_url
            .as_deref()
            .and_then(|u| Url::parse(u).ok())
            .unwrap_or_else(|| url.clone());
        let content_type = document_type
            .lock()
            .ok()
            .and_then(|ct| ct.clone())
            .unwrap_or_else(|| CONTENT_TYPE_HTML.to_string());
        let render_time_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("rendered {} -> {} in {}ms ({} bytes)", url, final_url, render_time_ms, html.len());
        Ok(RenderedPage { html, title, final_url, content_type, render_time_ms })
    }
}

#[async_trait::async_trait]
impl Renderer for HeadlessRenderer {
    async fn render(&self, url: &Url, opts: &RenderOptions, deadline: &Deadline) -> Result<RenderedPage, Error> {
        let lease = deadline
            .run(LAUNCH_TIMEOUT, "browser launch", async { Ok::<_, Error>(self.supervisor.acquire().await?) })
            .await?;
        let mut session = deadline
            .run(SETUP_TIMEOUT, "page setup", async { Ok::<_, Error>(PageSession::open(lease, url).await?) })
            .await?;

        let result = self.render_in(&mut session, url, opts, deadline).await;
        session.close().await;
        result
    }
}

async fn intercept(
    page: Page, mut events: EventStream<EventRequestPaused>, policy: NetworkPolicy,
    document_type: Arc<Mutex<Option<String>>>,
) {
    while let Some(event) = events.next().await {
        let kind = resource_kind(&event.resource_type);
        let stage = if event.response_status_code.is_some() || event.response_error_reason.is_some() {
            InterceptStage::Response { content_type: header_value(event.response_headers.as_deref(), "content-type") }
        } else {
            InterceptStage::Request
        };

        let verdict = policy.decide(&InterceptedRequest { url: &event.request.url, kind, stage: stage.clone() });

        if verdict == Verdict::Continue
            && kind == ResourceKind::Document
            && let InterceptStage::Response { content_type: Some(ct) } = &stage
            && let Ok(mut slot) = document_type.lock()
            && slot.is_none()
        {
            *slot = Some(ct.clone());
        }

        let outcome = match verdict {
            Verdict::Continue => page
                .execute(ContinueRequestParams::new(event.request_id.clone()))
                .await
                .map(|_| ()),
            Verdict::Block(reason) => {
                tracing::debug!(url = %event.request.url, reason = ?reason, "blocked browser request");
                page.execute(FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient))
                    .await
                    .map(|_| ())
            }
        };
        if let Err(e) = outcome {
            tracing::trace!(url = %event.request.url, error = %e, "paused request already gone");
        }
    }
}

fn resource_kind(resource_type: &ResourceType) -> ResourceKind {
    match resource_type {
        ResourceType::Document => ResourceKind::Document,
        ResourceType::Stylesheet => ResourceKind::Stylesheet,
        ResourceType::Image => ResourceKind::Image,
        ResourceType::Media => ResourceKind::Media,
        ResourceType::Font => ResourceKind::Font,
        ResourceType::Script => ResourceKind::Script,
        ResourceType::Xhr | ResourceType::Fetch => ResourceKind::Xhr,
        _ => ResourceKind::Other,
    }
}

fn header_value(headers: Option<&[HeaderEntry]>, name: &str) -> Option<String> {
    headers?
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.clone())
}
