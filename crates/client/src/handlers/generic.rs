//! Fallback handler: readability over the fetched page.

use async_trait::async_trait;
use tidyread_core::{CONTENT_TYPE_HTML, Error, PreHandleResult};
use url::Url;

use super::{HandleContext, Handler, HandlerPriority};
use crate::extract::ExtractConfig;
use crate::fetch::HttpRequestConfig;

/// Applies to every http(s) URL.
#[derive(Debug, Clone, Default)]
pub struct GenericHandler {
    request: HttpRequestConfig,
    extract: ExtractConfig,
}

impl GenericHandler {
    pub fn new(request: HttpRequestConfig, extract: ExtractConfig) -> Self {
        Self { request, extract }
    }
}

#[async_trait]
impl Handler for GenericHandler {
    fn name(&self) -> &str {
        "generic"
    }

    fn priority(&self) -> HandlerPriority {
        HandlerPriority::Generic
    }

    fn can_handle(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https")
    }

    async fn handle(&self, url: &Url, ctx: &HandleContext<'_>) -> Result<Option<PreHandleResult>, Error> {
        let response = ctx.fetcher.fetch(url, &self.request, &ctx.deadline).await?;
        let mut result = PreHandleResult::new(response.final_url.as_str());

        if !response.is_html() {
            result.content_type = response.mime();
            return Ok(Some(result));
        }
        result.content_type = Some(CONTENT_TYPE_HTML.to_string());

        match ctx.extractor.extract(&response.text(), &response.final_url, &self.extract) {
            Ok(article) => {
                tracing::debug!(url = %response.final_url, text_length = article.text_length, "readability extraction");
                result.title = article.title;
                result.content = Some(article.content);
            }
            Err(Error::ExtractFailed(reason)) => {
                tracing::debug!(url = %response.final_url, reason = %reason, "no readable article in static HTML");
            }
            Err(e) => return Err(e),
        }
        Ok(Some(result))
    }
}
