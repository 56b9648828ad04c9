//! fetch_content tool implementation.
//!
//! Runs the full extraction pipeline for one URL and returns the result as
//! pretty-printed JSON.

use rmcp::{ErrorData as McpError, model::*};
use tidyread_client::Scraper;
use tidyread_core::{Error, FetchContentInput};

/// Implementation of the fetch_content tool.
pub async fn fetch_content_impl(scraper: &Scraper, params: FetchContentInput) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let output = scraper.fetch_content(&params).await?;

    tracing::info!(
        url = %output.final_url,
        content_type = output.content_type.as_deref().unwrap_or("unknown"),
        has_content = output.content.is_some(),
        "fetch_content completed"
    );

    let json = serde_json::to_string_pretty(&output)
        .map_err(|e| McpError::internal_error(format!("failed to serialize result: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
