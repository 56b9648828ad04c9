//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the appropriate implementations.
use std::sync::Arc;

use crate::tools::fetch_content_impl;

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use tidyread_client::Scraper;
use tidyread_core::FetchContentInput;

/// The main MCP server handler for tidyread.
#[derive(Clone)]
pub struct TidyreadServer {
    scraper: Arc<Scraper>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl TidyreadServer {
    /// Create a new server handler around a shared scraper.
    pub fn new(scraper: Arc<Scraper>) -> Self {
        Self { scraper, tool_router: Self::tool_router() }
    }

    /// Fetch a URL and return its readable content.
    ///
    /// Tries cheap per-site strategies first and falls back to a headless
    /// browser only when they produce no readable article.
    #[tool(
        description = "Fetch a URL and return its readable article content as JSON {finalUrl, title, content, contentType}. PDFs return only their content type."
    )]
    async fn fetch_content(&self, params: Parameters<FetchContentInput>) -> Result<CallToolResult, McpError> {
        fetch_content_impl(&self.scraper, params.0).await
    }
}

impl ServerHandler for TidyreadServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "tidyread".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
