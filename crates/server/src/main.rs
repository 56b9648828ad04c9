//! tidyread server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use tidyread_client::Scraper;
use tidyread_core::AppConfig;
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        render_enabled = config.render_enabled,
        rewrite_policy = ?config.rewrite_policy,
        "Starting tidyread server on stdio transport"
    );

    let scraper = Arc::new(Scraper::from_config(&config)?);
    let handler = handler::TidyreadServer::new(scraper.clone());
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;
    scraper.shutdown().await;

    Ok(())
}
