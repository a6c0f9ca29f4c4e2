//! TribeCRM MCP Server
//!
//! Entry point for the MCP server binary.
//! Implements MCP protocol over stdio using JSON-RPC 2.0.

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tribecrm_mcp::auth::TokenManager;
use tribecrm_mcp::config::Config;
use tribecrm_mcp::gateway::{build_http_client, EntityGateway};
use tribecrm_mcp::mcp::{serve, TribeCrmMcpServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging goes to stderr, stdout carries the protocol
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting TribeCRM MCP Server...");

    let config = Config::load_default().context("Failed to load configuration")?;
    let runtime_config = config.to_runtime().context("Invalid configuration")?;

    tracing::info!(
        "Configured for {} dialect at {} (auth: {})",
        runtime_config.dialect,
        runtime_config.api_url,
        runtime_config.token_endpoint.url
    );

    let http_client = build_http_client(&runtime_config).context("Failed to build HTTP client")?;

    let tokens = Arc::new(TokenManager::new(
        runtime_config.credentials.clone(),
        runtime_config.token_endpoint.clone(),
        http_client.clone(),
    ));

    let gateway = Arc::new(EntityGateway::new(
        tokens,
        runtime_config.api_url.clone(),
        runtime_config.dialect,
        http_client,
    ));

    let server = Arc::new(TribeCrmMcpServer::new(
        gateway,
        runtime_config.server_name.clone(),
    ));

    tracing::info!("MCP Server ready, listening on stdio...");

    serve(server, tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("Stdio transport failed")?;

    tracing::info!("stdin closed, shutting down");
    Ok(())
}
