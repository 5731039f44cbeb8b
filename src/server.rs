//! MCP server initialization for stdio and SSE transports.
//!
//! [`serve`] picks the transport from configuration; [`serve_stdio`] and [`serve_sse`]
//! wire the Endee client, the embedding manager and the tool handler into a running
//! server.

use std::sync::Arc;

use anyhow::{Context, Result};
use rmcp::ServiceExt;

use crate::config::EndeeMcpConfig;
use crate::embedding::EmbeddingManager;
use crate::storage::{EndeeClient, VectorStore};
use crate::tools::EndeeTools;

type SharedState = (Arc<dyn VectorStore>, Arc<EmbeddingManager>, Arc<EndeeMcpConfig>);

/// Build the Endee client and embedding manager, preloading the model if configured.
async fn setup_shared_state(config: EndeeMcpConfig) -> Result<SharedState> {
    let client = EndeeClient::new(&config.endee).context("failed to create Endee client")?;
    tracing::info!(url = %config.endee.url, auth = config.endee.is_auth_enabled(), "Endee client ready");
    let store: Arc<dyn VectorStore> = Arc::new(client);

    let embeddings = Arc::new(EmbeddingManager::new(config.embedding.clone()));
    if let Err(e) = embeddings.preload().await {
        // The server stays usable for vector-only work.
        tracing::warn!(error = %e, "embedding preload failed");
    }
    tracing::info!(provider = %embeddings.describe(), "embedding manager ready");

    Ok((store, embeddings, Arc::new(config)))
}

/// Start on the configured transport: `stdio` (default) or `sse`.
pub async fn serve(config: EndeeMcpConfig) -> Result<()> {
    match config.server.transport.as_str() {
        "stdio" => serve_stdio(config).await,
        "sse" | "http" => serve_sse(config).await,
        other => anyhow::bail!("unknown MCP transport: {other}. Supported: stdio, sse"),
    }
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: EndeeMcpConfig) -> Result<()> {
    tracing::info!("starting Endee MCP server on stdio");

    let (store, embeddings, config) = setup_shared_state(config).await?;

    let tools = EndeeTools::new(store, embeddings, config);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP (SSE) transport.
pub async fn serve_sse(config: EndeeMcpConfig) -> Result<()> {
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(addr = %bind_addr, "starting Endee MCP server on SSE/HTTP");

    let (store, embeddings, config) = setup_shared_state(config).await?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || {
            Ok(EndeeTools::new(
                Arc::clone(&store),
                Arc::clone(&embeddings),
                Arc::clone(&config),
            ))
        },
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down SSE server");
        })
        .await?;

    Ok(())
}
