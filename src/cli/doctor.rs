//! CLI `doctor` command: check Endee connectivity and embedding setup.

use anyhow::Result;

use crate::config::EndeeMcpConfig;
use crate::embedding::local::LocalModelSpec;
use crate::embedding::{EmbeddingManager, ProviderChoice, ProviderKind};
use crate::storage::{EndeeClient, VectorStore};

/// Print a health report. Problems are reported, not returned as errors.
pub async fn doctor(config: &EndeeMcpConfig) -> Result<()> {
    println!("Endee MCP Health Report");
    println!("=======================");
    println!();
    println!("Endee:");
    println!("  URL:             {}", config.endee.url);
    println!(
        "  Auth:            {}",
        if config.endee.is_auth_enabled() { "token set" } else { "none" }
    );

    match EndeeClient::new(&config.endee) {
        Ok(client) => {
            match client.health().await {
                Ok(health) => println!("  Health:          {health}"),
                Err(e) => println!("  Health:          FAILED ({e})"),
            }
            match client.list_indexes().await {
                Ok(indexes) => {
                    println!("  Indexes:         {}", indexes.len());
                    for index in indexes {
                        println!(
                            "    {:<24} dim={:<6} vectors={}",
                            index.name, index.dimension, index.total_elements
                        );
                    }
                }
                Err(e) => println!("  Indexes:         unavailable ({e})"),
            }
        }
        Err(e) => println!("  Client:          {e}"),
    }

    println!();
    println!("Embeddings:");
    let manager = EmbeddingManager::new(config.embedding.clone());
    let key = manager.key_for(ProviderChoice::Auto, None);
    println!("  Configured:      {}", config.embedding.provider);
    println!("  Effective:       {key}");
    println!(
        "  OpenAI key:      {}",
        if config.embedding.is_openai_configured() { "set" } else { "not set" }
    );

    if key.kind == ProviderKind::Local {
        let cache_dir = config.embedding.resolved_cache_dir();
        match LocalModelSpec::find(&key.model) {
            Ok(spec) if spec.is_downloaded(&cache_dir) => {
                println!("  Local model:     {} ({} dims, downloaded)", spec.repo, spec.dimensions);
            }
            Ok(spec) => {
                println!("  Local model:     {} not downloaded", spec.repo);
                println!("  Run `endee-mcp model download` to fetch it.");
                return Ok(());
            }
            Err(e) => {
                println!("  Local model:     {e}");
                return Ok(());
            }
        }
    }

    if key.kind != ProviderKind::Disabled {
        match manager.resolve(ProviderChoice::Auto, None).await {
            Ok(provider) => match provider.embed_batch(&["endee doctor".to_string()]).await {
                Ok(vectors) => println!(
                    "  Test embedding:  OK ({}, {} dims)",
                    provider.name(),
                    vectors.first().map_or(0, Vec::len)
                ),
                Err(e) => println!("  Test embedding:  FAILED ({e})"),
            },
            Err(e) => println!("  Provider:        FAILED ({e})"),
        }
    }

    Ok(())
}
