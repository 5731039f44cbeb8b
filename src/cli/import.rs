use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::EndeeMcpConfig;
use crate::embedding::{EmbeddingManager, ProviderChoice};
use crate::import;
use crate::ingest::{IngestOptions, IngestPipeline};
use crate::records::{self, FieldMapping};
use crate::storage::EndeeClient;

/// Field mapping and ingest knobs for a terminal import.
pub struct ImportArgs<'a> {
    pub index: &'a str,
    pub file: &'a Path,
    pub mapping: FieldMapping,
    /// CSV delimiter; `None` reads the file as JSON/JSONL.
    pub csv_delimiter: Option<u8>,
    pub batch_size: Option<usize>,
    pub provider: Option<ProviderChoice>,
}

/// Import a JSON, JSONL or CSV file into an index and print the outcome.
pub async fn import(config: &EndeeMcpConfig, args: ImportArgs<'_>) -> Result<()> {
    let raw = match args.csv_delimiter {
        Some(delimiter) => import::read_csv_records(args.file, delimiter).await,
        None => import::read_json_records(args.file).await,
    }
    .with_context(|| format!("failed to read {}", args.file.display()))?;

    println!("Importing {} records into '{}'...", raw.len(), args.index);

    let store = Arc::new(EndeeClient::new(&config.endee)?);
    let embeddings = Arc::new(EmbeddingManager::new(config.embedding.clone()));
    let pipeline = IngestPipeline::new(store, embeddings);

    let normalized = records::normalize(raw, &args.mapping);
    let options = IngestOptions::from_config(&config.ingest)
        .with_batch_size(args.batch_size)
        .with_provider(args.provider, None);
    let mut outcome = pipeline
        .ingest(args.index, normalized.records, &options)
        .await
        .context("import aborted")?;
    outcome.add_rejected(&normalized.rejected);

    println!(
        "Import complete: {} attempted, {} succeeded, {} failed",
        outcome.attempted,
        outcome.succeeded,
        outcome.failed.len()
    );
    if let Some(provider) = &outcome.embedding_provider {
        println!("Embedded with {provider}");
    }
    for failure in outcome.failed.iter().take(20) {
        println!("  {}: {}", failure.id, failure.reason);
    }
    if outcome.failed.len() > 20 {
        println!("  ... and {} more", outcome.failed.len() - 20);
    }
    Ok(())
}
