//! Batch ingestion: chunk, embed, upsert, aggregate.
//!
//! Records are split into contiguous chunks of at most `batch_size`. Each chunk gets
//! one embedding call covering its text records and one upsert. Failures are recorded
//! per record in the [`BatchOutcome`]. Only a provider that cannot be configured at all
//! aborts the call, before any chunk is sent. Nothing here retries.

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::config::IngestConfig;
use crate::embedding::{EmbeddingManager, EmbeddingRequest, ProviderChoice};
use crate::error::{Error, ErrorScope, Result};
use crate::records::{Record, RecordPayload, RejectedRecord};
use crate::storage::types::VectorItem;
use crate::storage::VectorStore;

/// How the pipeline learns the index dimension for per-record checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DimensionCheck {
    /// Send vectors as they are and let the store judge them.
    Off,
    /// Ask the store via `describe_index`; skip the check if that fails.
    #[default]
    Lookup,
    Expect(usize),
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub provider: ProviderChoice,
    pub model: Option<String>,
    /// Chunks in flight at once. 1 keeps chunks strictly sequential.
    pub max_concurrent_chunks: usize,
    pub dimension_check: DimensionCheck,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

impl IngestOptions {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            provider: ProviderChoice::Auto,
            model: None,
            max_concurrent_chunks: config.max_concurrent_chunks,
            dimension_check: DimensionCheck::Lookup,
        }
    }

    pub fn with_batch_size(mut self, batch_size: Option<usize>) -> Self {
        if let Some(size) = batch_size {
            self.batch_size = size;
        }
        self
    }

    pub fn with_provider(mut self, provider: Option<ProviderChoice>, model: Option<String>) -> Self {
        if let Some(provider) = provider {
            self.provider = provider;
        }
        self.model = model;
        self
    }

    pub fn with_dimension_check(mut self, check: DimensionCheck) -> Self {
        self.dimension_check = check;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedRecord {
    pub id: String,
    pub reason: String,
}

impl FailedRecord {
    pub fn new(id: impl Into<String>, error: &Error) -> Self {
        Self {
            id: id.into(),
            reason: error.to_tool_message(),
        }
    }
}

/// Aggregate result of one ingestion call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
}

impl BatchOutcome {
    fn absorb(&mut self, chunk: ChunkOutcome) {
        self.attempted += chunk.attempted;
        self.failed.extend(chunk.failed);
        if self.embedding_provider.is_none() {
            self.embedding_provider = chunk.provider;
        }
        self.succeeded = self.attempted.saturating_sub(self.failed.len());
    }

    /// Count records the normalizer refused as attempted and failed.
    pub fn add_rejected(&mut self, rejected: &[RejectedRecord]) {
        self.attempted += rejected.len();
        self.failed.extend(
            rejected
                .iter()
                .map(|r| FailedRecord::new(r.label(), &r.error)),
        );
        self.succeeded = self.attempted.saturating_sub(self.failed.len());
    }
}

#[derive(Debug, Default)]
struct ChunkOutcome {
    attempted: usize,
    failed: Vec<FailedRecord>,
    provider: Option<String>,
}

pub struct IngestPipeline {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<EmbeddingManager>,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn VectorStore>, embeddings: Arc<EmbeddingManager>) -> Self {
        Self { store, embeddings }
    }

    pub async fn ingest(
        &self,
        index: &str,
        records: Vec<Record>,
        options: &IngestOptions,
    ) -> Result<BatchOutcome> {
        if records.iter().any(|r| r.text().is_some()) {
            if let Err(e) = self
                .embeddings
                .resolve(options.provider, options.model.as_deref())
                .await
            {
                if e.scope() == ErrorScope::Call {
                    return Err(e);
                }
            }
        }

        let batch_size = options.batch_size.max(1);
        let total = records.len();
        let dimension = self.expected_dimension(index, options.dimension_check).await;
        let chunks = into_chunks(records, batch_size);
        tracing::info!(
            index,
            records = total,
            chunks = chunks.len(),
            batch_size,
            "ingestion started"
        );

        let outcome = stream::iter(chunks.into_iter().enumerate())
            .map(|(n, chunk)| self.process_chunk(index, n, chunk, options, dimension))
            .buffer_unordered(options.max_concurrent_chunks.max(1))
            .fold(BatchOutcome::default(), |mut acc, chunk| async move {
                acc.absorb(chunk);
                acc
            })
            .await;

        tracing::info!(
            index,
            attempted = outcome.attempted,
            succeeded = outcome.succeeded,
            failed = outcome.failed.len(),
            "ingestion finished"
        );
        Ok(outcome)
    }

    async fn expected_dimension(&self, index: &str, check: DimensionCheck) -> Option<usize> {
        match check {
            DimensionCheck::Off => None,
            DimensionCheck::Expect(dim) => Some(dim),
            DimensionCheck::Lookup => match self.store.describe_index(index).await {
                Ok(info) if info.dimension > 0 => Some(info.dimension),
                Ok(_) => None,
                Err(e) => {
                    tracing::debug!(index, error = %e, "index dimension unknown, skipping check");
                    None
                }
            },
        }
    }

    async fn process_chunk(
        &self,
        index: &str,
        chunk_no: usize,
        chunk: Vec<Record>,
        options: &IngestOptions,
        dimension: Option<usize>,
    ) -> ChunkOutcome {
        let mut outcome = ChunkOutcome {
            attempted: chunk.len(),
            ..Default::default()
        };

        let texts: Vec<String> = chunk
            .iter()
            .filter_map(|r| r.text().map(str::to_string))
            .collect();
        let mut embeddings = if texts.is_empty() {
            None
        } else {
            let request = EmbeddingRequest::new(texts)
                .with_provider(options.provider, options.model.clone());
            match self.embeddings.embed(&request).await {
                Ok(embedded) => {
                    outcome.provider = Some(embedded.provider);
                    Some(embedded.vectors.into_iter())
                }
                Err(e) => {
                    tracing::warn!(index, chunk = chunk_no, error = %e, "chunk embedding failed");
                    outcome.failed.extend(
                        chunk
                            .iter()
                            .filter(|r| r.text().is_some())
                            .map(|r| FailedRecord::new(&r.id, &e)),
                    );
                    None
                }
            }
        };

        let mut items: Vec<VectorItem> = Vec::with_capacity(chunk.len());
        for record in chunk {
            let embedding = match &record.payload {
                RecordPayload::Vector(_) => None,
                RecordPayload::Text(_) => match embeddings.as_mut().and_then(Iterator::next) {
                    Some(vector) => Some(vector),
                    // Already counted as failed with the embedding error.
                    None => continue,
                },
            };
            let item = record.into_item(embedding);
            if let Some(expected) = dimension.filter(|&d| d != item.vector.len()) {
                let err = Error::InvalidVectorDimension {
                    id: item.id.clone(),
                    expected,
                    actual: item.vector.len(),
                };
                outcome.failed.push(FailedRecord::new(&item.id, &err));
                continue;
            }
            items.push(item);
        }

        if items.is_empty() {
            return outcome;
        }

        match self.store.upsert(index, &items).await {
            Ok(report) => {
                // Only ids sent in this chunk count, each at most once.
                let mut pending: HashSet<&str> = items.iter().map(|i| i.id.as_str()).collect();
                for rejected in &report.rejected {
                    if pending.remove(rejected.id.as_str()) {
                        outcome
                            .failed
                            .push(FailedRecord::new(&rejected.id, &rejected.error));
                    } else {
                        tracing::debug!(index, id = %rejected.id, "ignoring rejection for unsent or repeated id");
                    }
                }
                tracing::debug!(index, chunk = chunk_no, sent = items.len(), "chunk stored");
            }
            Err(e) => {
                tracing::warn!(index, chunk = chunk_no, error = %e, "chunk upsert failed");
                outcome
                    .failed
                    .extend(items.iter().map(|item| FailedRecord::new(&item.id, &e)));
            }
        }
        outcome
    }
}

/// Contiguous chunks of at most `size` records, in input order.
fn into_chunks(records: Vec<Record>, size: usize) -> Vec<Vec<Record>> {
    let mut chunks = Vec::with_capacity(records.len().div_ceil(size));
    let mut iter = records.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}
