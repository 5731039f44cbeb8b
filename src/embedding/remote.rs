//! OpenAI-compatible remote embedding provider.
//!
//! Sends `POST {base_url}/embeddings` with a bearer key. Large inputs are split into
//! sub-batches bounded by text count and total characters; any sub-batch failure fails
//! the whole call.

use std::num::NonZeroU32;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};

use super::{EmbeddingProvider, ProviderKind};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Output size of the models whose dimension is known without asking.
fn known_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        "text-embedding-3-large" => 3072,
        _ => 0,
    }
}

/// Split `texts` into contiguous ranges of at most `max_texts` items and at most
/// `max_chars` characters. A single text over the character budget gets its own range.
pub fn plan_sub_batches(texts: &[String], max_texts: usize, max_chars: usize) -> Vec<Range<usize>> {
    let max_texts = max_texts.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut chars = 0;

    for (i, text) in texts.iter().enumerate() {
        let len = text.chars().count();
        let full = i - start >= max_texts || (i > start && chars + len > max_chars);
        if full {
            ranges.push(start..i);
            start = i;
            chars = 0;
        }
        chars += len;
    }
    if start < texts.len() {
        ranges.push(start..texts.len());
    }
    ranges
}

#[derive(Serialize)]
struct EmbeddingsBody<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Failure of one HTTP attempt.
#[derive(Debug)]
enum AttemptError {
    /// Rate limited, server error, or connection trouble.
    Transient(String),
    Fatal(String),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) | Self::Fatal(msg) => f.write_str(msg),
        }
    }
}

pub struct RemoteEmbeddingProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_batch_texts: usize,
    max_batch_chars: usize,
    limiter: Option<DefaultDirectRateLimiter>,
    retry: RetryPolicy,
    dimensions: AtomicUsize,
}

impl RemoteEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig, model: &str) -> Result<Self> {
        if !config.is_openai_configured() {
            return Err(Error::Configuration(
                "OpenAI provider selected but OPENAI_API_KEY is not set".into(),
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;
        let limiter = config
            .requests_per_minute
            .and_then(NonZeroU32::new)
            .map(|rpm| RateLimiter::direct(Quota::per_minute(rpm)));

        Ok(Self {
            http,
            endpoint: format!("{}/embeddings", config.openai_base_url.trim_end_matches('/')),
            api_key: config.openai_api_key.clone(),
            model: model.to_string(),
            max_batch_texts: config.max_batch_texts,
            max_batch_chars: config.max_batch_chars,
            limiter,
            retry: RetryPolicy::default(),
            dimensions: AtomicUsize::new(known_dimensions(model)),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, AttemptError> {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&EmbeddingsBody {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| AttemptError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let msg = format!("HTTP {status}: {}", body.trim());
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                AttemptError::Transient(msg)
            } else {
                AttemptError::Fatal(msg)
            });
        }

        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| AttemptError::Fatal(format!("invalid response body: {e}")))?;
        if parsed.data.len() != texts.len() {
            return Err(AttemptError::Fatal(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingProvider for RemoteEmbeddingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Remote
    }

    fn name(&self) -> String {
        format!("openai-{}", self.model)
    }

    fn dimensions(&self) -> usize {
        self.dimensions.load(Ordering::Relaxed)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for range in plan_sub_batches(texts, self.max_batch_texts, self.max_batch_chars) {
            let batch = &texts[range];
            let embedded = retry_with_backoff(
                "openai embeddings",
                &self.retry,
                |e: &AttemptError| matches!(e, AttemptError::Transient(_)),
                || self.request(batch),
            )
            .await
            .map_err(|e| Error::EmbeddingProvider(format!("OpenAI embedding failed: {e}")))?;
            vectors.extend(embedded);
        }

        if let Some(first) = vectors.first() {
            self.dimensions.store(first.len(), Ordering::Relaxed);
        }
        tracing::debug!(model = %self.model, count = vectors.len(), "remote embeddings generated");
        Ok(vectors)
    }
}
