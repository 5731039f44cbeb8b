//! Search and filtered delete.
//!
//! Structured filters are translated before any I/O, so filter errors abort the call
//! without touching the store. A filter that can match nothing (an empty `$in`)
//! short-circuits: searches return no hits and deletes report zero, without a backend
//! round trip.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use twox_hash::XxHash32;

use crate::embedding::{EmbeddingManager, EmbeddingRequest, ProviderChoice};
use crate::error::{Error, Result};
use crate::filter::{self, WireFilter};
use crate::storage::types::{SearchHit, SearchRequest};
use crate::storage::VectorStore;

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_EF: usize = 128;
pub const DEFAULT_DENSE_WEIGHT: f32 = 0.7;

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub top_k: usize,
    pub ef: usize,
    pub include_vectors: bool,
    /// Structured conditions, translated on use.
    pub filter: Option<Vec<Value>>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            ef: DEFAULT_EF,
            include_vectors: false,
            filter: None,
        }
    }
}

/// Hits plus the embedding provider that produced the query vector.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TextSearchResult {
    pub results: Vec<SearchHit>,
    pub total_results: usize,
    pub embedding_provider: String,
}

impl TextSearchResult {
    fn new(results: Vec<SearchHit>, embedding_provider: String) -> Self {
        Self {
            total_results: results.len(),
            results,
            embedding_provider,
        }
    }
}

pub struct QueryService {
    store: Arc<dyn VectorStore>,
    embeddings: Arc<EmbeddingManager>,
}

impl QueryService {
    pub fn new(store: Arc<dyn VectorStore>, embeddings: Arc<EmbeddingManager>) -> Self {
        Self { store, embeddings }
    }

    fn request(vector: Vec<f32>, params: &SearchParams, filter: Option<WireFilter>) -> SearchRequest {
        SearchRequest {
            vector: Some(vector),
            sparse_indices: None,
            sparse_values: None,
            top_k: params.top_k,
            filter,
            ef: params.ef,
            include_vectors: params.include_vectors,
        }
    }

    /// Nearest neighbours of a ready-made vector.
    pub async fn search(
        &self,
        index: &str,
        vector: Vec<f32>,
        params: &SearchParams,
    ) -> Result<Vec<SearchHit>> {
        let filter = filter::translate_optional(params.filter.as_deref())?;
        if filter.as_ref().is_some_and(WireFilter::is_unsatisfiable) {
            tracing::debug!(index, "filter matches nothing, skipping search");
            return Ok(vec![]);
        }
        let request = Self::request(vector, params, filter);
        request.validate()?;
        self.store.search(index, &request).await
    }

    async fn embed_query(
        &self,
        query: &str,
        provider: ProviderChoice,
        model: Option<String>,
    ) -> Result<(Vec<f32>, String)> {
        if query.trim().is_empty() {
            return Err(Error::InvalidInput("query text is empty".into()));
        }
        let request =
            EmbeddingRequest::new(vec![query.to_string()]).with_provider(provider, model);
        let embedded = self.embeddings.embed(&request).await?;
        let vector = embedded
            .vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::EmbeddingProvider("no vector returned for query".into()))?;
        Ok((vector, embedded.provider))
    }

    /// Embed `query` and search with it.
    pub async fn search_text(
        &self,
        index: &str,
        query: &str,
        params: &SearchParams,
        provider: ProviderChoice,
        model: Option<String>,
    ) -> Result<TextSearchResult> {
        let filter = filter::translate_optional(params.filter.as_deref())?;
        if filter.as_ref().is_some_and(WireFilter::is_unsatisfiable) {
            let key = self.embeddings.key_for(provider, model.as_deref());
            return Ok(TextSearchResult::new(vec![], key.kind.as_str().to_string()));
        }
        let (vector, provider_name) = self.embed_query(query, provider, model).await?;
        let request = Self::request(vector, params, filter);
        request.validate()?;
        let hits = self.store.search(index, &request).await?;
        tracing::debug!(index, hits = hits.len(), provider = %provider_name, "text search");
        Ok(TextSearchResult::new(hits, provider_name))
    }

    /// Dense query embedding combined with a hashed term-frequency sparse vector.
    /// Dense components are scaled by `dense_weight`, sparse ones by `1 - dense_weight`.
    pub async fn hybrid_search(
        &self,
        index: &str,
        query: &str,
        params: &SearchParams,
        dense_weight: f32,
        provider: ProviderChoice,
    ) -> Result<TextSearchResult> {
        if !(0.0..=1.0).contains(&dense_weight) {
            return Err(Error::InvalidInput(format!(
                "dense_weight must be between 0 and 1, got {dense_weight}"
            )));
        }
        let filter = filter::translate_optional(params.filter.as_deref())?;
        if filter.as_ref().is_some_and(WireFilter::is_unsatisfiable) {
            let key = self.embeddings.key_for(provider, None);
            return Ok(TextSearchResult::new(vec![], key.kind.as_str().to_string()));
        }

        let info = self.store.describe_index(index).await?;
        if info.sparse_dim == 0 {
            return Err(Error::InvalidInput(format!(
                "index '{index}' has no sparse dimension; create it with sparse_dimension for hybrid search"
            )));
        }

        let (mut vector, provider_name) = self.embed_query(query, provider, None).await?;
        vector.iter_mut().for_each(|x| *x *= dense_weight);
        let (indices, mut values) = sparse_terms(query, info.sparse_dim);
        values.iter_mut().for_each(|x| *x *= 1.0 - dense_weight);

        let mut request = Self::request(vector, params, filter);
        request.sparse_indices = Some(indices);
        request.sparse_values = Some(values);
        request.validate()?;
        let hits = self.store.search(index, &request).await?;
        Ok(TextSearchResult::new(hits, provider_name))
    }

    /// Delete every vector matching `conditions`. An empty condition list is refused.
    pub async fn delete_by_filter(&self, index: &str, conditions: &[Value]) -> Result<u64> {
        if conditions.is_empty() {
            return Err(Error::InvalidInput(
                "refusing to delete with an empty filter".into(),
            ));
        }
        let filter = filter::translate(conditions)?;
        if filter.is_unsatisfiable() {
            tracing::debug!(index, "filter matches nothing, skipping delete");
            return Ok(0);
        }
        let deleted = self.store.delete_by_filter(index, &filter).await?;
        tracing::info!(index, deleted, "vectors deleted by filter");
        Ok(deleted)
    }
}

/// Lower-cased alphanumeric tokens hashed into `dim` buckets, counted by frequency.
/// Indices come back sorted and unique.
pub fn sparse_terms(text: &str, dim: usize) -> (Vec<u32>, Vec<f32>) {
    let dim = dim.max(1) as u32;
    let mut buckets: BTreeMap<u32, f32> = BTreeMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let token = token.to_lowercase();
        let bucket = XxHash32::oneshot(0, token.as_bytes()) % dim;
        *buckets.entry(bucket).or_default() += 1.0;
    }
    buckets.into_iter().unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sparse_terms_count_repeated_tokens() {
        let (indices, values) = sparse_terms("Rust rust, RUST!", 1000);
        assert_eq!(indices.len(), 1);
        assert_eq!(values, vec![3.0]);
    }

    #[test]
    fn sparse_terms_stay_in_range_and_sorted() {
        let (indices, values) = sparse_terms("the quick brown fox jumps over the lazy dog", 16);
        assert!(indices.iter().all(|&i| i < 16));
        assert!(indices.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(values.iter().sum::<f32>(), 9.0);
    }

    #[test]
    fn sparse_terms_of_empty_text() {
        let (indices, values) = sparse_terms("  ,, ", 8);
        assert!(indices.is_empty() && values.is_empty());
    }
}
