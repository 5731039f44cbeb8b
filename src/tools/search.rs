use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::embedding::ProviderChoice;
use crate::query::SearchParams;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchVectorParams {
    #[schemars(description = "Index to search")]
    pub index_name: String,

    #[schemars(description = "Query vector, same dimension as the index")]
    pub vector: Vec<f32>,

    #[schemars(description = "Number of results (1-4096). Defaults to 10.")]
    pub top_k: Option<usize>,

    #[schemars(description = "Optional filter conditions: [{\"field\": {\"$eq\" | \"$in\" | \"$range\": ...}}]")]
    pub filter: Option<Vec<Value>>,

    #[schemars(description = "Search quality ef (1-1024). Defaults to 128.")]
    pub ef: Option<usize>,

    #[schemars(description = "Return stored vectors with each hit. Defaults to false.")]
    pub include_vectors: Option<bool>,
}

impl SearchVectorParams {
    pub fn search_params(&self) -> SearchParams {
        build(self.top_k, self.ef, self.include_vectors, self.filter.clone())
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SearchTextParams {
    #[schemars(description = "Index to search")]
    pub index_name: String,

    #[schemars(description = "Natural language query, embedded before searching")]
    pub query: String,

    #[schemars(description = "Number of results (1-4096). Defaults to 10.")]
    pub top_k: Option<usize>,

    #[schemars(description = "Optional filter conditions")]
    pub filter: Option<Vec<Value>>,

    #[schemars(description = "Search quality ef (1-1024). Defaults to 128.")]
    pub ef: Option<usize>,

    #[schemars(description = "Embedding provider: 'auto' (default), 'openai', 'local', or 'none'")]
    pub embedding_provider: Option<ProviderChoice>,

    #[schemars(description = "Override the provider's configured model")]
    pub embedding_model: Option<String>,
}

impl SearchTextParams {
    pub fn search_params(&self) -> SearchParams {
        build(self.top_k, self.ef, None, self.filter.clone())
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct HybridSearchParams {
    #[schemars(description = "Index created with a sparse dimension")]
    pub index_name: String,

    #[schemars(description = "Search query text")]
    pub query: String,

    #[schemars(description = "Number of results (1-4096). Defaults to 10.")]
    pub top_k: Option<usize>,

    #[schemars(description = "Optional filter conditions")]
    pub filter: Option<Vec<Value>>,

    #[schemars(description = "Weight of the dense part, 0.0-1.0. The sparse part gets the rest. Defaults to 0.7.")]
    pub dense_weight: Option<f32>,

    #[schemars(description = "Embedding provider for the dense part: 'auto' (default), 'openai', or 'local'")]
    pub embedding_provider: Option<ProviderChoice>,
}

impl HybridSearchParams {
    pub fn search_params(&self) -> SearchParams {
        build(self.top_k, None, None, self.filter.clone())
    }
}

fn build(
    top_k: Option<usize>,
    ef: Option<usize>,
    include_vectors: Option<bool>,
    filter: Option<Vec<Value>>,
) -> SearchParams {
    let defaults = SearchParams::default();
    SearchParams {
        top_k: top_k.unwrap_or(defaults.top_k),
        ef: ef.unwrap_or(defaults.ef),
        include_vectors: include_vectors.unwrap_or(defaults.include_vectors),
        filter,
    }
}
