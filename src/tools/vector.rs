use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::embedding::ProviderChoice;
use crate::storage::types::FilterUpdate;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpsertVectorsParams {
    #[schemars(description = "Target index name")]
    pub index_name: String,

    #[schemars(description = "Vectors to insert or replace: [{id, vector, meta?, filter?, sparse_indices?, sparse_values?}]")]
    pub vectors: Vec<Value>,

    #[schemars(description = "Records per upsert request. Defaults to the configured batch size (100).")]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpsertDocumentsParams {
    #[schemars(description = "Target index name")]
    pub index_name: String,

    #[schemars(description = "Documents to embed and store: [{id, text, meta?, filter?}]. A document that already carries a vector is stored as-is.")]
    pub documents: Vec<Value>,

    #[schemars(description = "Embedding provider: 'auto' (default), 'openai', 'local', or 'none'")]
    pub embedding_provider: Option<ProviderChoice>,

    #[schemars(description = "Override the provider's configured model")]
    pub embedding_model: Option<String>,

    #[schemars(description = "Records per chunk. Defaults to the configured batch size (100).")]
    pub batch_size: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetVectorParams {
    #[schemars(description = "Index name")]
    pub index_name: String,

    #[schemars(description = "Vector ID")]
    pub vector_id: String,

    #[schemars(description = "Include the vector values in the response. Defaults to false.")]
    pub include_vector: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteVectorParams {
    #[schemars(description = "Index name")]
    pub index_name: String,

    #[schemars(description = "Vector ID to delete")]
    pub vector_id: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteByFilterParams {
    #[schemars(description = "Index name")]
    pub index_name: String,

    #[schemars(description = "Filter conditions, ANDed: [{\"field\": {\"$eq\": v}}, {\"field\": {\"$in\": [..]}}, {\"field\": {\"$range\": [min, max]}}]. Must not be empty.")]
    pub filter: Vec<Value>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UpdateFiltersParams {
    #[schemars(description = "Index name")]
    pub index_name: String,

    #[schemars(description = "Filter replacements: [{id, filter: {field: value}}]")]
    pub updates: Vec<FilterUpdate>,
}
