use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::storage::types::{Precision, SpaceType};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CreateIndexParams {
    #[schemars(description = "Unique name for the index")]
    pub name: String,

    #[schemars(description = "Vector dimensionality (2-16384). Must match the embedding model, e.g. 384 for all-MiniLM-L6-v2, 1536 for text-embedding-3-small.")]
    pub dimension: usize,

    #[schemars(description = "Distance metric: 'cosine' (default), 'l2', or 'ip'")]
    pub space_type: Option<SpaceType>,

    #[schemars(description = "Quantization level: 'binary', 'int8d' (default), 'int16d', 'float16', 'float32'")]
    pub precision: Option<Precision>,

    #[schemars(description = "Sparse vector dimension. Set to enable hybrid search.")]
    pub sparse_dimension: Option<usize>,

    #[schemars(description = "HNSW connectivity M (4-512). Defaults to 16.")]
    pub m: Option<usize>,

    #[schemars(description = "HNSW build quality ef_construction (8-4096). Defaults to 128.")]
    pub ef_construction: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ListIndexesParams {}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DescribeIndexParams {
    #[schemars(description = "Name of the index")]
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct DeleteIndexParams {
    #[schemars(description = "Name of the index to delete")]
    pub name: String,

    #[schemars(description = "Must be true. Deletes the index and all of its vectors.")]
    pub confirm: Option<bool>,
}
