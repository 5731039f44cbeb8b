//! Request and response shapes exchanged with the Endee HTTP API.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::filter::WireFilter;

/// Distance metric of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpaceType {
    #[default]
    Cosine,
    L2,
    Ip,
}

/// Quantization level of stored vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Binary,
    #[default]
    Int8d,
    Int16d,
    Float16,
    Float32,
}

impl SpaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::L2 => "l2",
            Self::Ip => "ip",
        }
    }
}

impl fmt::Display for SpaceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpaceType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "cosine" => Ok(Self::Cosine),
            "l2" => Ok(Self::L2),
            "ip" => Ok(Self::Ip),
            _ => Err(format!("unknown space type: {s} (expected cosine, l2, ip)")),
        }
    }
}

impl Precision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Int8d => "int8d",
            Self::Int16d => "int16d",
            Self::Float16 => "float16",
            Self::Float32 => "float32",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "binary" => Ok(Self::Binary),
            "int8d" => Ok(Self::Int8d),
            "int16d" => Ok(Self::Int16d),
            "float16" => Ok(Self::Float16),
            "float32" => Ok(Self::Float32),
            _ => Err(format!(
                "unknown precision: {s} (expected binary, int8d, int16d, float16, float32)"
            )),
        }
    }
}

/// Parameters for creating an index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub space_type: SpaceType,
    pub precision: Precision,
    pub sparse_dimension: Option<usize>,
    pub m: usize,
    pub ef_construction: usize,
}

impl IndexSpec {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            space_type: SpaceType::default(),
            precision: Precision::default(),
            sparse_dimension: None,
            m: 16,
            ef_construction: 128,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidInput("index name must not be empty".into()));
        }
        check_bounds("dimension", self.dimension, 2, 16384)?;
        check_bounds("m", self.m, 4, 512)?;
        check_bounds("ef_construction", self.ef_construction, 8, 4096)?;
        if self.sparse_dimension == Some(0) {
            return Err(Error::InvalidInput(
                "sparse_dimension must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    /// Body for `POST /index/create`.
    pub fn to_payload(&self) -> Value {
        let mut payload = serde_json::json!({
            "index_name": self.name,
            "dim": self.dimension,
            "space_type": self.space_type.as_str(),
            "precision": self.precision.as_str(),
            "M": self.m,
            "ef_con": self.ef_construction,
        });
        if let Some(sparse) = self.sparse_dimension {
            payload["sparse_dim"] = Value::from(sparse);
        }
        payload
    }
}

pub(crate) fn check_bounds(name: &str, value: usize, min: usize, max: usize) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{name} must be between {min} and {max}, got {value}"
        )))
    }
}

/// Index description as reported by the server. Unknown fields are kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexInfo {
    #[serde(alias = "index_name")]
    pub name: String,
    #[serde(alias = "dim")]
    pub dimension: usize,
    #[serde(default)]
    pub space_type: Option<String>,
    #[serde(default)]
    pub precision: Option<String>,
    #[serde(default)]
    pub total_elements: u64,
    #[serde(default)]
    pub sparse_dim: usize,
    #[serde(default, alias = "M")]
    pub m: Option<usize>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A fully vectorized record as sent to `vector/insert`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorItem {
    pub id: String,
    pub vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub meta: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub filter: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_indices: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_values: Option<Vec<f32>>,
}

/// A record the store refused individually while accepting the rest of the upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedItem {
    pub id: String,
    pub error: Error,
}

/// Per-record status of one upsert call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpsertReport {
    pub rejected: Vec<RejectedItem>,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub vector: Option<Vec<f32>>,
    pub sparse_indices: Option<Vec<u32>>,
    pub sparse_values: Option<Vec<f32>>,
    pub top_k: usize,
    pub filter: Option<WireFilter>,
    pub ef: usize,
    pub include_vectors: bool,
}

impl SearchRequest {
    pub fn dense(vector: Vec<f32>, top_k: usize) -> Self {
        Self {
            vector: Some(vector),
            sparse_indices: None,
            sparse_values: None,
            top_k,
            filter: None,
            ef: 128,
            include_vectors: false,
        }
    }

    pub fn validate(&self) -> Result<()> {
        check_bounds("top_k", self.top_k, 1, 4096)?;
        check_bounds("ef", self.ef, 1, 1024)?;
        match (&self.sparse_indices, &self.sparse_values) {
            (Some(i), Some(v)) if i.len() != v.len() => Err(Error::InvalidInput(format!(
                "sparse_indices ({}) and sparse_values ({}) differ in length",
                i.len(),
                v.len()
            ))),
            (Some(_), None) | (None, Some(_)) => Err(Error::InvalidInput(
                "sparse_indices and sparse_values must be given together".into(),
            )),
            _ if self.vector.is_none() && self.sparse_indices.is_none() => Err(
                Error::InvalidInput("search needs a dense vector or sparse components".into()),
            ),
            _ => Ok(()),
        }
    }

    /// Body for `POST /index/{name}/search`. The filter travels as a JSON string.
    pub fn to_payload(&self) -> Value {
        let mut payload = serde_json::json!({
            "k": self.top_k,
            "ef": self.ef,
            "include_vectors": self.include_vectors,
        });
        if let Some(vector) = &self.vector {
            payload["vector"] = serde_json::json!(vector);
        }
        if let (Some(indices), Some(values)) = (&self.sparse_indices, &self.sparse_values) {
            if !indices.is_empty() {
                payload["sparse_indices"] = serde_json::json!(indices);
                payload["sparse_values"] = serde_json::json!(values);
            }
        }
        if let Some(filter) = self.filter.as_ref().filter(|f| !f.is_empty()) {
            payload["filter"] = Value::String(filter.to_json_string());
        }
        payload
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    #[serde(default)]
    pub similarity: f32,
    #[serde(default)]
    pub distance: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
}

/// New filter values for one stored vector.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FilterUpdate {
    #[schemars(description = "ID of the vector to update")]
    pub id: String,
    #[schemars(description = "Replacement filter fields, e.g. {\"category\": \"updated\"}")]
    pub filter: Map<String, Value>,
}

/// Server health as seen by this process.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    pub endee_url: String,
    pub timestamp: i64,
    pub embedding_provider: String,
    pub local_model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn index_spec_defaults_and_payload() {
        let spec = IndexSpec::new("docs", 384);
        assert_eq!(spec.space_type, SpaceType::Cosine);
        assert_eq!(spec.precision, Precision::Int8d);
        assert_eq!(spec.m, 16);
        assert_eq!(spec.ef_construction, 128);
        spec.validate().unwrap();

        let payload = spec.to_payload();
        assert_eq!(payload["index_name"], "docs");
        assert_eq!(payload["dim"], 384);
        assert_eq!(payload["M"], 16);
        assert_eq!(payload["ef_con"], 128);
        assert!(payload.get("sparse_dim").is_none());
    }

    #[test]
    fn index_spec_bounds() {
        assert!(IndexSpec::new("x", 1).validate().is_err());
        assert!(IndexSpec::new("x", 20000).validate().is_err());
        assert!(IndexSpec::new("", 384).validate().is_err());
        let mut spec = IndexSpec::new("x", 384);
        spec.m = 2;
        assert!(spec.validate().is_err());
        spec.m = 16;
        spec.sparse_dimension = Some(30000);
        spec.validate().unwrap();
        assert_eq!(spec.to_payload()["sparse_dim"], 30000);
    }

    #[test]
    fn search_payload_encodes_filter_as_string() {
        let filter =
            crate::filter::translate(&[json!({"category": {"$eq": "tech"}})]).unwrap();
        let mut request = SearchRequest::dense(vec![0.1, 0.2], 5);
        request.filter = Some(filter);
        request.validate().unwrap();

        let payload = request.to_payload();
        assert_eq!(payload["k"], 5);
        assert_eq!(payload["ef"], 128);
        assert_eq!(
            payload["filter"],
            Value::String(r#"[{"category":{"$eq":"tech"}}]"#.into())
        );
    }

    #[test]
    fn search_request_validation() {
        let mut request = SearchRequest::dense(vec![0.1], 0);
        assert!(request.validate().is_err());
        request.top_k = 10;
        request.ef = 2000;
        assert!(request.validate().is_err());
        request.ef = 64;
        request.sparse_indices = Some(vec![1, 2]);
        assert!(request.validate().is_err());
        request.sparse_values = Some(vec![0.5]);
        assert!(request.validate().is_err());
        request.sparse_values = Some(vec![0.5, 0.25]);
        request.validate().unwrap();
    }

    #[test]
    fn vector_item_omits_empty_fields() {
        let item = VectorItem {
            id: "a".into(),
            vector: vec![1.0],
            meta: Map::new(),
            filter: Map::new(),
            sparse_indices: None,
            sparse_values: None,
        };
        assert_eq!(serde_json::to_value(&item).unwrap(), json!({"id": "a", "vector": [1.0]}));
    }

    #[test]
    fn index_info_accepts_server_field_names() {
        let info: IndexInfo = serde_json::from_value(json!({
            "index_name": "docs",
            "dim": 768,
            "space_type": "cosine",
            "total_elements": 42,
            "M": 32,
            "checksum": "abc"
        }))
        .unwrap();
        assert_eq!(info.name, "docs");
        assert_eq!(info.dimension, 768);
        assert_eq!(info.total_elements, 42);
        assert_eq!(info.m, Some(32));
        assert_eq!(info.extra["checksum"], "abc");
    }
}
