//! Record normalization.
//!
//! Raw input arrives as pre-vectorized objects, text documents, JSON mappings, or CSV
//! rows. [`normalize`] maps all of them onto [`Record`] using a [`FieldMapping`], and
//! collects per-record failures in [`Normalized::rejected`] without stopping.

use serde_json::{Map, Number, Value};

use crate::error::{Error, Result};
use crate::storage::types::VectorItem;

/// Where a raw record came from. CSV cells are always strings and get decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    Json,
    Csv,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub kind: RawKind,
    pub fields: Map<String, Value>,
    /// Set when the source row could not be read; normalization rejects it.
    pub unreadable: Option<String>,
}

impl RawRecord {
    pub fn json(fields: Map<String, Value>) -> Self {
        Self {
            kind: RawKind::Json,
            fields,
            unreadable: None,
        }
    }

    /// Build from a CSV header row and one data row.
    pub fn csv<'a>(
        headers: impl IntoIterator<Item = &'a str>,
        cells: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let fields = headers
            .into_iter()
            .zip(cells)
            .map(|(h, c)| (h.to_string(), Value::String(c.to_string())))
            .collect();
        Self {
            kind: RawKind::Csv,
            fields,
            unreadable: None,
        }
    }

    /// Placeholder for a CSV row the reader could not parse.
    pub fn unreadable_csv(reason: impl Into<String>) -> Self {
        Self {
            kind: RawKind::Csv,
            fields: Map::new(),
            unreadable: Some(reason.into()),
        }
    }

    /// Wrap a JSON value; non-objects become an empty record that fails normalization.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::json(fields),
            _ => Self::json(Map::new()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

/// The dense part of a record: either ready-made or still to be embedded.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    Vector(Vec<f32>),
    Text(String),
}

/// Canonical record shape consumed by the ingestion pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: String,
    pub payload: RecordPayload,
    pub meta: Map<String, Value>,
    pub filter: Map<String, Value>,
    pub sparse: Option<SparseVector>,
}

impl Record {
    pub fn with_vector(id: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            id: id.into(),
            payload: RecordPayload::Vector(vector),
            meta: Map::new(),
            filter: Map::new(),
            sparse: None,
        }
    }

    pub fn with_text(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: RecordPayload::Text(text.into()),
            meta: Map::new(),
            filter: Map::new(),
            sparse: None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            RecordPayload::Text(t) => Some(t),
            RecordPayload::Vector(_) => None,
        }
    }

    /// Turn into the wire item, using `embedding` for text records.
    pub fn into_item(self, embedding: Option<Vec<f32>>) -> VectorItem {
        let vector = match self.payload {
            RecordPayload::Vector(v) => v,
            RecordPayload::Text(_) => embedding.unwrap_or_default(),
        };
        let (sparse_indices, sparse_values) = match self.sparse {
            Some(s) => (Some(s.indices), Some(s.values)),
            None => (None, None),
        };
        VectorItem {
            id: self.id,
            vector,
            meta: self.meta,
            filter: self.filter,
            sparse_indices,
            sparse_values,
        }
    }
}

/// How a group of output fields is picked from the raw record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldSelection {
    /// Nothing is selected.
    #[default]
    None,
    /// Copy a nested object found under this key.
    Nested(String),
    /// Copy these top-level keys; absent keys are skipped.
    Fields(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldMapping {
    pub id_field: String,
    pub text_field: Option<String>,
    pub vector_field: Option<String>,
    pub meta: FieldSelection,
    pub filter: FieldSelection,
    pub sparse_indices_field: Option<String>,
    pub sparse_values_field: Option<String>,
}

impl FieldMapping {
    /// The object shape accepted by `upsert_vectors` and `upsert_documents`:
    /// `{id, vector | text, meta, filter, sparse_indices, sparse_values}`.
    pub fn canonical() -> Self {
        Self {
            id_field: "id".into(),
            text_field: Some("text".into()),
            vector_field: Some("vector".into()),
            meta: FieldSelection::Nested("meta".into()),
            filter: FieldSelection::Nested("filter".into()),
            sparse_indices_field: Some("sparse_indices".into()),
            sparse_values_field: Some("sparse_values".into()),
        }
    }

    /// Flat column mapping used by the JSON and CSV importers.
    pub fn columns(
        id_field: impl Into<String>,
        text_field: Option<String>,
        vector_field: Option<String>,
        meta_fields: Option<Vec<String>>,
        filter_fields: Option<Vec<String>>,
    ) -> Self {
        let select = |fields: Option<Vec<String>>| match fields {
            Some(f) if !f.is_empty() => FieldSelection::Fields(f),
            _ => FieldSelection::None,
        };
        Self {
            id_field: id_field.into(),
            text_field,
            vector_field,
            meta: select(meta_fields),
            filter: select(filter_fields),
            sparse_indices_field: None,
            sparse_values_field: None,
        }
    }
}

/// A raw record that could not be normalized.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    /// Position in the input.
    pub index: usize,
    pub id: Option<String>,
    pub error: Error,
}

impl RejectedRecord {
    /// The id if known, otherwise `#<position>`.
    pub fn label(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("#{}", self.index))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub records: Vec<Record>,
    pub rejected: Vec<RejectedRecord>,
}

/// Normalize every raw record; failures land in `rejected`, input order is kept.
pub fn normalize(raw_records: Vec<RawRecord>, mapping: &FieldMapping) -> Normalized {
    let mut out = Normalized::default();
    for (index, raw) in raw_records.into_iter().enumerate() {
        match normalize_one(index, &raw, mapping) {
            Ok(record) => out.records.push(record),
            Err((id, error)) => {
                tracing::debug!(index, id = ?id, error = %error, "record rejected");
                out.rejected.push(RejectedRecord { index, id, error });
            }
        }
    }
    out
}

type RecordFailure = (Option<String>, Error);

fn normalize_one(
    index: usize,
    raw: &RawRecord,
    mapping: &FieldMapping,
) -> std::result::Result<Record, RecordFailure> {
    if let Some(reason) = &raw.unreadable {
        return Err((None, Error::InvalidInput(reason.clone())));
    }
    let id = extract_id(raw, &mapping.id_field).ok_or_else(|| {
        (
            None,
            Error::MissingIdentifier {
                index,
                field: mapping.id_field.clone(),
            },
        )
    })?;
    let fail = |error: Error| (Some(id.clone()), error);

    let vector = match mapping.vector_field.as_deref() {
        Some(field) => extract_vector(raw, field, &id).map_err(fail)?,
        None => None,
    };

    // A supplied vector always wins; the text is never embedded then.
    let payload = match vector {
        Some(v) => RecordPayload::Vector(v),
        None => {
            let text = match mapping.text_field.as_deref() {
                Some(field) => extract_text(raw, field, &id).map_err(fail)?,
                None => None,
            };
            match text {
                Some(t) => RecordPayload::Text(t),
                None => {
                    return Err(fail(Error::InvalidInput(format!(
                        "record '{id}' has neither text nor vector"
                    ))))
                }
            }
        }
    };

    let meta = select_meta(raw, &mapping.meta, &id).map_err(fail)?;
    let filter = select_filter(raw, &mapping.filter, &id).map_err(fail)?;
    let sparse = extract_sparse(raw, mapping, &id).map_err(fail)?;

    Ok(Record {
        id,
        payload,
        meta,
        filter,
        sparse,
    })
}

fn extract_id(raw: &RawRecord, field: &str) -> Option<String> {
    match raw.fields.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Field value, skipping nulls and, for CSV, empty cells.
fn present<'a>(raw: &'a RawRecord, field: &str) -> Option<&'a Value> {
    match raw.fields.get(field)? {
        Value::Null => None,
        Value::String(s) if raw.kind == RawKind::Csv && s.trim().is_empty() => None,
        value => Some(value),
    }
}

/// Arrays arrive as JSON arrays, or as JSON text inside a CSV cell.
fn decode_array(raw: &RawRecord, value: &Value) -> Option<Vec<Value>> {
    match (raw.kind, value) {
        (_, Value::Array(items)) => Some(items.clone()),
        (RawKind::Csv, Value::String(s)) => serde_json::from_str::<Vec<Value>>(s).ok(),
        _ => None,
    }
}

fn extract_vector(raw: &RawRecord, field: &str, id: &str) -> Result<Option<Vec<f32>>> {
    let Some(value) = present(raw, field) else {
        return Ok(None);
    };
    let invalid = || {
        Error::InvalidInput(format!(
            "record '{id}': field '{field}' must be an array of numbers"
        ))
    };
    let items = decode_array(raw, value).ok_or_else(invalid)?;
    if items.is_empty() {
        return Err(Error::InvalidInput(format!("record '{id}': vector is empty")));
    }
    items
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32).ok_or_else(invalid))
        .collect::<Result<Vec<_>>>()
        .map(Some)
}

fn extract_text(raw: &RawRecord, field: &str, id: &str) -> Result<Option<String>> {
    match raw.fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Err(Error::InvalidInput(format!(
            "record '{id}': text field '{field}' is empty"
        ))),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(Error::InvalidInput(format!(
            "record '{id}': text field '{field}' must be a string"
        ))),
    }
}

fn select_meta(raw: &RawRecord, selection: &FieldSelection, id: &str) -> Result<Map<String, Value>> {
    match selection {
        FieldSelection::None => Ok(Map::new()),
        FieldSelection::Nested(key) => nested_object(raw, key, id),
        FieldSelection::Fields(fields) => Ok(fields
            .iter()
            .filter_map(|f| raw.fields.get(f).map(|v| (f.clone(), v.clone())))
            .collect()),
    }
}

fn select_filter(
    raw: &RawRecord,
    selection: &FieldSelection,
    id: &str,
) -> Result<Map<String, Value>> {
    let candidates: Vec<(String, Value)> = match selection {
        FieldSelection::None => return Ok(Map::new()),
        FieldSelection::Nested(key) => nested_object(raw, key, id)?.into_iter().collect(),
        FieldSelection::Fields(fields) => fields
            .iter()
            .filter_map(|f| present(raw, f).map(|v| (f.clone(), v.clone())))
            .collect(),
    };

    let mut filter = Map::new();
    for (field, value) in candidates {
        let value = match (raw.kind, value) {
            (_, Value::Null) => continue,
            (RawKind::Csv, Value::String(s)) => coerce_scalar(&s),
            (_, v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => v,
            _ => {
                return Err(Error::InvalidInput(format!(
                    "record '{id}': filter field '{field}' must be a string, number or boolean"
                )))
            }
        };
        filter.insert(field, value);
    }
    Ok(filter)
}

fn nested_object(raw: &RawRecord, key: &str, id: &str) -> Result<Map<String, Value>> {
    match raw.fields.get(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(Error::InvalidInput(format!(
            "record '{id}': '{key}' must be an object"
        ))),
    }
}

/// CSV cell → typed scalar, so numeric and boolean columns filter as such.
fn coerce_scalar(cell: &str) -> Value {
    let trimmed = cell.trim();
    if let Ok(b) = trimmed.parse::<bool>() {
        return Value::Bool(b);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Some(n) = trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        return Value::Number(n);
    }
    Value::String(cell.to_string())
}

fn extract_sparse(raw: &RawRecord, mapping: &FieldMapping, id: &str) -> Result<Option<SparseVector>> {
    let indices = mapping
        .sparse_indices_field
        .as_deref()
        .and_then(|f| present(raw, f));
    let values = mapping
        .sparse_values_field
        .as_deref()
        .and_then(|f| present(raw, f));

    let (indices, values) = match (indices, values) {
        (None, None) => return Ok(None),
        (Some(i), Some(v)) => (i, v),
        _ => {
            return Err(Error::InvalidInput(format!(
                "record '{id}': sparse_indices and sparse_values must be given together"
            )))
        }
    };

    let invalid = |what: &str| Error::InvalidInput(format!("record '{id}': {what}"));
    let indices = decode_array(raw, indices)
        .ok_or_else(|| invalid("sparse_indices must be an array"))?
        .iter()
        .map(|v| {
            v.as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .ok_or_else(|| invalid("sparse_indices must be non-negative integers"))
        })
        .collect::<Result<Vec<_>>>()?;
    let values = decode_array(raw, values)
        .ok_or_else(|| invalid("sparse_values must be an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| invalid("sparse_values must be numbers"))
        })
        .collect::<Result<Vec<_>>>()?;

    if indices.len() != values.len() {
        return Err(invalid(&format!(
            "sparse_indices ({}) and sparse_values ({}) differ in length",
            indices.len(),
            values.len()
        )));
    }
    Ok(Some(SparseVector { indices, values }))
}
