use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::embedding::ProviderChoice;
use crate::records::FieldMapping;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ImportJsonParams {
    #[schemars(description = "Target index name")]
    pub index_name: String,

    #[schemars(description = "Path to a .json file (array of objects) or .jsonl file (one object per line)")]
    pub file_path: String,

    #[schemars(description = "Field holding the record ID. Defaults to 'id'.")]
    pub id_field: Option<String>,

    #[schemars(description = "Field with text to embed, used when the record has no vector")]
    pub text_field: Option<String>,

    #[schemars(description = "Field with a precomputed vector")]
    pub vector_field: Option<String>,

    #[schemars(description = "Fields copied into metadata")]
    pub meta_fields: Option<Vec<String>>,

    #[schemars(description = "Fields copied into filter fields")]
    pub filter_fields: Option<Vec<String>>,

    #[schemars(description = "Records per chunk. Defaults to the configured batch size (100).")]
    pub batch_size: Option<usize>,

    #[schemars(description = "Embedding provider: 'auto' (default), 'openai', 'local', or 'none'")]
    pub embedding_provider: Option<ProviderChoice>,

    #[schemars(description = "Override the provider's configured model")]
    pub embedding_model: Option<String>,
}

impl ImportJsonParams {
    pub fn mapping(&self) -> FieldMapping {
        FieldMapping::columns(
            self.id_field.clone().unwrap_or_else(|| "id".into()),
            self.text_field.clone(),
            self.vector_field.clone(),
            self.meta_fields.clone(),
            self.filter_fields.clone(),
        )
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ImportCsvParams {
    #[schemars(description = "Target index name")]
    pub index_name: String,

    #[schemars(description = "Path to a CSV file with a header row")]
    pub file_path: String,

    #[schemars(description = "Column holding the record ID. Defaults to 'id'.")]
    pub id_column: Option<String>,

    #[schemars(description = "Column with text to embed, used when the row has no vector")]
    pub text_column: Option<String>,

    #[schemars(description = "Column with a precomputed vector as a JSON array, e.g. \"[0.1, 0.2]\"")]
    pub vector_column: Option<String>,

    #[schemars(description = "Columns copied into metadata as strings")]
    pub meta_columns: Option<Vec<String>>,

    #[schemars(description = "Columns copied into filter fields. Numbers and booleans are typed.")]
    pub filter_columns: Option<Vec<String>>,

    #[schemars(description = "Single-character delimiter. Defaults to ','.")]
    pub delimiter: Option<String>,

    #[schemars(description = "Records per chunk. Defaults to the configured batch size (100).")]
    pub batch_size: Option<usize>,

    #[schemars(description = "Embedding provider: 'auto' (default), 'openai', 'local', or 'none'")]
    pub embedding_provider: Option<ProviderChoice>,

    #[schemars(description = "Override the provider's configured model")]
    pub embedding_model: Option<String>,
}

impl ImportCsvParams {
    pub fn mapping(&self) -> FieldMapping {
        FieldMapping::columns(
            self.id_column.clone().unwrap_or_else(|| "id".into()),
            self.text_column.clone(),
            self.vector_column.clone(),
            self.meta_columns.clone(),
            self.filter_columns.clone(),
        )
    }
}
