pub mod backup;
pub mod batch;
pub mod index;
pub mod search;
pub mod system;
pub mod vector;

use std::path::Path;
use std::sync::Arc;

use backup::{CreateBackupParams, DeleteBackupParams, ListBackupsParams, RestoreBackupParams};
use batch::{ImportCsvParams, ImportJsonParams};
use index::{CreateIndexParams, DeleteIndexParams, DescribeIndexParams, ListIndexesParams};
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search::{HybridSearchParams, SearchTextParams, SearchVectorParams};
use serde::Serialize;
use serde_json::{json, Value};
use system::{GetConfigParams, HealthCheckParams};
use vector::{
    DeleteByFilterParams, DeleteVectorParams, GetVectorParams, UpdateFiltersParams,
    UpsertDocumentsParams, UpsertVectorsParams,
};

use crate::config::EndeeMcpConfig;
use crate::embedding::{EmbeddingManager, ProviderChoice};
use crate::error::Error;
use crate::import;
use crate::ingest::{BatchOutcome, IngestOptions, IngestPipeline};
use crate::query::{QueryService, DEFAULT_DENSE_WEIGHT};
use crate::records::{self, FieldMapping, RawRecord};
use crate::storage::types::{HealthStatus, IndexSpec};
use crate::storage::VectorStore;

type ToolResult = Result<String, String>;

/// Render a domain error as `CODE: message`.
fn fail(e: Error) -> String {
    e.to_tool_message()
}

fn to_json(value: &impl Serialize) -> ToolResult {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

fn require_confirm(confirm: Option<bool>, what: &str) -> Result<(), String> {
    if confirm == Some(true) {
        Ok(())
    } else {
        Err(fail(Error::InvalidInput(format!(
            "set confirm=true to delete {what}"
        ))))
    }
}

/// The Endee MCP tool handler. Holds the store, the embedding manager and config,
/// and exposes every tool via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct EndeeTools {
    tool_router: ToolRouter<Self>,
    store: Arc<dyn VectorStore>,
    embeddings: Arc<EmbeddingManager>,
    config: Arc<EndeeMcpConfig>,
    pipeline: Arc<IngestPipeline>,
    query: Arc<QueryService>,
}

impl EndeeTools {
    /// Normalize raw records, ingest them, and fold normalizer rejections into the outcome.
    async fn ingest_raw(
        &self,
        index: &str,
        raw: Vec<RawRecord>,
        mapping: &FieldMapping,
        options: IngestOptions,
    ) -> Result<BatchOutcome, String> {
        let normalized = records::normalize(raw, mapping);
        let mut outcome = self
            .pipeline
            .ingest(index, normalized.records, &options)
            .await
            .map_err(fail)?;
        outcome.add_rejected(&normalized.rejected);
        Ok(outcome)
    }

    fn ingest_options(&self) -> IngestOptions {
        IngestOptions::from_config(&self.config.ingest)
    }
}

fn outcome_json(index: &str, outcome: &BatchOutcome) -> ToolResult {
    let mut value = serde_json::to_value(outcome).map_err(|e| format!("serialization failed: {e}"))?;
    value["index_name"] = json!(index);
    value["success"] = json!(outcome.failed.is_empty());
    to_json(&value)
}

#[tool_router]
impl EndeeTools {
    pub fn new(
        store: Arc<dyn VectorStore>,
        embeddings: Arc<EmbeddingManager>,
        config: Arc<EndeeMcpConfig>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            pipeline: Arc::new(IngestPipeline::new(Arc::clone(&store), Arc::clone(&embeddings))),
            query: Arc::new(QueryService::new(Arc::clone(&store), Arc::clone(&embeddings))),
            store,
            embeddings,
            config,
        }
    }

    #[tool(description = "Create a vector index. Choose the dimension of your embedding model; set sparse_dimension to enable hybrid search.")]
    async fn endee_create_index(
        &self,
        Parameters(params): Parameters<CreateIndexParams>,
    ) -> ToolResult {
        let mut spec = IndexSpec::new(params.name, params.dimension);
        spec.space_type = params.space_type.unwrap_or_default();
        spec.precision = params.precision.unwrap_or_default();
        spec.sparse_dimension = params.sparse_dimension;
        spec.m = params.m.unwrap_or(spec.m);
        spec.ef_construction = params.ef_construction.unwrap_or(spec.ef_construction);
        spec.validate().map_err(fail)?;

        tracing::info!(index = %spec.name, dim = spec.dimension, "endee_create_index called");
        let message = self.store.create_index(&spec).await.map_err(fail)?;
        to_json(&json!({ "success": true, "index_name": spec.name, "message": message }))
    }

    #[tool(description = "List all indexes with their dimension, metric and size.")]
    async fn endee_list_indexes(
        &self,
        Parameters(_params): Parameters<ListIndexesParams>,
    ) -> ToolResult {
        let indexes = self.store.list_indexes().await.map_err(fail)?;
        to_json(&json!({ "total": indexes.len(), "indexes": indexes }))
    }

    #[tool(description = "Get details of one index.")]
    async fn endee_describe_index(
        &self,
        Parameters(params): Parameters<DescribeIndexParams>,
    ) -> ToolResult {
        let info = self.store.describe_index(&params.name).await.map_err(fail)?;
        to_json(&info)
    }

    #[tool(description = "Delete an index and all its vectors. Requires confirm=true.")]
    async fn endee_delete_index(
        &self,
        Parameters(params): Parameters<DeleteIndexParams>,
    ) -> ToolResult {
        require_confirm(params.confirm, &format!("index '{}'", params.name))?;
        tracing::info!(index = %params.name, "endee_delete_index called");
        let message = self.store.delete_index(&params.name).await.map_err(fail)?;
        to_json(&json!({ "success": true, "message": message }))
    }

    #[tool(description = "Insert or replace precomputed vectors: [{id, vector, meta?, filter?, sparse_indices?, sparse_values?}]. Reports per-record failures.")]
    async fn endee_upsert_vectors(
        &self,
        Parameters(params): Parameters<UpsertVectorsParams>,
    ) -> ToolResult {
        tracing::info!(index = %params.index_name, count = params.vectors.len(), "endee_upsert_vectors called");
        let mapping = FieldMapping {
            text_field: None,
            ..FieldMapping::canonical()
        };
        let raw = params.vectors.into_iter().map(RawRecord::from_value).collect();
        let options = self.ingest_options().with_batch_size(params.batch_size);
        let outcome = self
            .ingest_raw(&params.index_name, raw, &mapping, options)
            .await?;
        outcome_json(&params.index_name, &outcome)
    }

    #[tool(description = "Embed and store text documents: [{id, text, meta?, filter?}]. Embeds in chunks and reports per-record failures.")]
    async fn endee_upsert_documents(
        &self,
        Parameters(params): Parameters<UpsertDocumentsParams>,
    ) -> ToolResult {
        tracing::info!(index = %params.index_name, count = params.documents.len(), "endee_upsert_documents called");
        let raw = params.documents.into_iter().map(RawRecord::from_value).collect();
        let options = self
            .ingest_options()
            .with_batch_size(params.batch_size)
            .with_provider(params.embedding_provider, params.embedding_model);
        let outcome = self
            .ingest_raw(&params.index_name, raw, &FieldMapping::canonical(), options)
            .await?;
        outcome_json(&params.index_name, &outcome)
    }

    #[tool(description = "Fetch one vector by ID with its metadata and filter fields.")]
    async fn endee_get_vector(
        &self,
        Parameters(params): Parameters<GetVectorParams>,
    ) -> ToolResult {
        let found = self
            .store
            .get_vector(&params.index_name, &params.vector_id)
            .await
            .map_err(fail)?;
        match found {
            Some(mut value) => {
                if !params.include_vector.unwrap_or(false) {
                    if let Some(obj) = value.as_object_mut() {
                        obj.remove("vector");
                    }
                }
                to_json(&json!({ "found": true, "vector": value }))
            }
            None => to_json(&json!({ "found": false, "id": params.vector_id })),
        }
    }

    #[tool(description = "Delete one vector by ID.")]
    async fn endee_delete_vector(
        &self,
        Parameters(params): Parameters<DeleteVectorParams>,
    ) -> ToolResult {
        let message = self
            .store
            .delete_vector(&params.index_name, &params.vector_id)
            .await
            .map_err(fail)?;
        to_json(&json!({ "success": true, "message": message }))
    }

    #[tool(description = "Delete every vector matching the filter conditions ($eq, $in, $range; ANDed). An empty filter is refused.")]
    async fn endee_delete_by_filter(
        &self,
        Parameters(params): Parameters<DeleteByFilterParams>,
    ) -> ToolResult {
        tracing::info!(index = %params.index_name, conditions = params.filter.len(), "endee_delete_by_filter called");
        let deleted = self
            .query
            .delete_by_filter(&params.index_name, &params.filter)
            .await
            .map_err(fail)?;
        to_json(&json!({ "success": true, "deleted_count": deleted }))
    }

    #[tool(description = "Replace the filter fields of existing vectors: [{id, filter}].")]
    async fn endee_update_filters(
        &self,
        Parameters(params): Parameters<UpdateFiltersParams>,
    ) -> ToolResult {
        if let Some(pos) = params.updates.iter().position(|u| u.id.trim().is_empty()) {
            return Err(fail(Error::MissingIdentifier {
                index: pos,
                field: "id".into(),
            }));
        }
        let message = self
            .store
            .update_filters(&params.index_name, &params.updates)
            .await
            .map_err(fail)?;
        to_json(&json!({
            "success": true,
            "updated": params.updates.len(),
            "message": message,
        }))
    }

    #[tool(description = "Nearest-neighbour search with a query vector, optionally filtered.")]
    async fn endee_search(
        &self,
        Parameters(params): Parameters<SearchVectorParams>,
    ) -> ToolResult {
        let search = params.search_params();
        let hits = self
            .query
            .search(&params.index_name, params.vector, &search)
            .await
            .map_err(fail)?;
        to_json(&json!({ "total_results": hits.len(), "results": hits }))
    }

    #[tool(description = "Semantic search with a natural language query. The query is embedded with the chosen provider.")]
    async fn endee_search_text(
        &self,
        Parameters(params): Parameters<SearchTextParams>,
    ) -> ToolResult {
        tracing::info!(index = %params.index_name, "endee_search_text called");
        let search = params.search_params();
        let result = self
            .query
            .search_text(
                &params.index_name,
                &params.query,
                &search,
                params.embedding_provider.unwrap_or_default(),
                params.embedding_model,
            )
            .await
            .map_err(fail)?;
        to_json(&result)
    }

    #[tool(description = "Hybrid dense + sparse search on an index with a sparse dimension. dense_weight balances the two parts.")]
    async fn endee_hybrid_search(
        &self,
        Parameters(params): Parameters<HybridSearchParams>,
    ) -> ToolResult {
        let search = params.search_params();
        let dense_weight = params.dense_weight.unwrap_or(DEFAULT_DENSE_WEIGHT);
        let result = self
            .query
            .hybrid_search(
                &params.index_name,
                &params.query,
                &search,
                dense_weight,
                params.embedding_provider.unwrap_or(ProviderChoice::Auto),
            )
            .await
            .map_err(fail)?;
        let mut value = serde_json::to_value(&result).map_err(|e| format!("serialization failed: {e}"))?;
        value["search_type"] = json!("hybrid");
        value["dense_weight"] = json!(dense_weight);
        to_json(&value)
    }

    #[tool(description = "Import records from a JSON array file or JSONL file. Records with a vector field are stored as-is; others are embedded from text_field.")]
    async fn endee_import_json(
        &self,
        Parameters(params): Parameters<ImportJsonParams>,
    ) -> ToolResult {
        tracing::info!(index = %params.index_name, file = %params.file_path, "endee_import_json called");
        let raw = import::read_json_records(Path::new(&params.file_path))
            .await
            .map_err(fail)?;
        let mapping = params.mapping();
        let options = self
            .ingest_options()
            .with_batch_size(params.batch_size)
            .with_provider(params.embedding_provider, params.embedding_model.clone());
        let outcome = self
            .ingest_raw(&params.index_name, raw, &mapping, options)
            .await?;
        outcome_json(&params.index_name, &outcome)
    }

    #[tool(description = "Import rows from a CSV file with a header row. Vector columns hold JSON arrays; text columns are embedded.")]
    async fn endee_import_csv(
        &self,
        Parameters(params): Parameters<ImportCsvParams>,
    ) -> ToolResult {
        tracing::info!(index = %params.index_name, file = %params.file_path, "endee_import_csv called");
        let delimiter = import::parse_delimiter(params.delimiter.as_deref().unwrap_or(","))
            .map_err(fail)?;
        let raw = import::read_csv_records(Path::new(&params.file_path), delimiter)
            .await
            .map_err(fail)?;
        let mapping = params.mapping();
        let options = self
            .ingest_options()
            .with_batch_size(params.batch_size)
            .with_provider(params.embedding_provider, params.embedding_model.clone());
        let outcome = self
            .ingest_raw(&params.index_name, raw, &mapping, options)
            .await?;
        outcome_json(&params.index_name, &outcome)
    }

    #[tool(description = "Create a named backup of an index.")]
    async fn endee_create_backup(
        &self,
        Parameters(params): Parameters<CreateBackupParams>,
    ) -> ToolResult {
        let message = self
            .store
            .create_backup(&params.index_name, &params.backup_name)
            .await
            .map_err(fail)?;
        to_json(&json!({ "success": true, "backup_name": params.backup_name, "message": message }))
    }

    #[tool(description = "List available backups.")]
    async fn endee_list_backups(
        &self,
        Parameters(_params): Parameters<ListBackupsParams>,
    ) -> ToolResult {
        let backups = self.store.list_backups().await.map_err(fail)?;
        to_json(&json!({ "total": backups.len(), "backups": backups }))
    }

    #[tool(description = "Restore a backup into a new index.")]
    async fn endee_restore_backup(
        &self,
        Parameters(params): Parameters<RestoreBackupParams>,
    ) -> ToolResult {
        let message = self
            .store
            .restore_backup(&params.backup_name, &params.target_index_name)
            .await
            .map_err(fail)?;
        to_json(&json!({
            "success": true,
            "target_index_name": params.target_index_name,
            "message": message,
        }))
    }

    #[tool(description = "Delete a backup. Requires confirm=true.")]
    async fn endee_delete_backup(
        &self,
        Parameters(params): Parameters<DeleteBackupParams>,
    ) -> ToolResult {
        require_confirm(params.confirm, &format!("backup '{}'", params.backup_name))?;
        let message = self
            .store
            .delete_backup(&params.backup_name)
            .await
            .map_err(fail)?;
        to_json(&json!({ "success": true, "message": message }))
    }

    #[tool(description = "Check Endee connectivity and the embedding provider state.")]
    async fn endee_health_check(
        &self,
        Parameters(_params): Parameters<HealthCheckParams>,
    ) -> ToolResult {
        let (status, detail) = match self.store.health().await {
            Ok(health) => {
                let ok = health.get("status").and_then(Value::as_str) == Some("ok");
                let status = if ok { "healthy" } else { "unhealthy" };
                let stats = self.store.stats().await.ok();
                (status.to_string(), Some(json!({ "health": health, "stats": stats })))
            }
            Err(e) => (format!("error: {e}"), None),
        };
        let health = HealthStatus {
            status,
            endee_url: self.config.endee.url.clone(),
            timestamp: chrono::Utc::now().timestamp(),
            embedding_provider: self.embeddings.key_for(ProviderChoice::Auto, None).to_string(),
            local_model_loaded: self.embeddings.is_local_loaded(),
            detail,
        };
        to_json(&health)
    }

    #[tool(description = "Show the server configuration. Secrets are never included.")]
    async fn endee_get_config(
        &self,
        Parameters(_params): Parameters<GetConfigParams>,
    ) -> ToolResult {
        let mut value = self.config.to_public_json();
        value["embedding"] = self.embeddings.describe();
        to_json(&value)
    }
}

#[tool_handler]
impl ServerHandler for EndeeTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Endee vector database tools. Create an index with endee_create_index, add \
                 data with endee_upsert_documents or endee_import_json/endee_import_csv, and \
                 query with endee_search_text. Filters are lists of {field: {$eq|$in|$range}}."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
