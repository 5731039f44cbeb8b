//! Boundary to the remote vector database.
//!
//! [`VectorStore`] is the seam the pipeline and tools talk to; [`client::EndeeClient`]
//! implements it over Endee's HTTP API. Tests substitute in-memory stores.

pub mod client;
pub mod types;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::filter::WireFilter;
use types::{FilterUpdate, IndexInfo, IndexSpec, SearchHit, SearchRequest, UpsertReport, VectorItem};

pub use client::EndeeClient;

/// Operations the vector database exposes. String results carry the server's
/// confirmation message.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn create_index(&self, spec: &IndexSpec) -> Result<String>;

    async fn list_indexes(&self) -> Result<Vec<IndexInfo>>;

    async fn describe_index(&self, name: &str) -> Result<IndexInfo>;

    async fn delete_index(&self, name: &str) -> Result<String>;

    /// Insert or replace items. The report lists items the store refused individually;
    /// a whole-request failure is an `Err`.
    async fn upsert(&self, index: &str, items: &[VectorItem]) -> Result<UpsertReport>;

    /// `None` when no vector has this id.
    async fn get_vector(&self, index: &str, id: &str) -> Result<Option<Value>>;

    async fn delete_vector(&self, index: &str, id: &str) -> Result<String>;

    /// Returns the number of vectors deleted.
    async fn delete_by_filter(&self, index: &str, filter: &WireFilter) -> Result<u64>;

    async fn update_filters(&self, index: &str, updates: &[FilterUpdate]) -> Result<String>;

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<Vec<SearchHit>>;

    async fn create_backup(&self, index: &str, backup: &str) -> Result<String>;

    async fn list_backups(&self) -> Result<Vec<Value>>;

    async fn restore_backup(&self, backup: &str, target_index: &str) -> Result<String>;

    async fn delete_backup(&self, backup: &str) -> Result<String>;

    async fn health(&self) -> Result<Value>;

    async fn stats(&self) -> Result<Value>;
}
