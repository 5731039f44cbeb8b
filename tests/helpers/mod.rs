#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use endee_mcp::config::EmbeddingConfig;
use endee_mcp::embedding::manager::ProviderLoader;
use endee_mcp::embedding::{
    EmbeddingManager, EmbeddingProvider, ProviderChoice, ProviderKey, ProviderKind,
};
use endee_mcp::error::{Error, Result};
use endee_mcp::filter::WireFilter;
use endee_mcp::records::Record;
use endee_mcp::storage::types::{
    FilterUpdate, IndexInfo, IndexSpec, RejectedItem, SearchHit, SearchRequest, UpsertReport,
    VectorItem,
};
use endee_mcp::storage::VectorStore;

/// In-memory [`VectorStore`] that records every call.
#[derive(Default)]
pub struct FakeStore {
    pub indexes: Mutex<HashMap<String, IndexInfo>>,
    pub upserts: Mutex<Vec<Vec<VectorItem>>>,
    pub searches: Mutex<Vec<SearchRequest>>,
    pub filter_deletes: AtomicUsize,
    pub describe_calls: AtomicUsize,
    /// Any upsert containing this id fails as a whole.
    pub fail_upsert_with_id: Mutex<Option<String>>,
    /// Reported back as per-record rejections on every upsert, verbatim.
    pub reject_ids: Mutex<Vec<String>>,
    pub hits: Mutex<Vec<SearchHit>>,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_index(name: &str, dimension: usize, sparse_dim: usize) -> Arc<Self> {
        let store = Self::default();
        store
            .indexes
            .lock()
            .unwrap()
            .insert(name.to_string(), index_info(name, dimension, sparse_dim));
        Arc::new(store)
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.lock().unwrap().len()
    }

    pub fn stored_ids(&self) -> Vec<String> {
        self.upserts
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|item| item.id.clone())
            .collect()
    }

    pub fn search_calls(&self) -> usize {
        self.searches.lock().unwrap().len()
    }
}

pub fn index_info(name: &str, dimension: usize, sparse_dim: usize) -> IndexInfo {
    IndexInfo {
        name: name.to_string(),
        dimension,
        space_type: Some("cosine".into()),
        precision: Some("int8d".into()),
        total_elements: 0,
        sparse_dim,
        m: Some(16),
        created_at: None,
        extra: Map::new(),
    }
}

fn not_found(what: &str) -> Error {
    Error::StorageRequest {
        status: Some(404),
        message: format!("{what} not found"),
    }
}

#[async_trait]
impl VectorStore for FakeStore {
    async fn create_index(&self, spec: &IndexSpec) -> Result<String> {
        self.indexes.lock().unwrap().insert(
            spec.name.clone(),
            index_info(&spec.name, spec.dimension, 0),
        );
        Ok("Index created successfully".into())
    }

    async fn list_indexes(&self) -> Result<Vec<IndexInfo>> {
        Ok(self.indexes.lock().unwrap().values().cloned().collect())
    }

    async fn describe_index(&self, name: &str) -> Result<IndexInfo> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        self.indexes
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| not_found("index"))
    }

    async fn delete_index(&self, name: &str) -> Result<String> {
        self.indexes
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| "Index deleted successfully".to_string())
            .ok_or_else(|| not_found("index"))
    }

    async fn upsert(&self, _index: &str, items: &[VectorItem]) -> Result<UpsertReport> {
        let poison = self.fail_upsert_with_id.lock().unwrap().clone();
        if let Some(id) = poison {
            if items.iter().any(|item| item.id == id) {
                return Err(Error::StorageUnavailable("connection reset".into()));
            }
        }
        self.upserts.lock().unwrap().push(items.to_vec());
        let rejected = self
            .reject_ids
            .lock()
            .unwrap()
            .iter()
            .map(|id| RejectedItem {
                id: id.clone(),
                error: Error::InvalidVectorDimension {
                    id: id.clone(),
                    expected: 4,
                    actual: 3,
                },
            })
            .collect();
        Ok(UpsertReport { rejected })
    }

    async fn get_vector(&self, _index: &str, id: &str) -> Result<Option<Value>> {
        let found = self
            .upserts
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .find(|item| item.id == id)
            .cloned();
        Ok(found.map(|item| json!(item)))
    }

    async fn delete_vector(&self, _index: &str, _id: &str) -> Result<String> {
        Ok("Vector deleted successfully".into())
    }

    async fn delete_by_filter(&self, _index: &str, _filter: &WireFilter) -> Result<u64> {
        self.filter_deletes.fetch_add(1, Ordering::SeqCst);
        Ok(3)
    }

    async fn update_filters(&self, _index: &str, updates: &[FilterUpdate]) -> Result<String> {
        Ok(format!("{} filters updated", updates.len()))
    }

    async fn search(&self, _index: &str, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        self.searches.lock().unwrap().push(request.clone());
        Ok(self.hits.lock().unwrap().clone())
    }

    async fn create_backup(&self, _index: &str, _backup: &str) -> Result<String> {
        Ok("Backup created".into())
    }

    async fn list_backups(&self) -> Result<Vec<Value>> {
        Ok(vec![])
    }

    async fn restore_backup(&self, _backup: &str, _target_index: &str) -> Result<String> {
        Ok("Backup restored".into())
    }

    async fn delete_backup(&self, _backup: &str) -> Result<String> {
        Ok("Backup deleted".into())
    }

    async fn health(&self) -> Result<Value> {
        Ok(json!({"status": "ok"}))
    }

    async fn stats(&self) -> Result<Value> {
        Ok(json!({"indexes": self.indexes.lock().unwrap().len()}))
    }
}

type FailWhen = Box<dyn Fn(&[String]) -> bool + Send + Sync>;

/// Deterministic provider: each vector is `[len(text), 1, 1, ...]` of a fixed width.
pub struct FakeProvider {
    pub dims: usize,
    pub calls: AtomicUsize,
    pub texts_seen: AtomicUsize,
    fail_when: Option<FailWhen>,
}

impl FakeProvider {
    pub fn new(dims: usize) -> Arc<Self> {
        Arc::new(Self {
            dims,
            calls: AtomicUsize::new(0),
            texts_seen: AtomicUsize::new(0),
            fail_when: None,
        })
    }

    /// Fails any batch for which `predicate` holds.
    pub fn failing_when(
        dims: usize,
        predicate: impl Fn(&[String]) -> bool + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            dims,
            calls: AtomicUsize::new(0),
            texts_seen: AtomicUsize::new(0),
            fail_when: Some(Box::new(predicate)),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FakeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn name(&self) -> String {
        "fake".into()
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_seen.fetch_add(texts.len(), Ordering::SeqCst);
        if self.fail_when.as_ref().is_some_and(|f| f(texts)) {
            return Err(Error::EmbeddingProvider("upstream returned 500".into()));
        }
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![1.0; self.dims];
                v[0] = t.len() as f32;
                v
            })
            .collect())
    }
}

/// Hands out the same provider for every key and counts loads.
pub struct CountingLoader {
    provider: Arc<dyn EmbeddingProvider>,
    delay: Duration,
    /// Per-model delay overriding `delay`.
    model_delays: HashMap<String, Duration>,
    pub loads: AtomicUsize,
    pub keys: Mutex<Vec<ProviderKey>>,
}

impl CountingLoader {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Arc<Self> {
        Self::with_delay(provider, Duration::ZERO)
    }

    pub fn with_delay(provider: Arc<dyn EmbeddingProvider>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            provider,
            delay,
            model_delays: HashMap::new(),
            loads: AtomicUsize::new(0),
            keys: Mutex::new(vec![]),
        })
    }

    /// Loads of `model` take `delay`; every other model loads immediately.
    pub fn with_slow_model(
        provider: Arc<dyn EmbeddingProvider>,
        model: &str,
        delay: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            provider,
            delay: Duration::ZERO,
            model_delays: HashMap::from([(model.to_string(), delay)]),
            loads: AtomicUsize::new(0),
            keys: Mutex::new(vec![]),
        })
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderLoader for CountingLoader {
    async fn load(&self, key: &ProviderKey) -> Result<Arc<dyn EmbeddingProvider>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(key.clone());
        let delay = self.model_delays.get(&key.model).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(Arc::clone(&self.provider))
    }
}

/// Embedding config with no API key and the given default provider.
pub fn embedding_config(provider: ProviderChoice) -> EmbeddingConfig {
    EmbeddingConfig {
        provider,
        openai_api_key: String::new(),
        ..Default::default()
    }
}

/// Manager whose every provider is `provider`.
pub fn manager_with(
    provider: Arc<dyn EmbeddingProvider>,
) -> (Arc<EmbeddingManager>, Arc<CountingLoader>) {
    let loader = CountingLoader::new(provider);
    let manager = EmbeddingManager::with_loader(
        embedding_config(ProviderChoice::Auto),
        Arc::clone(&loader) as Arc<dyn ProviderLoader>,
    );
    (Arc::new(manager), loader)
}

pub fn text_records(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| Record::with_text(format!("doc-{i}"), format!("document number {i}")))
        .collect()
}

/// Serve `router` on an ephemeral local port and return its base URL.
pub async fn spawn_server(router: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}
