mod helpers;

use std::collections::HashSet;
use std::sync::Arc;

use endee_mcp::embedding::{EmbeddingManager, ProviderChoice};
use endee_mcp::ingest::{DimensionCheck, IngestOptions, IngestPipeline};
use endee_mcp::records::{self, FieldMapping, RawRecord, Record};
use endee_mcp::storage::VectorStore;
use helpers::*;
use serde_json::json;

fn options(batch_size: usize) -> IngestOptions {
    IngestOptions::default().with_batch_size(Some(batch_size))
}

fn pipeline(store: &Arc<FakeStore>, manager: &Arc<EmbeddingManager>) -> IngestPipeline {
    IngestPipeline::new(
        Arc::clone(store) as Arc<dyn VectorStore>,
        Arc::clone(manager),
    )
}

fn has_doc(texts: &[String], n: usize) -> bool {
    let needle = format!("document number {n}");
    texts.iter().any(|t| *t == needle)
}

#[tokio::test]
async fn failed_tail_chunk_only_fails_its_records() {
    let store = FakeStore::with_index("docs", 4, 0);
    let provider = FakeProvider::failing_when(4, |texts| has_doc(texts, 210));
    let (manager, _) = manager_with(provider.clone());

    let outcome = pipeline(&store, &manager)
        .ingest("docs", text_records(250), &options(100))
        .await
        .unwrap();

    assert_eq!(outcome.attempted, 250);
    assert_eq!(outcome.succeeded, 200);
    assert_eq!(outcome.failed.len(), 50);
    let failed: HashSet<String> = outcome.failed.iter().map(|f| f.id.clone()).collect();
    let expected: HashSet<String> = (200..250).map(|i| format!("doc-{i}")).collect();
    assert_eq!(failed, expected);
    assert!(outcome
        .failed
        .iter()
        .all(|f| f.reason.starts_with("EMBEDDING_PROVIDER_ERROR")));

    // One embedding call per chunk, and the failed chunk was never upserted.
    assert_eq!(provider.call_count(), 3);
    assert_eq!(store.upsert_calls(), 2);
    assert_eq!(store.stored_ids().len(), 200);
    assert_eq!(outcome.embedding_provider.as_deref(), Some("fake"));
}

#[tokio::test]
async fn failed_middle_chunk_leaves_neighbours_stored() {
    let store = FakeStore::with_index("docs", 4, 0);
    let provider = FakeProvider::failing_when(4, |texts| has_doc(texts, 150));
    let (manager, _) = manager_with(provider);

    let outcome = pipeline(&store, &manager)
        .ingest("docs", text_records(250), &options(100))
        .await
        .unwrap();

    assert_eq!(outcome.attempted, 250);
    assert_eq!(outcome.succeeded, 150);
    let stored: HashSet<String> = store.stored_ids().into_iter().collect();
    assert!(stored.contains("doc-99"));
    assert!(!stored.contains("doc-100"));
    assert!(!stored.contains("doc-199"));
    assert!(stored.contains("doc-200"));
}

#[tokio::test]
async fn chunk_count_is_ceiling_of_batch_size() {
    for (n, b, expected) in [(250, 100, 3), (100, 100, 1), (101, 100, 2), (7, 1, 7)] {
        let store = FakeStore::with_index("docs", 4, 0);
        let (manager, _) = manager_with(FakeProvider::new(4));
        let outcome = pipeline(&store, &manager)
            .ingest("docs", text_records(n), &options(b))
            .await
            .unwrap();
        assert_eq!(store.upsert_calls(), expected, "n={n} b={b}");
        assert_eq!(outcome.attempted, n);
        assert_eq!(outcome.succeeded, n);
    }
}

#[tokio::test]
async fn concurrent_chunks_store_every_record() {
    let store = FakeStore::with_index("docs", 4, 0);
    let (manager, _) = manager_with(FakeProvider::new(4));
    let mut opts = options(10);
    opts.max_concurrent_chunks = 4;

    let outcome = pipeline(&store, &manager)
        .ingest("docs", text_records(95), &opts)
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 95);
    assert_eq!(store.upsert_calls(), 10);
    let stored: HashSet<String> = store.stored_ids().into_iter().collect();
    assert_eq!(stored.len(), 95);
}

#[tokio::test]
async fn vector_records_never_touch_the_provider() {
    let store = FakeStore::with_index("docs", 3, 0);
    let provider = FakeProvider::new(3);
    let (manager, loader) = manager_with(provider.clone());

    let raw = vec![RawRecord::from_value(json!({
        "id": "both",
        "vector": [0.1, 0.2, 0.3],
        "text": "ignored because a vector is present",
    }))];
    let normalized = records::normalize(raw, &FieldMapping::canonical());
    let outcome = pipeline(&store, &manager)
        .ingest("docs", normalized.records, &options(100))
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 1);
    assert_eq!(provider.call_count(), 0);
    assert_eq!(loader.load_count(), 0);
    assert!(outcome.embedding_provider.is_none());
    let stored = store.upserts.lock().unwrap()[0][0].clone();
    assert_eq!(stored.vector, vec![0.1, 0.2, 0.3]);
}

#[tokio::test]
async fn mixed_chunk_embeds_only_text_records() {
    let store = FakeStore::with_index("docs", 4, 0);
    let provider = FakeProvider::new(4);
    let (manager, _) = manager_with(provider.clone());

    let records = vec![
        Record::with_vector("v1", vec![0.0; 4]),
        Record::with_text("t1", "alpha"),
        Record::with_vector("v2", vec![1.0; 4]),
        Record::with_text("t2", "beta"),
    ];
    let outcome = pipeline(&store, &manager)
        .ingest("docs", records, &options(10))
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 4);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(provider.texts_seen.load(std::sync::atomic::Ordering::SeqCst), 2);
    let items = store.upserts.lock().unwrap()[0].clone();
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, ["v1", "t1", "v2", "t2"]);
    // FakeProvider puts the text length first.
    assert_eq!(items[1].vector[0], 5.0);
}

#[tokio::test]
async fn store_failure_fails_whole_chunk() {
    let store = FakeStore::with_index("docs", 4, 0);
    *store.fail_upsert_with_id.lock().unwrap() = Some("doc-5".into());
    let (manager, _) = manager_with(FakeProvider::new(4));

    let outcome = pipeline(&store, &manager)
        .ingest("docs", text_records(30), &options(10))
        .await
        .unwrap();

    assert_eq!(outcome.attempted, 30);
    assert_eq!(outcome.succeeded, 20);
    assert_eq!(outcome.failed.len(), 10);
    assert!(outcome.failed.iter().all(|f| f.reason.starts_with("STORAGE_UNAVAILABLE")));
    assert!(outcome.failed.iter().any(|f| f.id == "doc-0"));
}

#[tokio::test]
async fn backend_rejections_fail_only_the_named_records() {
    let store = FakeStore::with_index("docs", 4, 0);
    *store.reject_ids.lock().unwrap() = vec!["doc-3".into()];
    let (manager, _) = manager_with(FakeProvider::new(4));

    let outcome = pipeline(&store, &manager)
        .ingest("docs", text_records(10), &options(10))
        .await
        .unwrap();

    assert_eq!(outcome.attempted, 10);
    assert_eq!(outcome.succeeded, 9);
    assert_eq!(outcome.failed.len(), 1);
    assert_eq!(outcome.failed[0].id, "doc-3");
    assert!(outcome.failed[0].reason.starts_with("INVALID_VECTOR_DIMENSION"));
}

#[tokio::test]
async fn repeated_or_unsent_rejections_are_ignored() {
    let store = FakeStore::with_index("docs", 4, 0);
    // Both ids of the first chunk twice, plus one the pipeline never sent.
    *store.reject_ids.lock().unwrap() = vec![
        "doc-0".into(),
        "doc-0".into(),
        "doc-1".into(),
        "doc-1".into(),
        "ghost".into(),
    ];
    let (manager, _) = manager_with(FakeProvider::new(4));

    let outcome = pipeline(&store, &manager)
        .ingest("docs", text_records(4), &options(2))
        .await
        .unwrap();

    assert_eq!(outcome.attempted, 4);
    assert_eq!(outcome.succeeded, 2);
    let mut failed: Vec<&str> = outcome.failed.iter().map(|f| f.id.as_str()).collect();
    failed.sort();
    assert_eq!(failed, ["doc-0", "doc-1"]);
}

#[tokio::test]
async fn dimension_mismatch_fails_single_record() {
    let store = FakeStore::with_index("docs", 3, 0);
    let (manager, _) = manager_with(FakeProvider::new(3));

    let records = vec![
        Record::with_vector("ok", vec![0.0; 3]),
        Record::with_vector("short", vec![0.0; 2]),
    ];
    let outcome = pipeline(&store, &manager)
        .ingest("docs", records, &options(10))
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed[0].id, "short");
    assert!(outcome.failed[0].reason.starts_with("INVALID_VECTOR_DIMENSION"));
    assert_eq!(store.stored_ids(), ["ok"]);
}

#[tokio::test]
async fn dimension_check_can_be_disabled() {
    let store = FakeStore::with_index("docs", 3, 0);
    let (manager, _) = manager_with(FakeProvider::new(3));
    let opts = options(10).with_dimension_check(DimensionCheck::Off);

    let outcome = pipeline(&store, &manager)
        .ingest("docs", vec![Record::with_vector("short", vec![0.0; 2])], &opts)
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 1);
    assert_eq!(store.describe_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_index_skips_dimension_check() {
    let store = FakeStore::new();
    let (manager, _) = manager_with(FakeProvider::new(4));

    let outcome = pipeline(&store, &manager)
        .ingest("missing", text_records(3), &options(10))
        .await
        .unwrap();

    assert_eq!(outcome.succeeded, 3);
}

#[tokio::test]
async fn disabled_provider_fails_text_records_only() {
    let store = FakeStore::with_index("docs", 2, 0);
    let manager = Arc::new(EmbeddingManager::new(embedding_config(ProviderChoice::None)));

    let records = vec![
        Record::with_text("t1", "hello"),
        Record::with_vector("v1", vec![0.5, 0.5]),
    ];
    let outcome = pipeline(&store, &manager)
        .ingest("docs", records, &options(10))
        .await
        .unwrap();

    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.succeeded, 1);
    assert_eq!(outcome.failed[0].id, "t1");
    assert!(outcome.failed[0].reason.starts_with("EMBEDDING_DISABLED"));
}

#[tokio::test]
async fn unconfigured_remote_aborts_before_any_chunk() {
    let store = FakeStore::with_index("docs", 4, 0);
    let manager = Arc::new(EmbeddingManager::new(embedding_config(ProviderChoice::Auto)));
    let opts = options(10).with_provider(Some(ProviderChoice::Remote), None);

    let err = pipeline(&store, &manager)
        .ingest("docs", text_records(5), &opts)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "CONFIGURATION_ERROR");
    assert_eq!(store.upsert_calls(), 0);
}

#[tokio::test]
async fn normalizer_rejections_are_reported_with_position() {
    let store = FakeStore::with_index("docs", 2, 0);
    let (manager, _) = manager_with(FakeProvider::new(2));

    let raw = vec![
        RawRecord::from_value(json!({"id": "a", "vector": [1.0, 0.0]})),
        RawRecord::from_value(json!({"vector": [1.0, 0.0]})),
        RawRecord::from_value(json!({"id": "c"})),
    ];
    let normalized = records::normalize(raw, &FieldMapping::canonical());
    let mut outcome = pipeline(&store, &manager)
        .ingest("docs", normalized.records, &options(10))
        .await
        .unwrap();
    outcome.add_rejected(&normalized.rejected);

    assert_eq!(outcome.attempted, 3);
    assert_eq!(outcome.succeeded, 1);
    let ids: Vec<&str> = outcome.failed.iter().map(|f| f.id.as_str()).collect();
    assert!(ids.contains(&"#1"));
    assert!(ids.contains(&"c"));
    assert!(outcome
        .failed
        .iter()
        .any(|f| f.reason.starts_with("MISSING_IDENTIFIER")));
}
