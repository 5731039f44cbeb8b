//! HTTP client for the Endee vector database.
//!
//! Every route lives under `{url}/api/v1/`. The auth token, when configured, is sent
//! verbatim in the `Authorization` header. Search and get answers may come back as
//! MessagePack or JSON; the `Content-Type` picks the first decoder to try and the other
//! one is the fallback.
//!
//! Connection failures, timeouts and 502/503/504 answers are retried with backoff and
//! surface as [`Error::StorageUnavailable`]. Any other non-2xx answer becomes
//! [`Error::StorageRequest`] immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use super::types::{
    FilterUpdate, IndexInfo, IndexSpec, SearchHit, SearchRequest, UpsertReport, VectorItem,
};
use super::VectorStore;
use crate::config::EndeeConfig;
use crate::error::{Error, Result};
use crate::filter::WireFilter;
use crate::retry::{retry_with_backoff, RetryPolicy};

pub struct EndeeClient {
    http: reqwest::Client,
    base: Url,
    auth_token: Option<String>,
    retry: RetryPolicy,
}

#[derive(Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexInfo>,
}

#[derive(Deserialize)]
struct BackupList {
    #[serde(default)]
    backups: Vec<Value>,
}

impl EndeeClient {
    pub fn new(config: &EndeeConfig) -> Result<Self> {
        let base = Url::parse(&config.url)
            .map_err(|e| Error::Configuration(format!("invalid Endee URL '{}': {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "invalid Endee URL '{}': not a base URL",
                config.url
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base,
            auth_token: config
                .is_auth_enabled()
                .then(|| config.auth_token.clone()),
            retry: RetryPolicy::default().with_max_retries(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// `{base}/api/v1/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1"]).extend(segments);
        }
        url
    }

    async fn attempt(&self, method: Method, url: &Url, body: Option<&Value>) -> Result<Response> {
        let mut request = self.http.request(method, url.clone());
        if let Some(token) = &self.auth_token {
            request = request.header(AUTHORIZATION, token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return Err(Error::StorageUnavailable(format!("HTTP {status}")));
        }
        Ok(response)
    }

    /// Send with retries. The response may still carry a non-2xx status.
    async fn execute(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<Response> {
        let url = self.url(segments);
        tracing::debug!(method = %method, url = %url, "endee request");
        retry_with_backoff(
            "endee request",
            &self.retry,
            |e: &Error| matches!(e, Error::StorageUnavailable(_)),
            || self.attempt(method.clone(), &url, body.as_ref()),
        )
        .await
    }

    async fn call(&self, method: Method, segments: &[&str], body: Option<Value>) -> Result<Response> {
        let response = self.execute(method, segments, body).await?;
        ensure_success(response).await
    }

    async fn call_text(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Value>,
    ) -> Result<String> {
        let response = self.call(method, segments, body).await?;
        read_text(response).await
    }
}

fn classify_transport(e: reqwest::Error) -> Error {
    if e.is_connect() || e.is_timeout() {
        Error::StorageUnavailable(e.to_string())
    } else {
        Error::StorageRequest {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = match body.trim() {
        "" => status.canonical_reason().unwrap_or("request failed").to_string(),
        text => error_message(text),
    };
    Err(Error::StorageRequest {
        status: Some(status.as_u16()),
        message,
    })
}

/// Prefer the `error` field of a JSON error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

async fn read_text(response: Response) -> Result<String> {
    response.text().await.map_err(|e| Error::StorageRequest {
        status: None,
        message: format!("failed to read response: {e}"),
    })
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let prefer_msgpack = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("msgpack"));
    let bytes = response.bytes().await.map_err(|e| Error::StorageRequest {
        status: None,
        message: format!("failed to read response: {e}"),
    })?;
    decode_body(&bytes, prefer_msgpack)
}

fn decode_body<T: DeserializeOwned>(bytes: &[u8], prefer_msgpack: bool) -> Result<T> {
    let msgpack = || rmp_serde::from_slice::<T>(bytes).map_err(|e| e.to_string());
    let json = || serde_json::from_slice::<T>(bytes).map_err(|e| e.to_string());
    let decoded = if prefer_msgpack {
        msgpack().or_else(|first| json().map_err(|_| first))
    } else {
        json().or_else(|first| msgpack().map_err(|_| first))
    };
    decoded.map_err(|e| Error::StorageRequest {
        status: None,
        message: format!("undecodable response body: {e}"),
    })
}

/// Endee answers a filtered delete with text like `"12 vectors deleted"`, or JSON.
fn parse_deleted_count(body: &str) -> Result<u64> {
    let body = body.trim();
    if let Some(n) = body.split_whitespace().next().and_then(|w| w.parse().ok()) {
        return Ok(n);
    }
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("deleted").or_else(|| v.get("deleted_count")).and_then(Value::as_u64))
        .ok_or_else(|| Error::StorageRequest {
            status: None,
            message: format!("unexpected delete response: {body}"),
        })
}

#[async_trait]
impl VectorStore for EndeeClient {
    async fn create_index(&self, spec: &IndexSpec) -> Result<String> {
        spec.validate()?;
        self.call_text(Method::POST, &["index", "create"], Some(spec.to_payload()))
            .await
    }

    async fn list_indexes(&self) -> Result<Vec<IndexInfo>> {
        let response = self.call(Method::GET, &["index", "list"], None).await?;
        let list: IndexList = decode(response).await?;
        Ok(list.indexes)
    }

    async fn describe_index(&self, name: &str) -> Result<IndexInfo> {
        let response = self.call(Method::GET, &["index", name, "info"], None).await?;
        decode(response).await
    }

    async fn delete_index(&self, name: &str) -> Result<String> {
        self.call_text(Method::DELETE, &["index", name, "delete"], None)
            .await
    }

    async fn upsert(&self, index: &str, items: &[VectorItem]) -> Result<UpsertReport> {
        let body = serde_json::to_value(items).map_err(|e| Error::InvalidInput(e.to_string()))?;
        self.call(Method::POST, &["index", index, "vector", "insert"], Some(body))
            .await?;
        // Endee accepts or rejects an insert as a whole.
        Ok(UpsertReport::default())
    }

    async fn get_vector(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let response = self
            .execute(
                Method::POST,
                &["index", index, "vector", "get"],
                Some(json!({ "id": id })),
            )
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        decode(response).await.map(Some)
    }

    async fn delete_vector(&self, index: &str, id: &str) -> Result<String> {
        self.call_text(Method::DELETE, &["index", index, "vector", id, "delete"], None)
            .await
    }

    async fn delete_by_filter(&self, index: &str, filter: &WireFilter) -> Result<u64> {
        let body = json!({ "filter": filter.to_value() });
        let text = self
            .call_text(Method::DELETE, &["index", index, "vectors", "delete"], Some(body))
            .await?;
        parse_deleted_count(&text)
    }

    async fn update_filters(&self, index: &str, updates: &[FilterUpdate]) -> Result<String> {
        let body = json!({ "updates": updates });
        self.call_text(Method::POST, &["index", index, "filters", "update"], Some(body))
            .await
    }

    async fn search(&self, index: &str, request: &SearchRequest) -> Result<Vec<SearchHit>> {
        request.validate()?;
        let response = self
            .call(Method::POST, &["index", index, "search"], Some(request.to_payload()))
            .await?;
        decode(response).await
    }

    async fn create_backup(&self, index: &str, backup: &str) -> Result<String> {
        self.call_text(
            Method::POST,
            &["index", index, "backup"],
            Some(json!({ "name": backup })),
        )
        .await
    }

    async fn list_backups(&self) -> Result<Vec<Value>> {
        let response = self.call(Method::GET, &["backups"], None).await?;
        let list: BackupList = decode(response).await?;
        Ok(list.backups)
    }

    async fn restore_backup(&self, backup: &str, target_index: &str) -> Result<String> {
        self.call_text(
            Method::POST,
            &["backups", backup, "restore"],
            Some(json!({ "target_index_name": target_index })),
        )
        .await
    }

    async fn delete_backup(&self, backup: &str) -> Result<String> {
        self.call_text(Method::DELETE, &["backups", backup], None).await
    }

    async fn health(&self) -> Result<Value> {
        let response = self.call(Method::GET, &["health"], None).await?;
        decode(response).await
    }

    async fn stats(&self) -> Result<Value> {
        let response = self.call(Method::GET, &["stats"], None).await?;
        decode(response).await
    }
}
