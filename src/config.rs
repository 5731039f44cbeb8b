use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::embedding::ProviderChoice;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EndeeMcpConfig {
    pub server: ServerConfig,
    pub endee: EndeeConfig,
    pub embedding: EmbeddingConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// `stdio` or `sse`.
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EndeeConfig {
    pub url: String,
    /// Sent as the `Authorization` header when non-empty.
    pub auth_token: String,
    pub timeout_secs: u64,
    /// Transport-level retries for connection failures and 502/503/504 answers.
    pub max_retries: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// `auto`, `openai` (alias `remote`), `local`, or `none`.
    pub provider: ProviderChoice,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub local_model: String,
    pub cache_dir: String,
    pub preload_local_model: bool,
    /// Upper bound on texts per remote embedding request.
    pub max_batch_texts: usize,
    /// Upper bound on total characters per remote embedding request.
    pub max_batch_chars: usize,
    /// Client-side request quota for the remote provider. `None` disables throttling.
    pub requests_per_minute: Option<u32>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IngestConfig {
    pub batch_size: usize,
    pub max_concurrent_chunks: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 3000,
            log_level: "info".into(),
        }
    }
}

impl Default for EndeeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".into(),
            auth_token: String::new(),
            timeout_secs: 30,
            max_retries: 2,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_endee_mcp_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: ProviderChoice::Auto,
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".into(),
            openai_model: "text-embedding-3-small".into(),
            local_model: "sentence-transformers/all-MiniLM-L6-v2".into(),
            cache_dir,
            preload_local_model: false,
            max_batch_texts: 2048,
            max_batch_chars: 400_000,
            requests_per_minute: None,
            request_timeout_secs: 60,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_concurrent_chunks: 1,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_openai_configured(&self) -> bool {
        !self.openai_api_key.is_empty()
    }

    pub fn resolved_cache_dir(&self) -> PathBuf {
        expand_tilde(&self.cache_dir)
    }
}

impl EndeeConfig {
    pub fn is_auth_enabled(&self) -> bool {
        !self.auth_token.is_empty()
    }
}

/// Returns `~/.endee-mcp/`, or `./.endee-mcp/` when no home directory is known.
pub fn default_endee_mcp_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".endee-mcp")
}

/// Returns the default config file path: `~/.endee-mcp/config.toml`
pub fn default_config_path() -> PathBuf {
    default_endee_mcp_dir().join("config.toml")
}

impl EndeeMcpConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            EndeeMcpConfig::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides. Unset or empty variables are ignored.
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Some(val) = env_var("ENDEE_URL") {
            self.endee.url = val;
        }
        if let Some(val) = env_var("ENDEE_AUTH_TOKEN") {
            self.endee.auth_token = val;
        }
        if let Some(val) = env_var("EMBEDDING_PROVIDER") {
            self.embedding.provider = val
                .parse()
                .map_err(|e: String| anyhow::anyhow!("EMBEDDING_PROVIDER: {e}"))?;
        }
        if let Some(val) = env_var("OPENAI_API_KEY") {
            self.embedding.openai_api_key = val;
        }
        if let Some(val) = env_var("OPENAI_BASE_URL") {
            self.embedding.openai_base_url = val;
        }
        if let Some(val) = env_var("OPENAI_EMBEDDING_MODEL") {
            self.embedding.openai_model = val;
        }
        if let Some(val) = env_var("LOCAL_EMBEDDING_MODEL") {
            self.embedding.local_model = val;
        }
        if let Some(val) = env_var("PRELOAD_LOCAL_MODEL") {
            self.embedding.preload_local_model = val.eq_ignore_ascii_case("true");
        }
        if let Some(val) = env_var("MCP_TRANSPORT") {
            self.server.transport = val;
        }
        if let Some(val) = env_var("MCP_SSE_PORT") {
            self.server.port = val
                .parse()
                .with_context(|| format!("MCP_SSE_PORT is not a port number: {val}"))?;
        }
        if let Some(val) = env_var("ENDEE_MCP_LOG_LEVEL") {
            self.server.log_level = val;
        }
        Ok(())
    }

    /// Configuration view safe to hand to clients: no secrets, only whether they are set.
    pub fn to_public_json(&self) -> serde_json::Value {
        serde_json::json!({
            "endee_url": self.endee.url,
            "endee_auth_enabled": self.endee.is_auth_enabled(),
            "embedding_provider": self.embedding.provider.as_str(),
            "openai_model": self.embedding.openai_model,
            "openai_key_configured": self.embedding.is_openai_configured(),
            "local_model": self.embedding.local_model,
            "preload_local_model": self.embedding.preload_local_model,
            "batch_size": self.ingest.batch_size,
            "max_concurrent_chunks": self.ingest.max_concurrent_chunks,
            "mcp_transport": self.server.transport,
            "mcp_sse_port": self.server.port,
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(rest),
        None => PathBuf::from(path),
    }
}
