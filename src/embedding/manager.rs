//! Provider selection and the process-wide provider cache.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::OnceCell;

use super::disabled::DisabledProvider;
use super::local::LocalEmbeddingProvider;
use super::remote::RemoteEmbeddingProvider;
use super::{EmbeddingProvider, EmbeddingRequest, ProviderChoice, ProviderKey, ProviderKind};
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Builds a provider for a cache key. Called at most once per key that loads
/// successfully.
#[async_trait]
pub trait ProviderLoader: Send + Sync {
    async fn load(&self, key: &ProviderKey) -> Result<Arc<dyn EmbeddingProvider>>;
}

/// Builds the real providers from configuration.
pub struct DefaultLoader {
    config: EmbeddingConfig,
}

impl DefaultLoader {
    pub fn new(config: EmbeddingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ProviderLoader for DefaultLoader {
    async fn load(&self, key: &ProviderKey) -> Result<Arc<dyn EmbeddingProvider>> {
        match key.kind {
            ProviderKind::Disabled => Ok(Arc::new(DisabledProvider)),
            ProviderKind::Remote => Ok(Arc::new(RemoteEmbeddingProvider::new(
                &self.config,
                &key.model,
            )?)),
            ProviderKind::Local => {
                let model = key.model.clone();
                let cache_dir = self.config.resolved_cache_dir();
                let started = std::time::Instant::now();
                let provider = tokio::task::spawn_blocking(move || {
                    LocalEmbeddingProvider::load(&model, &cache_dir)
                })
                .await
                .map_err(|e| Error::EmbeddingProvider(format!("model load task failed: {e}")))??;
                tracing::info!(
                    model = %key.model,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "local embedding model ready"
                );
                Ok(Arc::new(provider))
            }
        }
    }
}

type ProviderCell = Arc<OnceCell<Arc<dyn EmbeddingProvider>>>;

/// Vectors produced for one request, with the provider that made them.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedded {
    pub provider: String,
    pub vectors: Vec<Vec<f32>>,
}

/// Picks a provider per request and keeps every loaded provider for the life of
/// the process.
pub struct EmbeddingManager {
    config: EmbeddingConfig,
    loader: Arc<dyn ProviderLoader>,
    providers: Mutex<HashMap<ProviderKey, ProviderCell>>,
}

impl EmbeddingManager {
    pub fn new(config: EmbeddingConfig) -> Self {
        let loader = Arc::new(DefaultLoader::new(config.clone()));
        Self::with_loader(config, loader)
    }

    pub fn with_loader(config: EmbeddingConfig, loader: Arc<dyn ProviderLoader>) -> Self {
        Self {
            config,
            loader,
            providers: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EmbeddingConfig {
        &self.config
    }

    /// Apply the selection policy. A configured `none` disables embeddings for every
    /// request; `auto` prefers remote when an API key is present.
    pub fn effective_kind(&self, choice: ProviderChoice) -> ProviderKind {
        if self.config.provider == ProviderChoice::None {
            return ProviderKind::Disabled;
        }
        let choice = match choice {
            ProviderChoice::Auto => self.config.provider,
            explicit => explicit,
        };
        match choice {
            ProviderChoice::Auto if self.config.is_openai_configured() => ProviderKind::Remote,
            ProviderChoice::Auto => ProviderKind::Local,
            ProviderChoice::Remote => ProviderKind::Remote,
            ProviderChoice::Local => ProviderKind::Local,
            ProviderChoice::None => ProviderKind::Disabled,
        }
    }

    pub fn key_for(&self, choice: ProviderChoice, model: Option<&str>) -> ProviderKey {
        let kind = self.effective_kind(choice);
        let model = match (kind, model) {
            (ProviderKind::Disabled, _) => "none",
            (_, Some(m)) if !m.trim().is_empty() => m.trim(),
            (ProviderKind::Remote, _) => &self.config.openai_model,
            (ProviderKind::Local, _) => &self.config.local_model,
        };
        ProviderKey::new(kind, model)
    }

    fn cell(&self, key: &ProviderKey) -> ProviderCell {
        let mut providers = self.providers.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(providers.entry(key.clone()).or_default())
    }

    /// Cached provider for this choice, loading it on first use.
    pub async fn resolve(
        &self,
        choice: ProviderChoice,
        model: Option<&str>,
    ) -> Result<Arc<dyn EmbeddingProvider>> {
        let key = self.key_for(choice, model);
        let cell = self.cell(&key);
        let provider = cell
            .get_or_try_init(|| async {
                tracing::debug!(provider = %key, "loading embedding provider");
                self.loader.load(&key).await
            })
            .await?;
        Ok(Arc::clone(provider))
    }

    /// Embed one request. Empty text lists never load a provider.
    pub async fn embed(&self, request: &EmbeddingRequest) -> Result<Embedded> {
        if request.texts.is_empty() {
            let key = self.key_for(request.provider, request.model.as_deref());
            return Ok(Embedded {
                provider: key.kind.as_str().to_string(),
                vectors: vec![],
            });
        }
        let provider = self
            .resolve(request.provider, request.model.as_deref())
            .await?;
        let vectors = provider.embed_batch(&request.texts).await?;
        if vectors.len() != request.texts.len() {
            return Err(Error::EmbeddingProvider(format!(
                "{} returned {} vectors for {} texts",
                provider.name(),
                vectors.len(),
                request.texts.len()
            )));
        }
        Ok(Embedded {
            provider: provider.name(),
            vectors,
        })
    }

    /// Load the default provider up front when `preload_local_model` is set.
    pub async fn preload(&self) -> Result<()> {
        if !self.config.preload_local_model {
            return Ok(());
        }
        let provider = self.resolve(ProviderChoice::Auto, None).await?;
        tracing::info!(provider = %provider.name(), "embedding provider preloaded");
        Ok(())
    }

    pub fn is_local_loaded(&self) -> bool {
        let providers = self.providers.lock().unwrap_or_else(|e| e.into_inner());
        providers
            .iter()
            .any(|(key, cell)| key.kind == ProviderKind::Local && cell.initialized())
    }

    /// Configured versus effective provider, for health and config output.
    pub fn describe(&self) -> serde_json::Value {
        let key = self.key_for(ProviderChoice::Auto, None);
        serde_json::json!({
            "configured": self.config.provider.as_str(),
            "effective": key.kind.as_str(),
            "model": key.model,
            "local_model_loaded": self.is_local_loaded(),
        })
    }
}
