//! Text-to-vector embedding.
//!
//! Three provider variants sit behind the [`EmbeddingProvider`] trait: a remote
//! OpenAI-compatible API ([`remote`]), an in-process ONNX model ([`local`]), and a
//! no-op provider used when embeddings are disabled ([`disabled`]). The
//! [`manager::EmbeddingManager`] picks one per request and caches loaded providers.

pub mod disabled;
pub mod local;
pub mod manager;
pub mod remote;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use manager::EmbeddingManager;

/// Turns texts into fixed-dimension vectors.
///
/// `embed_batch` returns one vector per input text, in input order. An empty input
/// yields an empty output for every provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Display name reported back to clients, e.g. `openai-text-embedding-3-small`.
    fn name(&self) -> String;

    /// Output dimension, or 0 when the provider produces no vectors.
    fn dimensions(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Which provider a caller asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ProviderChoice {
    /// Remote if an API key is configured, local otherwise.
    #[default]
    Auto,
    #[serde(alias = "openai")]
    Remote,
    Local,
    None,
}

impl ProviderChoice {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Remote => "openai",
            Self::Local => "local",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ProviderChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderChoice {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "openai" | "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            "none" | "disabled" => Ok(Self::None),
            other => Err(format!(
                "unknown embedding provider '{other}' (expected auto, openai, local or none)"
            )),
        }
    }
}

/// A concrete provider variant, after `auto` has been resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Remote,
    Local,
    Disabled,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "openai",
            Self::Local => "local",
            Self::Disabled => "none",
        }
    }
}

/// Cache key for loaded providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderKey {
    pub kind: ProviderKind,
    pub model: String,
}

impl ProviderKey {
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
        }
    }
}

impl fmt::Display for ProviderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.model)
    }
}

/// One batch of texts to embed, with the caller's provider preference.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingRequest {
    pub texts: Vec<String>,
    pub provider: ProviderChoice,
    pub model: Option<String>,
}

impl EmbeddingRequest {
    pub fn new(texts: Vec<String>) -> Self {
        Self {
            texts,
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: ProviderChoice, model: Option<String>) -> Self {
        self.provider = provider;
        self.model = model;
        self
    }
}

/// L2-normalize a vector. A zero vector is returned unchanged.
pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_choice_parses_aliases() {
        assert_eq!("openai".parse::<ProviderChoice>().unwrap(), ProviderChoice::Remote);
        assert_eq!("Remote".parse::<ProviderChoice>().unwrap(), ProviderChoice::Remote);
        assert_eq!(" local ".parse::<ProviderChoice>().unwrap(), ProviderChoice::Local);
        assert_eq!("none".parse::<ProviderChoice>().unwrap(), ProviderChoice::None);
        assert!("cohere".parse::<ProviderChoice>().is_err());
    }

    #[test]
    fn provider_choice_deserializes_openai_alias() {
        let choice: ProviderChoice = serde_json::from_str("\"openai\"").unwrap();
        assert_eq!(choice, ProviderChoice::Remote);
        let choice: ProviderChoice = serde_json::from_str("\"auto\"").unwrap();
        assert_eq!(choice, ProviderChoice::Auto);
    }

    #[test]
    fn l2_normalize_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn l2_normalize_zero_vector() {
        let mut v = vec![0.0, 0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn provider_key_display() {
        let key = ProviderKey::new(ProviderKind::Local, "bge-small-en-v1.5");
        assert_eq!(key.to_string(), "local:bge-small-en-v1.5");
    }
}
