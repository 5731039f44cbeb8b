use async_trait::async_trait;

use super::{EmbeddingProvider, ProviderKind};
use crate::error::{Error, Result};

/// Stands in when embeddings are turned off. Any non-empty request fails.
#[derive(Debug, Default)]
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Disabled
    }

    fn name(&self) -> String {
        "none".into()
    }

    fn dimensions(&self) -> usize {
        0
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        Err(Error::EmbeddingDisabled)
    }
}
