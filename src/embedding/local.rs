//! Local ONNX Runtime embedding provider.
//!
//! Runs a sentence-transformer from the model catalogue in-process via `ort`:
//! tokenization, inference, attention-masked mean pooling, then L2 normalization.
//! Model files live under `<cache_dir>/<model>/` and are fetched by
//! `endee-mcp model download`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::{l2_normalize, EmbeddingProvider, ProviderKind};
use crate::error::{Error, Result};

/// Sequence length the catalogue models were trained at.
const MAX_SEQ_LEN: usize = 256;

/// Texts per inference call.
const INFERENCE_BATCH: usize = 32;

/// A model the local provider knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalModelSpec {
    /// HuggingFace repository, e.g. `sentence-transformers/all-MiniLM-L6-v2`.
    pub repo: &'static str,
    pub dimensions: usize,
    /// Whether the ONNX graph takes a `token_type_ids` input.
    pub token_type_ids: bool,
}

pub const MODEL_CATALOGUE: &[LocalModelSpec] = &[
    LocalModelSpec {
        repo: "sentence-transformers/all-MiniLM-L6-v2",
        dimensions: 384,
        token_type_ids: true,
    },
    LocalModelSpec {
        repo: "sentence-transformers/all-mpnet-base-v2",
        dimensions: 768,
        token_type_ids: false,
    },
    LocalModelSpec {
        repo: "BAAI/bge-small-en-v1.5",
        dimensions: 384,
        token_type_ids: true,
    },
    LocalModelSpec {
        repo: "BAAI/bge-base-en-v1.5",
        dimensions: 768,
        token_type_ids: true,
    },
];

impl LocalModelSpec {
    /// Look a model up by repository or by its bare name (`all-MiniLM-L6-v2`).
    pub fn find(name: &str) -> Result<&'static LocalModelSpec> {
        MODEL_CATALOGUE
            .iter()
            .find(|spec| {
                spec.repo.eq_ignore_ascii_case(name) || spec.short_name().eq_ignore_ascii_case(name)
            })
            .ok_or_else(|| {
                let known: Vec<&str> = MODEL_CATALOGUE.iter().map(|s| s.repo).collect();
                Error::Configuration(format!(
                    "unknown local embedding model '{name}' (supported: {})",
                    known.join(", ")
                ))
            })
    }

    pub fn short_name(&self) -> &'static str {
        self.repo.rsplit('/').next().unwrap_or(self.repo)
    }

    pub fn model_url(&self) -> String {
        format!("https://huggingface.co/{}/resolve/main/onnx/model.onnx", self.repo)
    }

    pub fn tokenizer_url(&self) -> String {
        format!("https://huggingface.co/{}/resolve/main/tokenizer.json", self.repo)
    }

    pub fn model_dir(&self, cache_dir: &Path) -> PathBuf {
        cache_dir.join(self.short_name())
    }

    pub fn model_path(&self, cache_dir: &Path) -> PathBuf {
        self.model_dir(cache_dir).join("model.onnx")
    }

    pub fn tokenizer_path(&self, cache_dir: &Path) -> PathBuf {
        self.model_dir(cache_dir).join("tokenizer.json")
    }

    pub fn is_downloaded(&self, cache_dir: &Path) -> bool {
        self.model_path(cache_dir).exists() && self.tokenizer_path(cache_dir).exists()
    }
}

fn inference_error(e: impl std::fmt::Display) -> Error {
    Error::EmbeddingProvider(format!("local inference failed: {e}"))
}

struct OnnxModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    spec: &'static LocalModelSpec,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex.
// The Mutex guarantees exclusive access during run().
unsafe impl Send for OnnxModel {}
unsafe impl Sync for OnnxModel {}

impl OnnxModel {
    fn load(spec: &'static LocalModelSpec, cache_dir: &Path) -> Result<Self> {
        let model_path = spec.model_path(cache_dir);
        let tokenizer_path = spec.tokenizer_path(cache_dir);

        for path in [&model_path, &tokenizer_path] {
            if !path.exists() {
                return Err(Error::Configuration(format!(
                    "{} not found. Run `endee-mcp model download` first.",
                    path.display()
                )));
            }
        }

        let build = || -> anyhow::Result<Session> {
            Ok(Session::builder()?
                .with_optimization_level(GraphOptimizationLevel::Level3)?
                .with_intra_threads(4)?
                .commit_from_file(&model_path)?)
        };
        let session = build()
            .map_err(|e| Error::EmbeddingProvider(format!("failed to load ONNX model: {e}")))?;

        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| Error::EmbeddingProvider(format!("failed to load tokenizer: {e}")))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| Error::EmbeddingProvider(format!("failed to set truncation: {e}")))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            spec,
        })
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(INFERENCE_BATCH) {
            results.extend(self.embed_chunk(batch)?);
        }
        Ok(results)
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| Error::EmbeddingProvider(format!("tokenization failed: {e}")))?;

        let batch_size = encodings.len();
        let seq_len = encodings.first().map_or(0, |e| e.get_ids().len());

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        for encoding in &encodings {
            input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))
            .map_err(inference_error)?;
        let mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask.clone().into_boxed_slice()))
                .map_err(inference_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| inference_error(format!("session lock poisoned: {e}")))?;

        let outputs = if self.spec.token_type_ids {
            let type_ids = vec![0i64; batch_size * seq_len];
            let type_tensor = Tensor::from_array((shape, type_ids.into_boxed_slice()))
                .map_err(inference_error)?;
            session.run(ort::inputs! {
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            })
        } else {
            session.run(ort::inputs! {
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
            })
        }
        .map_err(inference_error)?;

        // Output naming varies by export; fall back to the first output.
        let hidden = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);
        let (out_shape, data) = hidden.try_extract_tensor::<f32>().map_err(inference_error)?;

        let dims: &[i64] = &out_shape;
        if dims.len() != 3 || dims[2] as usize != self.spec.dimensions {
            return Err(inference_error(format!(
                "unexpected output shape {dims:?}, expected [batch, seq, {}]",
                self.spec.dimensions
            )));
        }
        let out_seq = dims[1] as usize;
        let hidden_dim = dims[2] as usize;

        Ok((0..batch_size)
            .map(|b| {
                let tokens = &data[b * out_seq * hidden_dim..(b + 1) * out_seq * hidden_dim];
                let mask = &attention_mask[b * seq_len..(b + 1) * seq_len];
                let mut pooled = mean_pool(tokens, mask, hidden_dim);
                l2_normalize(&mut pooled);
                pooled
            })
            .collect())
    }
}

/// Average the token embeddings whose attention mask is set.
fn mean_pool(tokens: &[f32], mask: &[i64], hidden_dim: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_dim];
    let mut count = 0.0f32;
    for (s, token) in tokens.chunks(hidden_dim).enumerate() {
        if mask.get(s).copied().unwrap_or(0) > 0 {
            sum.iter_mut().zip(token).for_each(|(acc, x)| *acc += x);
            count += 1.0;
        }
    }
    if count > 0.0 {
        sum.iter_mut().for_each(|x| *x /= count);
    }
    sum
}

/// In-process provider for one catalogue model.
pub struct LocalEmbeddingProvider {
    model: Arc<OnnxModel>,
}

impl LocalEmbeddingProvider {
    /// Load model and tokenizer from the cache. Blocking; takes seconds.
    pub fn load(model_name: &str, cache_dir: &Path) -> Result<Self> {
        let spec = LocalModelSpec::find(model_name)?;
        let model = OnnxModel::load(spec, cache_dir)?;
        Ok(Self {
            model: Arc::new(model),
        })
    }

    pub fn spec(&self) -> &'static LocalModelSpec {
        self.model.spec
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Local
    }

    fn name(&self) -> String {
        format!("local-{}", self.model.spec.short_name())
    }

    fn dimensions(&self) -> usize {
        self.model.spec.dimensions
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        reject_blank(texts)?;

        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.embed(&texts))
            .await
            .map_err(|e| Error::EmbeddingProvider(format!("embedding task failed: {e}")))?
    }
}

/// The model cannot embed whitespace-only text.
fn reject_blank(texts: &[String]) -> Result<()> {
    match texts.iter().position(|t| t.trim().is_empty()) {
        Some(pos) => Err(Error::InvalidInput(format!("text at position {pos} is empty"))),
        None => Ok(()),
    }
}
