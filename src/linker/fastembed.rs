//! Local embedding provider using fastembed-rs (ONNX Runtime).
//!
//! Default provider: runs a sentence-embedding model in-process, so linking
//! works without an embedding server. The ONNX model is downloaded into the
//! cache directory on first use and loaded lazily, on the first save that
//! actually has other notes to compare against.
//!
//! Default model: `all-minilm-l6-v2` (384d).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, TextEmbedding, TextInitOptions};
use tokio::sync::Mutex;

use super::EmbeddingProvider;

/// Model used when none is configured
pub const DEFAULT_FASTEMBED_MODEL: &str = "all-minilm-l6-v2";

/// Model name → `EmbeddingModel` variant.
///
/// Short lowercase identifiers, case-insensitive. Unknown names are rejected
/// rather than silently replaced: a vault must keep one model.
pub fn parse_model_name(name: &str) -> Option<EmbeddingModel> {
    let model = match name.to_lowercase().as_str() {
        // All-MiniLM
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            EmbeddingModel::AllMiniLML6V2
        }
        "all-minilm-l12-v2" => EmbeddingModel::AllMiniLML12V2,
        // Multilingual
        "multilingual-e5-small" | "intfloat/multilingual-e5-small" => {
            EmbeddingModel::MultilingualE5Small
        }
        "multilingual-e5-base" | "intfloat/multilingual-e5-base" => {
            EmbeddingModel::MultilingualE5Base
        }
        "multilingual-e5-large" | "intfloat/multilingual-e5-large" => {
            EmbeddingModel::MultilingualE5Large
        }
        // BGE
        "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "bge-m3" => EmbeddingModel::BGEM3,
        // Nomic
        "nomic-embed-text-v1.5" => EmbeddingModel::NomicEmbedTextV15,
        _ => return None,
    };
    Some(model)
}

fn model_dimensions(model: &EmbeddingModel) -> Result<usize> {
    TextEmbedding::get_model_info(model)
        .map(|info| info.dim)
        .with_context(|| format!("No model info for {:?}", model))
}

fn load_model(model: EmbeddingModel, cache_dir: Option<PathBuf>) -> Result<TextEmbedding> {
    let mut options = TextInitOptions::new(model).with_show_download_progress(true);
    if let Some(dir) = cache_dir {
        options = options.with_cache_dir(dir);
    }

    TextEmbedding::try_new(options).context("Failed to initialize fastembed ONNX model")
}

/// Local embedding provider backed by fastembed.
///
/// `TextEmbedding::embed` needs `&mut self`, so the model sits behind an
/// `Arc<Mutex<_>>`. Inference is CPU-bound and always runs on
/// `spawn_blocking`.
pub struct FastEmbedProvider {
    model: Arc<Mutex<Option<TextEmbedding>>>,
    variant: EmbeddingModel,
    model_name: String,
    dimensions: usize,
    cache_dir: Option<PathBuf>,
}

impl FastEmbedProvider {
    /// Create a provider for a named model. Does not load the model yet.
    pub fn new(model_name: &str, cache_dir: Option<PathBuf>) -> Result<Self> {
        let variant = parse_model_name(model_name).with_context(|| {
            format!(
                "Unknown fastembed model: {} (e.g. {})",
                model_name, DEFAULT_FASTEMBED_MODEL
            )
        })?;
        let dimensions = model_dimensions(&variant)?;

        Ok(Self {
            model: Arc::new(Mutex::new(None)),
            variant,
            model_name: model_name.to_lowercase(),
            dimensions,
            cache_dir,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let model = self.model.clone();
        let variant = self.variant.clone();
        let cache_dir = self.cache_dir.clone();
        let model_name = self.model_name.clone();
        let dimensions = self.dimensions;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = model.blocking_lock();
            if guard.is_none() {
                *guard = Some(load_model(variant, cache_dir)?);
                tracing::info!(model = %model_name, dimensions, "fastembed model loaded");
            }
            let Some(embedding) = guard.as_mut() else {
                anyhow::bail!("fastembed model not loaded");
            };
            embedding
                .embed(texts, None)
                .context("FastEmbed embed_batch failed")
        })
        .await
        .context("FastEmbed spawn_blocking panicked")?
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
