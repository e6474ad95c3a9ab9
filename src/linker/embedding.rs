//! Embedding providers.
//!
//! A vault must use one provider and one model for its whole life: vectors
//! from different models are not comparable.
//!
//! - [`FastEmbedProvider`](super::FastEmbedProvider): local ONNX model (default)
//! - [`HttpEmbeddingProvider`]: any OpenAI-compatible `/v1/embeddings` endpoint
//! - [`HashingEmbeddingProvider`]: deterministic word-overlap stand-in for tests

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Generates vector embeddings from text.
///
/// Shared as `Arc<dyn EmbeddingProvider>`; built once at startup and reused
/// for every save.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, returning one vector per input in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Length of every vector this provider produces
    fn dimensions(&self) -> usize;

    /// Model name, for logs and `voxnote config`
    fn model_name(&self) -> &str;
}

// ============================================================================
// HTTP provider
// ============================================================================

/// Endpoint used when only the HTTP provider is selected (local Ollama)
pub const DEFAULT_HTTP_URL: &str = "http://localhost:11434/v1/embeddings";

/// Model used by the HTTP provider when none is configured
pub const DEFAULT_HTTP_MODEL: &str = "nomic-embed-text";

/// Output dimensions of well-known HTTP embedding models
pub fn known_dimensions(model: &str) -> Option<usize> {
    let dims = match model {
        "nomic-embed-text" | "nomic-embed-text:latest" => 768,
        "mxbai-embed-large" => 1024,
        "all-minilm" => 384,
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        "text-embedding-3-large" => 3072,
        _ => return None,
    };
    Some(dims)
}

/// HTTP embedding provider speaking the OpenAI `/v1/embeddings` format
#[derive(Clone)]
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl HttpEmbeddingProvider {
    /// Requests per batch; some providers cap the input array
    const BATCH_SIZE: usize = 64;

    pub fn new(
        url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        dimensions: usize,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            url: url.into(),
            model: model.into(),
            api_key,
            dimensions,
        })
    }

    async fn request_embeddings(&self, input: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut req = self.client.post(&self.url).json(&EmbeddingRequest {
            model: &self.model,
            input,
        });

        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req
            .send()
            .await
            .with_context(|| format!("Failed to connect to embedding API at {}", self.url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(ErrorResponse { error: Some(detail) }) = serde_json::from_str::<ErrorResponse>(&body) {
                anyhow::bail!("Embedding API error ({}): {}", status.as_u16(), detail.message);
            }
            anyhow::bail!("Embedding API returned {}: {}", status.as_u16(), body);
        }

        let resp: EmbeddingResponse = response
            .json()
            .await
            .context("Failed to parse embedding API response")?;

        let mut data = resp.data;
        data.sort_by_key(|d| d.index);

        if data.len() != input.len() {
            anyhow::bail!(
                "Embedding API returned {} vectors for {} inputs",
                data.len(),
                input.len()
            );
        }

        data.into_iter()
            .enumerate()
            .map(|(i, d)| {
                if d.embedding.len() != self.dimensions {
                    anyhow::bail!(
                        "Embedding dimension mismatch at index {}: expected {}, got {} (model: {})",
                        i,
                        self.dimensions,
                        d.embedding.len(),
                        self.model
                    );
                }
                Ok(d.embedding)
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(Self::BATCH_SIZE) {
            all.extend(self.request_embeddings(chunk).await?);
        }
        Ok(all)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Hashing provider
// ============================================================================

/// Bag-of-words embedding using the hashing trick.
///
/// Measures shared words, not meaning. Used as a deterministic, offline
/// provider in tests; real vaults use [`FastEmbedProvider`](super::FastEmbedProvider)
/// or [`HttpEmbeddingProvider`].
///
/// ASCII words become one token each; runs of other scripts (Japanese has no
/// spaces) are split into overlapping character bigrams. Each token is
/// hashed with SHA-256 into a signed bucket and the result is L2-normalized.
/// Empty text yields the zero vector.
///
/// ```
/// use voxnote::linker::{EmbeddingProvider, HashingEmbeddingProvider};
///
/// # tokio_test::block_on(async {
/// let provider = HashingEmbeddingProvider::new(256);
/// let texts = vec!["budget review".to_string(), "budget review".to_string()];
/// let vectors = provider.embed_batch(&texts).await.unwrap();
/// assert_eq!(vectors[0], vectors[1]);
/// assert_eq!(vectors[0].len(), 256);
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed one text
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in tokenize(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&digest[..8]);
            let hash = u64::from_le_bytes(bytes);

            let bucket = (hash % self.dimensions as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hashing-bow"
    }
}

/// Split text into hashing tokens
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    let mut script_run: Vec<char> = Vec::new();

    fn flush_word(word: &mut String, tokens: &mut Vec<String>) {
        if !word.is_empty() {
            tokens.push(std::mem::take(word));
        }
    }

    fn flush_run(run: &mut Vec<char>, tokens: &mut Vec<String>) {
        match run.len() {
            0 => {}
            1 => tokens.push(run[0].to_string()),
            _ => tokens.extend(run.windows(2).map(|w| w.iter().collect::<String>())),
        }
        run.clear();
    }

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            flush_run(&mut script_run, &mut tokens);
            word.push(c.to_ascii_lowercase());
        } else if c.is_alphanumeric() {
            flush_word(&mut word, &mut tokens);
            script_run.push(c);
        } else {
            flush_word(&mut word, &mut tokens);
            flush_run(&mut script_run, &mut tokens);
        }
    }
    flush_word(&mut word, &mut tokens);
    flush_run(&mut script_run, &mut tokens);

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_mixed_scripts() {
        assert_eq!(tokenize("Hello, World"), vec!["hello", "world"]);
        assert_eq!(tokenize("会議メモ"), vec!["会議", "議メ", "メモ"]);
        assert_eq!(tokenize("v2 の話"), vec!["v2", "の話"]);
        assert_eq!(tokenize("A会B"), vec!["a", "会", "b"]);
        assert!(tokenize("  ...  ").is_empty());
    }

    #[test]
    fn test_hashing_embedding_is_deterministic_and_normalized() {
        let provider = HashingEmbeddingProvider::new(128);
        let a = provider.embed_one("quarterly budget review");
        let b = provider.embed_one("quarterly budget review");
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let provider = HashingEmbeddingProvider::new(32);
        let v = provider.embed_one("");
        assert_eq!(v.len(), 32);
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let provider = HashingEmbeddingProvider::new(64);
        let texts = vec!["first".to_string(), "second".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], provider.embed_one("first"));
        assert_eq!(batch[1], provider.embed_one("second"));
    }

    #[test]
    fn test_http_provider_config() {
        let provider = HttpEmbeddingProvider::new(
            DEFAULT_HTTP_URL,
            DEFAULT_HTTP_MODEL,
            None,
            known_dimensions(DEFAULT_HTTP_MODEL).unwrap(),
        )
        .unwrap();
        assert_eq!(provider.model_name(), "nomic-embed-text");
        assert_eq!(provider.dimensions(), 768);
        assert!(provider.api_key.is_none());
    }

    #[test]
    fn test_known_dimensions() {
        assert_eq!(known_dimensions("nomic-embed-text"), Some(768));
        assert_eq!(known_dimensions("text-embedding-3-small"), Some(1536));
        assert_eq!(known_dimensions("my-custom-model"), None);
    }
}
