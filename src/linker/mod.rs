//! Similarity linking between notes.
//!
//! Given a new note and the rest of the vault, embed everything in one
//! batch, rank existing notes by cosine similarity to the new one, and render
//! a "related notes" block with one `[[stem]]` reference per line.
//!
//! Every save re-embeds the whole vault. Nothing is cached, so the cost of a
//! save grows linearly with the number of notes.

pub mod embedding;
pub mod fastembed;

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::vault::naming::stem;
use crate::vault::{VaultError, VaultResult};

pub use self::fastembed::{FastEmbedProvider, DEFAULT_FASTEMBED_MODEL};
pub use embedding::{
    known_dimensions, EmbeddingProvider, HashingEmbeddingProvider, HttpEmbeddingProvider,
    DEFAULT_HTTP_MODEL, DEFAULT_HTTP_URL,
};

/// Default number of related notes linked from a new note
pub const DEFAULT_TOP_K: usize = 3;

/// Default heading of the related-notes section
pub const DEFAULT_LINK_HEADING: &str = "関連メモ";

/// Cosine similarity of two vectors.
///
/// Zero-magnitude vectors are similar to nothing (score 0). Vectors of
/// different lengths are compared over their common prefix; the linker
/// rejects mismatched dimensions before ranking.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Indices of the `k` candidates most similar to `query`, best first.
///
/// Returns at most `min(k, candidates.len())` indices. The sort is stable:
/// candidates with equal scores keep their original relative order.
pub fn rank(query: &[f32], candidates: &[Vec<f32>], k: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, cosine_similarity(query, c)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored.truncate(k.min(candidates.len()));

    scored.into_iter().map(|(i, _)| i).collect()
}

/// Render the related-notes block.
///
/// Empty input renders nothing; callers skip appending in that case.
pub fn render_links(heading: &str, identifiers: &[String]) -> String {
    if identifiers.is_empty() {
        return String::new();
    }

    let mut block = format!("\n\n## {}\n", heading);
    for identifier in identifiers {
        block.push_str(&format!("- [[{}]]\n", stem(identifier)));
    }
    block
}

/// Ranks vault notes against new content using an injected embedding model
#[derive(Clone)]
pub struct SimilarityLinker {
    provider: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    heading: String,
    embed_timeout: Option<Duration>,
}

impl SimilarityLinker {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            provider,
            top_k: DEFAULT_TOP_K,
            heading: DEFAULT_LINK_HEADING.to_string(),
            embed_timeout: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_heading(mut self, heading: impl Into<String>) -> Self {
        self.heading = heading.into();
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn heading(&self) -> &str {
        &self.heading
    }

    pub fn provider(&self) -> &dyn EmbeddingProvider {
        self.provider.as_ref()
    }

    /// Embed texts in one batch, enforcing the timeout and result shape
    pub async fn embed(&self, texts: &[String]) -> VaultResult<Vec<Vec<f32>>> {
        let call = self.provider.embed_batch(texts);

        let result = match self.embed_timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                VaultError::Embedding(format!("embedding timed out after {:?}", limit))
            })?,
            None => call.await,
        };

        let vectors = result.map_err(|e| VaultError::Embedding(format!("{:#}", e)))?;

        if vectors.len() != texts.len() {
            return Err(VaultError::Embedding(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let dims = self.provider.dimensions();
        if let Some(bad) = vectors.iter().position(|v| v.len() != dims) {
            return Err(VaultError::Embedding(format!(
                "embedding {} has {} dimensions, expected {}",
                bad,
                vectors[bad].len(),
                dims
            )));
        }

        Ok(vectors)
    }

    /// Identifiers of the notes in `others` most related to `content`, best first.
    ///
    /// `others` are `(identifier, content)` pairs. The new content is embedded
    /// last in the same batch as the others.
    pub async fn related(
        &self,
        content: &str,
        others: &[(String, String)],
    ) -> VaultResult<Vec<String>> {
        if others.is_empty() || self.top_k == 0 {
            return Ok(Vec::new());
        }

        let mut texts: Vec<String> = others.iter().map(|(_, text)| text.clone()).collect();
        texts.push(content.to_string());

        let mut vectors = self.embed(&texts).await?;
        let query = vectors.pop().ok_or_else(|| {
            VaultError::Embedding("embedding provider returned no vectors".to_string())
        })?;

        let ranked = rank(&query, &vectors, self.top_k);
        debug!(
            candidates = others.len(),
            linked = ranked.len(),
            model = self.provider.model_name(),
            "ranked related notes"
        );

        Ok(ranked.into_iter().map(|i| others[i].0.clone()).collect())
    }

    /// Render the related-notes block with this linker's heading
    pub fn render_links(&self, identifiers: &[String]) -> String {
        render_links(&self.heading, identifiers)
    }
}
