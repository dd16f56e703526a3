pub mod corpus;
pub mod kb;

use anyhow::{Context, Result};
use model2vec_rs::model::StaticModel;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Text → unit-norm vector. Everything retrieval-related goes through this
/// one seam so a session can never mix embedding spaces.
pub trait Embedder: Send + Sync {
    fn dimension(&self) -> usize;

    /// Returns an L2-normalized vector of `dimension()` floats.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Optional OCR seam for image-only corpus files. When absent, image-only
/// items are skipped rather than embedded in a mismatched space.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, path: &Path) -> Result<String>;
}

/// Retrieval model family. The family fixes the chunking constants; all
/// text goes through the same text embedder regardless, so vectors stay
/// dimension-uniform even for the vision families.
///
/// The asymmetric window/stride numbers reflect per-family context limits
/// and are kept verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalFamily {
    /// Sentence-transformer-style text model.
    Text,
    /// SigLIP/CLIP-style vision-language model with a text companion.
    Vision,
    /// ColPali-style mean-pooled retriever.
    ColPali,
}

impl RetrievalFamily {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "text" | "all-minilm" | "minilm" => Some(Self::Text),
            "vision" | "siglip" | "clip" => Some(Self::Vision),
            "colpali" => Some(Self::ColPali),
            _ => None,
        }
    }

    /// (window, stride) in chars for long-text chunking.
    pub fn chunking(&self) -> (usize, usize) {
        match self {
            RetrievalFamily::Vision => (200, 150),
            RetrievalFamily::ColPali => (400, 300),
            RetrievalFamily::Text => (1200, 800),
        }
    }
}

/// Model2Vec-backed text embedder. Loading and encoding are CPU-bound, so
/// async callers go through [`embed_blocking`].
pub struct StaticTextEmbedder {
    model: StaticModel,
    dimension: usize,
}

impl StaticTextEmbedder {
    /// Load a Model2Vec static model and probe its output dimension.
    pub async fn load(model_id: &str) -> Result<Self> {
        info!("loading embedding model: {}", model_id);
        let model_id = model_id.to_string();
        tokio::task::spawn_blocking(move || {
            let model = StaticModel::from_pretrained(&model_id, None, None, None)
                .with_context(|| format!("failed to load embedding model '{}'", model_id))?;
            let probe = model.encode_single("dimension probe");
            Ok(Self {
                dimension: probe.len(),
                model,
            })
        })
        .await
        .context("embedder init task failed")?
    }
}

impl Embedder for StaticTextEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vec = self.model.encode_single(text);
        if vec.len() != self.dimension {
            anyhow::bail!(
                "embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                vec.len()
            );
        }
        l2_normalize(&mut vec);
        Ok(vec)
    }
}

/// Run an embed on the blocking pool so the scheduler stays responsive.
pub async fn embed_blocking(embedder: Arc<dyn Embedder>, text: String) -> Result<Vec<f32>> {
    tokio::task::spawn_blocking(move || embedder.embed(&text))
        .await
        .context("embedding task failed")?
}

/// In-place L2 normalization. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-12 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Dot product of re-normalized vectors: cosine similarity on the unit
/// sphere. Mismatched or empty inputs score 0.
pub fn late_interaction_score(query_emb: &[f32], doc_emb: &[f32]) -> f32 {
    if query_emb.len() != doc_emb.len() || query_emb.is_empty() {
        return 0.0;
    }
    let dot: f32 = query_emb.iter().zip(doc_emb).map(|(a, b)| a * b).sum();
    let qn: f32 = query_emb.iter().map(|x| x * x).sum::<f32>().sqrt();
    let dn: f32 = doc_emb.iter().map(|x| x * x).sum::<f32>().sqrt();
    if qn < 1e-12 || dn < 1e-12 {
        return 0.0;
    }
    (dot / (qn * dn)).clamp(-1.0, 1.0)
}

/// Split `text` into overlapping char windows per the family's constants.
pub fn chunk_text(text: &str, window: usize, stride: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= window {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + window).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start += stride;
    }
    chunks
}

/// Embed long text: chunk per family constants, embed each window,
/// mean-pool, and re-normalize.
pub fn embed_long_text(
    embedder: &dyn Embedder,
    text: &str,
    family: RetrievalFamily,
) -> Result<Option<Vec<f32>>> {
    let (window, stride) = family.chunking();
    let chunks = chunk_text(text, window, stride);
    if chunks.is_empty() {
        return Ok(None);
    }

    let mut pooled = vec![0.0f32; embedder.dimension()];
    for chunk in &chunks {
        let emb = embedder.embed(chunk)?;
        for (acc, x) in pooled.iter_mut().zip(emb.iter()) {
            *acc += x;
        }
    }
    let n = chunks.len() as f32;
    for x in pooled.iter_mut() {
        *x /= n;
    }
    l2_normalize(&mut pooled);
    Ok(Some(pooled))
}
