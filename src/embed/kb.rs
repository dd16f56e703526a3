use super::{embed_blocking, late_interaction_score, Embedder};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Where a corpus entry came from. Web content keeps the single `webhtml`
/// tag regardless of whether the artifact was HTML or PDF.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Local,
    WebHtml,
}

/// Provenance metadata carried by every embedded document.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EntryMetadata {
    pub file_path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Short preview, roughly 100 chars.
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<String>,
}

impl EntryMetadata {
    pub fn local(file_path: String, snippet: String) -> Self {
        Self {
            file_path,
            kind: EntryKind::Local,
            snippet,
            url: None,
            source_engine: None,
            content_type: None,
            size: None,
            published_hint: None,
            downloaded_at: None,
        }
    }
}

/// An embedded document: unit-norm vector plus provenance.
#[derive(Debug, Clone)]
pub struct CorpusEntry {
    pub embedding: Vec<f32>,
    pub metadata: EntryMetadata,
}

/// Ordered, append-only collection of corpus entries sharing one embedding
/// space. Mutated only during session build-up; read-only at retrieval
/// time.
pub struct KnowledgeBase {
    embedder: Arc<dyn Embedder>,
    entries: Vec<CorpusEntry>,
}

impl KnowledgeBase {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append entries, enforcing the uniform-dimension invariant. Entries
    /// with a mismatched dimension are dropped with a warning.
    pub fn add_documents(&mut self, entries: Vec<CorpusEntry>) {
        let dim = self.embedder.dimension();
        for entry in entries {
            if entry.embedding.len() != dim {
                warn!(
                    "dropping corpus entry '{}': dimension {} != {}",
                    entry.metadata.file_path,
                    entry.embedding.len(),
                    dim
                );
                continue;
            }
            self.entries.push(entry);
        }
    }

    /// Top-k retrieval by dot product against the query embedding.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<CorpusEntry>> {
        if self.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let query_emb = embed_blocking(Arc::clone(&self.embedder), query.to_string()).await?;
        Ok(self.search_by_embedding(&query_emb, top_k))
    }

    /// Same as [`search`], with a precomputed query embedding.
    pub fn search_by_embedding(&self, query_emb: &[f32], top_k: usize) -> Vec<CorpusEntry> {
        let mut scored: Vec<(f32, &CorpusEntry)> = self
            .entries
            .iter()
            .map(|e| (late_interaction_score(query_emb, &e.embedding), e))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(top_k)
            .map(|(_, e)| e.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::testing::HashEmbedder;

    fn entry(embedder: &dyn Embedder, text: &str, path: &str) -> CorpusEntry {
        CorpusEntry {
            embedding: embedder.embed(text).unwrap(),
            metadata: EntryMetadata::local(path.to_string(), text.chars().take(100).collect()),
        }
    }

    #[tokio::test]
    async fn retrieves_most_similar_entry_first() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));
        let mut kb = KnowledgeBase::new(Arc::clone(&embedder));
        kb.add_documents(vec![
            entry(embedder.as_ref(), "rust borrow checker ownership", "a.txt"),
            entry(embedder.as_ref(), "gardening tips for tomatoes", "b.txt"),
            entry(embedder.as_ref(), "tokio async runtime internals", "c.txt"),
        ]);

        let hits = kb.search("rust ownership", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].metadata.file_path, "a.txt");
    }

    #[tokio::test]
    async fn empty_kb_returns_empty() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
        let kb = KnowledgeBase::new(embedder);
        assert!(kb.search("anything", 3).await.unwrap().is_empty());
    }

    #[test]
    fn mismatched_dimension_is_dropped() {
        let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(16));
        let mut kb = KnowledgeBase::new(embedder);
        kb.add_documents(vec![CorpusEntry {
            embedding: vec![1.0; 8],
            metadata: EntryMetadata::local("bad.txt".into(), String::new()),
        }]);
        assert!(kb.is_empty());
    }

    #[test]
    fn entry_kind_serializes_lowercase() {
        let meta = EntryMetadata::local("f.txt".into(), "snip".into());
        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json["type"], "local");

        let mut web = meta.clone();
        web.kind = EntryKind::WebHtml;
        let json = serde_json::to_value(&web).unwrap();
        assert_eq!(json["type"], "webhtml");
    }
}
