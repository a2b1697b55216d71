//! Read-only vector index for the Reasoning/MD answering path.
//!
//! The index is built offline from a reference corpus; at answer time it only
//! serves `similarity_search`. It is an explicitly constructed, injectable
//! object so tests can substitute a fake — never a hidden module-level global.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::embedding::Embedder;
use crate::retrieval::{cosine_similarity, RetrievalError};

/// Character budget for the formatted context block.
pub const DEFAULT_CONTEXT_CHAR_BUDGET: usize = 20_000;

/// A document returned by a similarity search.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub page_content: String,
    pub score: f32,
}

/// Read-only similarity search over a pre-built corpus.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, RetrievalError>;
}

/// One persisted index entry: a passage and its precomputed embedding.
#[derive(Debug, Clone, Deserialize)]
struct IndexEntry {
    text: String,
    embedding: Vec<f32>,
}

/// Flat index loaded from a JSON array of `{text, embedding}` entries.
///
/// Queries are embedded live via the injected [`Embedder`] and ranked with a
/// full-scan cosine pass. Corpora here are tens of thousands of passages at
/// most; a flat scan is exact and fast enough.
pub struct FlatFileIndex {
    entries: Vec<IndexEntry>,
    embedder: Arc<dyn Embedder>,
}

impl FlatFileIndex {
    /// Load the index artifact from disk.
    pub fn load(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self, RetrievalError> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RetrievalError::Index(format!("cannot read index file: {e}")))?;
        let entries: Vec<IndexEntry> = serde_json::from_str(&raw)
            .map_err(|e| RetrievalError::Index(format!("malformed index file: {e}")))?;
        Ok(Self { entries, embedder })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl VectorIndex for FlatFileIndex {
    async fn similarity_search(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, RetrievalError> {
        let query_emb = self
            .embedder
            .embed(query)
            .await
            .map_err(|source| RetrievalError::Embedding { index: 0, source })?;

        let mut scored: Vec<ScoredDocument> = self
            .entries
            .iter()
            .map(|e| ScoredDocument {
                page_content: e.text.clone(),
                score: cosine_similarity(&query_emb, &e.embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }
}

/// Format retrieved passages into a bounded context block.
///
/// Passages are labelled `[ĐOẠN i]` and joined with separators; once adding a
/// passage would exceed `max_chars`, formatting stops before it.
pub fn format_context(docs: &[ScoredDocument], max_chars: usize) -> String {
    let mut blocks = Vec::new();
    let mut total = 0;
    for (i, doc) in docs.iter().enumerate() {
        let text = doc.page_content.trim();
        if text.is_empty() {
            continue;
        }
        if total + text.len() > max_chars {
            break;
        }
        blocks.push(format!("[ĐOẠN {}]\n{}", i + 1, text));
        total += text.len();
    }
    blocks.join("\n\n---\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> ScoredDocument {
        ScoredDocument {
            page_content: text.to_string(),
            score: 0.0,
        }
    }

    #[test]
    fn format_context_labels_and_joins() {
        let docs = vec![doc("first passage"), doc("second passage")];
        let out = format_context(&docs, 20_000);
        assert!(out.starts_with("[ĐOẠN 1]\nfirst passage"));
        assert!(out.contains("\n\n---\n\n[ĐOẠN 2]\nsecond passage"));
    }

    #[test]
    fn format_context_stops_before_budget() {
        let docs = vec![doc(&"a".repeat(30)), doc(&"b".repeat(30)), doc("tail")];
        let out = format_context(&docs, 50);
        assert!(out.contains("[ĐOẠN 1]"));
        assert!(!out.contains("[ĐOẠN 2]"));
        assert!(!out.contains("tail"));
    }

    #[test]
    fn format_context_skips_blank_passages_but_keeps_numbering() {
        let docs = vec![doc("  "), doc("kept")];
        let out = format_context(&docs, 20_000);
        assert_eq!(out, "[ĐOẠN 2]\nkept");
    }

    #[test]
    fn format_context_empty_input() {
        assert_eq!(format_context(&[], 100), "");
    }
}
