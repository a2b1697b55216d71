//! Word-window chunking and cosine top-k ranking.
//!
//! The retrieval engine is deliberately simple: whitespace word windows with a
//! fixed overlap, one embedding call per chunk, and a full-scan cosine ranking.
//! At the sizes involved (a context passage capped at 40 chunks) anything
//! smarter would be noise.

use crate::embedding::Embedder;
use crate::gateway::ProviderError;

/// Default window size in words.
pub const DEFAULT_CHUNK_SIZE: usize = 400;
/// Default overlap between consecutive windows, in words.
pub const DEFAULT_OVERLAP: usize = 100;

/// A chunk of the source text. `index` is the position of the chunk's first
/// word in the source word sequence, so chunk order is recoverable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
}

/// A chunk scored against a query embedding.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Errors from the retrieval stack.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// Embedding one item failed; no partial embedding set is ever used.
    #[error("embedding failed for item {index}: {source}")]
    Embedding {
        index: usize,
        source: ProviderError,
    },
    #[error("vector index error: {0}")]
    Index(String),
}

/// Validated chunking parameters. `overlap` must be smaller than `size`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkParams {
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkParams {
    pub fn new(size: usize, overlap: usize) -> Result<Self, RetrievalError> {
        if size == 0 {
            return Err(RetrievalError::Index("chunk size must be positive".into()));
        }
        if overlap >= size {
            return Err(RetrievalError::Index(format!(
                "overlap ({overlap}) must be smaller than chunk size ({size})"
            )));
        }
        Ok(Self { size, overlap })
    }

    fn stride(&self) -> usize {
        self.size - self.overlap
    }
}

/// Split text into overlapping windows of `params.size` whitespace-delimited
/// words, advancing by `size - overlap` words per step.
///
/// The final window is always included even when it does not align with the
/// stride; once a window's end reaches the last word the loop stops, so no
/// duplicate trailing chunk is produced. Blank input yields no chunks.
pub fn chunk(text: &str, params: ChunkParams) -> Vec<Chunk> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }

    if words.len() <= params.size {
        return vec![Chunk {
            index: 0,
            text: words.join(" "),
        }];
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + params.size).min(words.len());
        chunks.push(Chunk {
            index: start,
            text: words[start..end].join(" "),
        });
        if start + params.size >= words.len() {
            break;
        }
        start += params.stride();
    }
    chunks
}

/// Cosine similarity with a divide-by-zero guard: zero-norm vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Score every chunk against the query embedding and return the top `k`,
/// descending. The sort is stable, so exact ties keep their original chunk
/// order. Full scan; no early termination.
pub fn top_k(
    query_embedding: &[f32],
    chunk_embeddings: &[Vec<f32>],
    chunks: &[Chunk],
    k: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = chunk_embeddings
        .iter()
        .zip(chunks.iter())
        .map(|(emb, chunk)| ScoredChunk {
            chunk: chunk.clone(),
            score: cosine_similarity(query_embedding, emb),
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

/// Embed every chunk, one call at a time. The first failure aborts the whole
/// retrieval for this question.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    chunks: &[Chunk],
) -> Result<Vec<Vec<f32>>, RetrievalError> {
    let mut embeddings = Vec::with_capacity(chunks.len());
    for (index, chunk) in chunks.iter().enumerate() {
        let emb = embedder
            .embed(&chunk.text)
            .await
            .map_err(|source| RetrievalError::Embedding { index, source })?;
        embeddings.push(emb);
    }
    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn short_text_single_chunk() {
        let text = words(50);
        let chunks = chunk(&text, ChunkParams::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn blank_text_no_chunks() {
        assert!(chunk("", ChunkParams::default()).is_empty());
        assert!(chunk("   \n\t ", ChunkParams::default()).is_empty());
    }

    #[test]
    fn windows_cover_all_words_with_fixed_stride() {
        let text = words(950);
        let params = ChunkParams::default();
        let chunks = chunk(&text, params);

        // Starts advance by size - overlap = 300: 0, 300, 600 (600+400 >= 950 stops).
        let starts: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(starts, vec![0, 300, 600]);

        // Every non-final chunk has exactly `size` words; the final window
        // reaches the last word.
        for c in &chunks[..chunks.len() - 1] {
            assert_eq!(c.text.split_whitespace().count(), params.size);
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.index + last.text.split_whitespace().count(), 950);

        // Union of chunk words covers the full input.
        let mut covered = vec![false; 950];
        for c in &chunks {
            let n = c.text.split_whitespace().count();
            for slot in covered.iter_mut().skip(c.index).take(n) {
                *slot = true;
            }
        }
        assert!(covered.iter().all(|&c| c));
    }

    #[test]
    fn exact_stride_alignment_has_no_duplicate_tail() {
        // 700 words, size 400, stride 300: windows at 0 and 300, the second
        // ending exactly at the last word.
        let text = words(700);
        let chunks = chunk(&text, ChunkParams::default());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].index, 300);
        assert_eq!(chunks[1].text.split_whitespace().count(), 400);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        assert!(ChunkParams::new(400, 100).is_ok());
        assert!(ChunkParams::new(100, 100).is_err());
        assert!(ChunkParams::new(100, 200).is_err());
        assert!(ChunkParams::new(0, 0).is_err());
    }

    #[test]
    fn cosine_of_self_is_one() {
        let v = vec![3.0, -4.0, 12.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector_guard() {
        let v = vec![1.0, 2.0];
        let z = vec![0.0, 0.0];
        assert_eq!(cosine_similarity(&v, &z), 0.0);
        assert_eq!(cosine_similarity(&z, &v), 0.0);
        assert_eq!(cosine_similarity(&z, &z), 0.0);
    }

    #[test]
    fn cosine_is_symmetric() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![-4.0, 0.5, 2.0];
        assert!((cosine_similarity(&a, &b) - cosine_similarity(&b, &a)).abs() < 1e-6);
    }

    fn mk_chunks(n: usize) -> Vec<Chunk> {
        (0..n)
            .map(|i| Chunk {
                index: i,
                text: format!("chunk {i}"),
            })
            .collect()
    }

    #[test]
    fn top_k_orders_descending_and_caps_length() {
        let chunks = mk_chunks(3);
        let query = vec![1.0, 0.0];
        let embs = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];

        let hits = top_k(&query, &embs, &chunks, 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.index, 1);
        assert!(hits[0].score >= hits[1].score);

        let all = top_k(&query, &embs, &chunks, 10);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn top_k_ties_keep_original_order() {
        let chunks = mk_chunks(3);
        let query = vec![1.0, 0.0];
        // Chunks 0 and 2 tie exactly; 0 must come first.
        let embs = vec![vec![2.0, 0.0], vec![0.0, 1.0], vec![5.0, 0.0]];

        let hits = top_k(&query, &embs, &chunks, 3);
        assert_eq!(hits[0].chunk.index, 0);
        assert_eq!(hits[1].chunk.index, 2);
        assert_eq!(hits[2].chunk.index, 1);
    }
}
