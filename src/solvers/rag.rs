//! RAG solver: answer from a passage supplied inside the question itself.

use once_cell::sync::Lazy;
use regex::Regex;

use super::SolverDeps;
use crate::gateway::{Attribution, ChatRequest, Message, ModelTier};
use crate::prompts;
use crate::retrieval::{self, ChunkParams};

/// Cap on live-chunked context, to bound embedding calls per question.
const MAX_CHUNKS: usize = 40;
/// How many chunks end up in the compact context.
const TOP_K: usize = 3;
/// The answer prompt produces an analysis block plus one letter.
const MAX_TOKENS: u32 = 1000;

static ANSWER_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\[ĐÁP ÁN\]\s*([A-Z])").expect("invalid answer marker regex"));

/// Split a question into (context, bare question): everything before the last
/// line break is context, the final line is the actual question. No line break
/// means no context.
pub fn split_context_question(text: &str) -> (String, String) {
    let t = text.replace("\r\n", "\n").replace('\r', "\n");
    let t = t.trim_end();
    match t.rfind('\n') {
        Some(idx) => (t[..idx].trim().to_string(), t[idx + 1..].trim().to_string()),
        None => (String::new(), t.trim().to_string()),
    }
}

/// Extract the letter after the `[ĐÁP ÁN]` marker, defaulting to 'A'.
pub fn extract_answer(response: &str) -> char {
    ANSWER_MARKER
        .captures(response)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().chars().next())
        .map(|ch| ch.to_ascii_uppercase())
        .unwrap_or('A')
}

/// Solve one RAG question. Never fails.
pub async fn solve_rag(deps: &SolverDeps, question: &str, choices: &[String]) -> char {
    let (context, bare_question) = split_context_question(question);

    let compact_context = if context.is_empty() {
        String::new()
    } else {
        match retrieve_compact_context(deps, &context, &bare_question).await {
            Ok(ctx) => ctx,
            Err(err) => {
                // No partial embedding set is ever used; degrade to answering
                // from the bare question alone.
                tracing::warn!(error = %err, "retrieval failed; answering without context");
                String::new()
            }
        }
    };

    let prompt = prompts::build_rag_prompt(&bare_question, &compact_context, choices);
    let req = ChatRequest::new(
        ModelTier::Large,
        vec![Message::user(prompt)],
        Attribution::new("solvers::rag"),
    )
    .max_completion_tokens(MAX_TOKENS);

    match deps.gateway.chat(req).await {
        Ok(resp) => extract_answer(&resp.content),
        Err(err) => {
            tracing::warn!(error = %err, "RAG completion failed; defaulting");
            'A'
        }
    }
}

/// Chunk the inline context, embed chunks plus the bare question, and join
/// the top-k chunks into a compact context block.
async fn retrieve_compact_context(
    deps: &SolverDeps,
    context: &str,
    bare_question: &str,
) -> Result<String, retrieval::RetrievalError> {
    let mut chunks = retrieval::chunk(context, ChunkParams::default());
    chunks.truncate(MAX_CHUNKS);
    if chunks.is_empty() {
        return Ok(String::new());
    }

    let chunk_embeddings = retrieval::embed_chunks(deps.embedder.as_ref(), &chunks).await?;
    let query_embedding = deps
        .embedder
        .embed(bare_question)
        .await
        .map_err(|source| retrieval::RetrievalError::Embedding {
            index: chunks.len(),
            source,
        })?;

    let hits = retrieval::top_k(&query_embedding, &chunk_embeddings, &chunks, TOP_K);
    Ok(hits
        .iter()
        .map(|h| h.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n"))
}
