//! STEM solver: chain-of-thought with a marker-line answer.

use once_cell::sync::Lazy;
use regex::Regex;

use super::SolverDeps;
use crate::gateway::{Attribution, ChatRequest, Message, ModelTier};
use crate::prompts;

/// Reasoning text is expected before the marker line.
const MAX_TOKENS: u32 = 2048;

static PRIMARY_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)### ANSWER:\s*([A-Z])").expect("invalid STEM marker regex"));
static SECONDARY_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Answer|Đáp án|Choice|Lựa chọn)[:\s]\s*([A-Z])")
        .expect("invalid STEM fallback regex")
});

/// Extract the answer letter from chain-of-thought output.
///
/// The `### ANSWER: X` marker is authoritative; an `Answer/Đáp án/Choice:`
/// pattern is the secondary fallback. `None` means the model produced no
/// recognizable answer — the caller decides the default.
pub fn extract_answer(output: &str) -> Option<char> {
    if output.trim().is_empty() {
        return None;
    }

    for marker in [&*PRIMARY_MARKER, &*SECONDARY_MARKER] {
        if let Some(ch) = marker
            .captures(output)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().chars().next())
        {
            return Some(ch.to_ascii_uppercase());
        }
    }
    None
}

/// Solve one STEM question. Never fails; a missed extraction or any service
/// error becomes 'A'.
pub async fn solve_stem(deps: &SolverDeps, question: &str, choices: &[String]) -> char {
    let prompt = prompts::build_cot_prompt(question, choices);
    let req = ChatRequest::new(
        ModelTier::Small,
        vec![Message::user(prompt)],
        Attribution::new("solvers::stem"),
    )
    .max_completion_tokens(MAX_TOKENS);

    match deps.gateway.chat(req).await {
        Ok(resp) => extract_answer(&resp.content).unwrap_or('A'),
        Err(err) => {
            tracing::warn!(error = %err, "STEM completion failed; defaulting");
            'A'
        }
    }
}
