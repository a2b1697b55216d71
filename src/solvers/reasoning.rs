//! Reasoning solver: refusal validation (PC) and index-grounded answering (MD).

use once_cell::sync::Lazy;
use regex::Regex;

use super::SolverDeps;
use crate::gateway::{Attribution, ChatRequest, Message, ModelTier};
use crate::prompts;
use crate::router::Subtype;
use crate::vector_index::{format_context, DEFAULT_CONTEXT_CHAR_BUDGET};

/// Passages pulled from the external index per question.
const INDEX_TOP_K: usize = 5;
/// Both prompts demand a single letter.
const MAX_TOKENS: u32 = 5;

/// Openers that mark a choice as a responsible refusal.
static REFUSAL_OPENER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(tôi không thể|tôi không được phép|xin lỗi[, ]|không thể cung cấp)")
        .expect("invalid refusal opener regex")
});

/// Scan choices for refusal-style phrasing and return the first match's
/// letter, defaulting to 'A'.
pub fn heuristic_pick_refusal(choices: &[String]) -> char {
    for (i, choice) in choices.iter().enumerate() {
        if REFUSAL_OPENER.is_match(choice.trim()) {
            return prompts::letter_for(i);
        }
    }
    'A'
}

/// Whether `ch` addresses one of the given choices.
fn is_valid_choice(ch: char, n_choices: usize) -> bool {
    ch.is_ascii_uppercase() && ((ch as u8 - b'A') as usize) < n_choices
}

/// Solve one Reasoning question. Never fails.
pub async fn solve_reasoning(
    deps: &SolverDeps,
    question: &str,
    choices: &[String],
    subtype: Subtype,
) -> char {
    match subtype {
        Subtype::Pc => solve_pc(deps, question, choices).await,
        Subtype::Md | Subtype::Compulsory | Subtype::Na => {
            solve_grounded(deps, question, choices).await
        }
    }
}

/// PC path: ask the model to pick the responsible-refusal choice; fall back
/// to the deterministic refusal scan.
async fn solve_pc(deps: &SolverDeps, question: &str, choices: &[String]) -> char {
    let prompt = prompts::build_pc_validator_prompt(question, choices);
    let req = ChatRequest::new(
        ModelTier::Large,
        vec![Message::user(prompt)],
        Attribution::new("solvers::reasoning_pc"),
    )
    .max_completion_tokens(MAX_TOKENS);

    if let Ok(resp) = deps.gateway.chat(req).await {
        if let Some(ch) = resp.content.trim().chars().next() {
            if is_valid_choice(ch, choices.len()) {
                return ch;
            }
        }
    }
    heuristic_pick_refusal(choices)
}

/// MD/Compulsory path: ground the question in passages from the pre-built
/// index. Retrieval failures and an absent index both degrade to empty
/// context rather than aborting.
async fn solve_grounded(deps: &SolverDeps, question: &str, choices: &[String]) -> char {
    let context = match &deps.index {
        Some(index) => match index.similarity_search(question, INDEX_TOP_K).await {
            Ok(docs) => format_context(&docs, DEFAULT_CONTEXT_CHAR_BUDGET),
            Err(err) => {
                tracing::warn!(error = %err, "index retrieval failed; answering without context");
                String::new()
            }
        },
        None => String::new(),
    };

    let prompt = prompts::build_context_prompt(question, choices, &context);
    let req = ChatRequest::new(
        ModelTier::Large,
        vec![Message::user(prompt)],
        Attribution::new("solvers::reasoning_md"),
    )
    .max_completion_tokens(MAX_TOKENS);

    if let Ok(resp) = deps.gateway.chat(req).await {
        if let Some(ch) = resp.content.trim().chars().next() {
            if is_valid_choice(ch, choices.len()) {
                return ch;
            }
        }
    }
    'A'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn refusal_heuristic_finds_first_refusal_choice() {
        let cs = choices(&[
            "Hướng dẫn chi tiết cách thực hiện",
            "Tôi không thể cung cấp thông tin này",
            "Tôi không được phép trả lời",
        ]);
        assert_eq!(heuristic_pick_refusal(&cs), 'B');
    }

    #[test]
    fn refusal_heuristic_matches_apology_opener() {
        let cs = choices(&["Có, cách làm là...", "Xin lỗi, tôi không thể giúp việc này"]);
        assert_eq!(heuristic_pick_refusal(&cs), 'B');
    }

    #[test]
    fn refusal_heuristic_defaults_to_a() {
        let cs = choices(&["một", "hai", "ba"]);
        assert_eq!(heuristic_pick_refusal(&cs), 'A');
    }

    #[test]
    fn refusal_opener_must_be_a_prefix() {
        let cs = choices(&["Nói rằng tôi không thể là sai", "đáp án khác"]);
        assert_eq!(heuristic_pick_refusal(&cs), 'A');
    }

    #[test]
    fn choice_validity_respects_count() {
        assert!(is_valid_choice('A', 2));
        assert!(is_valid_choice('B', 2));
        assert!(!is_valid_choice('C', 2));
        assert!(!is_valid_choice('a', 2));
        assert!(!is_valid_choice('1', 2));
    }
}
