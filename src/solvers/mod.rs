//! Strategy solvers and dispatch.
//!
//! Every solver takes a question and its choices and returns one letter,
//! never an error: internal failures degrade to a safe default so a single
//! bad item can't abort a run.

pub mod rag;
pub mod reasoning;
pub mod stem;

use std::sync::Arc;

use crate::embedding::Embedder;
use crate::gateway::CompletionGateway;
use crate::router::{RouteLabel, RoutingDecision};
use crate::vector_index::VectorIndex;

/// Shared collaborators handed to solvers. Explicitly constructed and passed
/// in, so tests can substitute fakes for every seam.
pub struct SolverDeps {
    pub gateway: Arc<dyn CompletionGateway>,
    pub embedder: Arc<dyn Embedder>,
    /// Pre-built index for the Reasoning/MD path; absent means empty context.
    pub index: Option<Arc<dyn VectorIndex>>,
}

/// Dispatch a routed question to its solver and normalize the result.
pub async fn solve(
    deps: &SolverDeps,
    decision: RoutingDecision,
    question: &str,
    choices: &[String],
) -> char {
    let raw = match decision.label {
        RouteLabel::Rag => rag::solve_rag(deps, question, choices).await,
        RouteLabel::Stem => stem::solve_stem(deps, question, choices).await,
        RouteLabel::Reasoning => {
            reasoning::solve_reasoning(deps, question, choices, decision.subtype).await
        }
    };
    normalize_letter(raw, choices.len())
}

/// Normalize raw model output to a letter valid for the choice count.
///
/// The first A-Z character (after uppercasing) whose index fits the choice
/// count wins; anything else defaults to 'A'. With zero choices only 'A' is
/// accepted.
pub fn normalize_answer(raw: &str, n_choices: usize) -> char {
    let limit = n_choices.max(1);
    for ch in raw.trim().to_uppercase().chars() {
        if ch.is_ascii_uppercase() {
            let idx = (ch as u8 - b'A') as usize;
            if idx < limit {
                return ch;
            }
        }
    }
    'A'
}

/// Normalize a single already-extracted letter against the choice count.
pub fn normalize_letter(letter: char, n_choices: usize) -> char {
    normalize_answer(&letter.to_string(), n_choices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_output_defaults_to_a() {
        assert_eq!(normalize_answer("", 4), 'A');
        assert_eq!(normalize_answer("   ", 4), 'A');
    }

    #[test]
    fn lowercase_letter_in_range_is_uppercased() {
        assert_eq!(normalize_answer("c", 3), 'C');
    }

    #[test]
    fn out_of_range_letter_defaults_to_a() {
        assert_eq!(normalize_answer("Z", 2), 'A');
        assert_eq!(normalize_letter('D', 3), 'A');
    }

    #[test]
    fn first_valid_letter_wins() {
        // 'z' is out of range for 3 choices; 'b' is the first valid one.
        assert_eq!(normalize_answer("zb", 3), 'B');
        assert_eq!(normalize_answer("Đáp án: B", 4), 'B');
    }

    #[test]
    fn garbage_defaults_to_a() {
        assert_eq!(normalize_answer("42!?", 4), 'A');
    }

    #[test]
    fn zero_choices_accepts_only_a() {
        assert_eq!(normalize_answer("A", 0), 'A');
        assert_eq!(normalize_answer("B", 0), 'A');
    }
}
