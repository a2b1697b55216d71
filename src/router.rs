//! Question routing: heuristic short-circuit, LLM classification, fallbacks.
//!
//! The router decides which strategy answers a question. Its contract with the
//! classifier model is strict JSON, but the model's compliance is not
//! guaranteed, so parsing goes strict-JSON-first with a regex fallback, and
//! every failure mode lands on a safe decision instead of an error.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::gateway::{
    Attribution, ChatRequest, CompletionGateway, Message, ModelTier, ProviderError,
};
use crate::prompts;

/// Seed for the classifier call, for reproducible routing.
const CLASSIFIER_SEED: u64 = 42;
/// The classifier only emits a tiny JSON object.
const CLASSIFIER_MAX_TOKENS: u32 = 64;

// =============================================================================
// Decision types
// =============================================================================

/// Which strategy answers the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteLabel {
    Rag,
    Stem,
    Reasoning,
}

/// Reasoning subtype. `Na` for every non-Reasoning label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subtype {
    /// Precision-critical: the responsible answer is a refusal.
    Pc,
    /// Multi-domain: answered against the external vector index.
    Md,
    /// Safe textbook knowledge, folded under Reasoning.
    Compulsory,
    Na,
}

impl Subtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subtype::Pc => "PC",
            Subtype::Md => "MD",
            Subtype::Compulsory => "Compulsory",
            Subtype::Na => "NA",
        }
    }
}

impl RouteLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteLabel::Rag => "RAG",
            RouteLabel::Stem => "STEM",
            RouteLabel::Reasoning => "Reasoning",
        }
    }
}

/// Routing decision. Invariant: `subtype != Na` only when `label == Reasoning`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingDecision {
    pub label: RouteLabel,
    pub subtype: Subtype,
}

impl RoutingDecision {
    fn new(label: RouteLabel, subtype: Subtype) -> Self {
        Self { label, subtype }
    }
}

// =============================================================================
// Inline-passage heuristic
// =============================================================================

static RAG_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bđoạn thông tin\b").expect("invalid RAG marker regex"));

/// Whether the question carries an inline information passage. This is the
/// only corroboration the router trusts for the RAG label, and the only path
/// that never touches the network.
pub fn has_inline_passage(question: &str) -> bool {
    RAG_MARKER.is_match(question)
}

// =============================================================================
// Classifier output parsing
// =============================================================================

/// Raw classifier verdict before label mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierVerdict {
    /// The four-way label digit, 1..=4.
    pub label4: u8,
    pub subtype: Subtype,
}

static LABEL4_FALLBACK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""label4"\s*:\s*"([1-4])""#).expect("invalid label4 regex"));
static SUBTYPE_FALLBACK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)"subtype"\s*:\s*"(PC|MD|COMPULSORY|NA)""#).expect("invalid subtype regex")
});

fn normalize_subtype(raw: &str) -> Subtype {
    match raw.trim().to_uppercase().as_str() {
        "PC" => Subtype::Pc,
        "MD" => Subtype::Md,
        "COMPULSORY" => Subtype::Compulsory,
        _ => Subtype::Na,
    }
}

/// Parse the classifier's output into a verdict.
///
/// Strict JSON first: if the body is a JSON object, `label4` must be "1".."4"
/// or the whole classification fails (no fallback — the model answered in the
/// right shape with the wrong content). The regex fallback only applies when
/// the body is not a JSON object, e.g. JSON wrapped in prose.
pub fn parse_classifier_output(raw: &str) -> Option<ClassifierVerdict> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(serde_json::Value::Object(obj)) = serde_json::from_str::<serde_json::Value>(s) {
        let label4 = obj
            .get("label4")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .unwrap_or_default();
        let label4 = match label4 {
            "1" => 1,
            "2" => 2,
            "3" => 3,
            "4" => 4,
            _ => return None,
        };
        let subtype = obj
            .get("subtype")
            .and_then(|v| v.as_str())
            .map(normalize_subtype)
            .unwrap_or(Subtype::Na);
        return Some(finish_verdict(label4, subtype));
    }

    let label4 = LABEL4_FALLBACK
        .captures(s)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<u8>().ok())?;
    let subtype = SUBTYPE_FALLBACK
        .captures(s)
        .and_then(|c| c.get(1))
        .map(|m| normalize_subtype(m.as_str()))
        .unwrap_or(Subtype::Na);

    Some(finish_verdict(label4, subtype))
}

fn finish_verdict(label4: u8, subtype: Subtype) -> ClassifierVerdict {
    ClassifierVerdict {
        label4,
        subtype: if label4 == 4 { subtype } else { Subtype::Na },
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Classify a question into a routing decision. Never fails; every service or
/// parse failure maps to a safe fallback:
///
/// 1. Inline-passage marker ⇒ `(Rag, Na)` with zero completion calls.
/// 2. LLM classification, mapped 1→Rag, 2→(Reasoning, Compulsory), 3→Stem,
///    4→Reasoning.
/// 3. Classifier said Rag but the marker is absent ⇒ `(Reasoning, Md)`.
/// 4. Safety refusal ⇒ `(Reasoning, Pc)`; anything else ⇒ `(Reasoning, Md)`.
pub async fn classify(
    gateway: &dyn CompletionGateway,
    tier: ModelTier,
    question: &str,
    choices: &[String],
) -> RoutingDecision {
    if has_inline_passage(question) {
        return RoutingDecision::new(RouteLabel::Rag, Subtype::Na);
    }

    let req = ChatRequest::new(
        tier,
        vec![
            Message::system(prompts::CLASSIFIER_SYSTEM_PROMPT),
            Message::user(prompts::format_mcq_for_classifier(question, choices)),
        ],
        Attribution::new("router::classify"),
    )
    .json()
    .seed(CLASSIFIER_SEED)
    .max_completion_tokens(CLASSIFIER_MAX_TOKENS);

    match gateway.chat(req).await {
        Ok(resp) => match parse_classifier_output(&resp.content) {
            Some(verdict) => decision_from_verdict(verdict, question),
            None => RoutingDecision::new(RouteLabel::Reasoning, Subtype::Md),
        },
        Err(ProviderError::Refused { .. }) => {
            RoutingDecision::new(RouteLabel::Reasoning, Subtype::Pc)
        }
        Err(err) => {
            tracing::warn!(error = %err, "classifier call failed; routing to Reasoning/MD");
            RoutingDecision::new(RouteLabel::Reasoning, Subtype::Md)
        }
    }
}

fn decision_from_verdict(verdict: ClassifierVerdict, question: &str) -> RoutingDecision {
    match verdict.label4 {
        1 => {
            // RAG is only trusted when the inline-passage marker corroborates it.
            if has_inline_passage(question) {
                RoutingDecision::new(RouteLabel::Rag, Subtype::Na)
            } else {
                RoutingDecision::new(RouteLabel::Reasoning, Subtype::Md)
            }
        }
        2 => RoutingDecision::new(RouteLabel::Reasoning, Subtype::Compulsory),
        3 => RoutingDecision::new(RouteLabel::Stem, Subtype::Na),
        _ => {
            let subtype = match verdict.subtype {
                Subtype::Pc | Subtype::Md | Subtype::Compulsory => verdict.subtype,
                Subtype::Na => Subtype::Md,
            };
            RoutingDecision::new(RouteLabel::Reasoning, subtype)
        }
    }
}
