//! Core types for the completion gateway.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for call tracking and debugging.
///
/// Every request through the gateway names the code path that made it, so the
/// usage log can tell router calls apart from solver calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Attribution {
    /// Which code path made this call, e.g. "router::classify" or "solvers::stem".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self { caller }
    }
}

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The two hosted model tiers.
///
/// The service exposes the same chat-completions surface under two endpoints
/// with separate credentials and quotas. "Small" is cheap and fast; "large"
/// is the stronger reasoner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Small,
    Large,
}

impl ModelTier {
    /// Model id sent in the request payload.
    pub fn model_id(&self) -> &'static str {
        match self {
            ModelTier::Small => "vnptai_hackathon_small",
            ModelTier::Large => "vnptai_hackathon_large",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelTier::Small => "small",
            ModelTier::Large => "large",
        }
    }
}

impl std::str::FromStr for ModelTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "small" => Ok(ModelTier::Small),
            "large" => Ok(ModelTier::Large),
            other => Err(format!("unknown model tier: {other}")),
        }
    }
}

/// Request for a chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model tier to use.
    pub tier: ModelTier,
    /// Messages in the conversation.
    pub messages: Vec<Message>,
    /// Sampling temperature. Zero for deterministic answering.
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    pub top_p: f32,
    /// Top-k sampling cutoff.
    pub top_k: u32,
    /// Maximum completion tokens to generate.
    pub max_completion_tokens: Option<u32>,
    /// Whether to request strict JSON output.
    pub json_mode: bool,
    /// Seed for deterministic sampling, if any.
    pub seed: Option<u64>,
    /// Attribution for call tracking.
    pub attribution: Attribution,
}

impl ChatRequest {
    pub fn new(tier: ModelTier, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            tier,
            messages,
            temperature: 0.0,
            top_p: 1.0,
            top_k: 20,
            max_completion_tokens: None,
            json_mode: false,
            seed: None,
            attribution,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_completion_tokens(mut self, max: u32) -> Self {
        self.max_completion_tokens = Some(max);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// Response from a chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated content (assistant message).
    pub content: String,
    /// Time taken for the request.
    pub latency: Duration,
}

impl ChatResponse {
    pub(crate) fn empty() -> Self {
        Self {
            content: String::new(),
            latency: Duration::from_millis(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_model_ids() {
        assert_eq!(ModelTier::Small.model_id(), "vnptai_hackathon_small");
        assert_eq!(ModelTier::Large.model_id(), "vnptai_hackathon_large");
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("Large".parse::<ModelTier>().unwrap(), ModelTier::Large);
        assert_eq!("small".parse::<ModelTier>().unwrap(), ModelTier::Small);
        assert!("medium".parse::<ModelTier>().is_err());
    }

    #[test]
    fn chat_request_defaults() {
        let req = ChatRequest::new(
            ModelTier::Large,
            vec![Message::user("hi")],
            Attribution::new("test"),
        );
        assert_eq!(req.temperature, 0.0);
        assert_eq!(req.top_p, 1.0);
        assert_eq!(req.top_k, 20);
        assert!(!req.json_mode);
        assert!(req.seed.is_none());
        assert!(req.max_completion_tokens.is_none());
    }

    #[test]
    fn chat_request_builder() {
        let req = ChatRequest::new(
            ModelTier::Small,
            vec![Message::user("hi")],
            Attribution::new("test"),
        )
        .json()
        .seed(42)
        .max_completion_tokens(64);
        assert!(req.json_mode);
        assert_eq!(req.seed, Some(42));
        assert_eq!(req.max_completion_tokens, Some(64));
    }
}
