//! VNPT AI adapter for chat completions.
//!
//! The service exposes an OpenAI-style chat surface under two endpoints
//! ("small" and "large" tiers) with separate credentials. Errors are sometimes
//! wrapped: the JSON body carries a `dataBase64` field whose base64 payload
//! decodes to the real `{"error":{"code":...,"message":...}}` object. Policy
//! refusals arrive as wrapped 400s and must not be retried.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use super::error::{ErrorContext, ProviderError};
use super::types::*;

// =============================================================================
// TRAIT
// =============================================================================

/// Trait for chat completion providers.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError>;
}

// =============================================================================
// VNPT ADAPTER
// =============================================================================

const PROVIDER: &str = "vnpt";

/// Maximum allowed input characters across all messages.
const MAX_INPUT_CHARS: usize = 120_000;

/// How long the caller should wait after a remote rate limit.
const RATE_LIMIT_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Credentials and endpoint for one model tier.
#[derive(Debug, Clone)]
pub struct TierConfig {
    pub url: String,
    pub auth: String,
    pub token_id: String,
    pub token_key: String,
}

impl TierConfig {
    /// Read a tier's endpoint and credentials from `API_URL_{SUFFIX}`,
    /// `AUTH_{SUFFIX}`, `TOKEN_ID_{SUFFIX}`, `TOKEN_KEY_{SUFFIX}`.
    pub fn from_env(suffix: &str) -> Result<Self, ProviderError> {
        let var = |name: &str| -> String {
            std::env::var(format!("{name}_{suffix}"))
                .unwrap_or_default()
                .trim()
                .to_string()
        };
        let cfg = Self {
            url: var("API_URL"),
            auth: var("AUTH"),
            token_id: var("TOKEN_ID"),
            token_key: var("TOKEN_KEY"),
        };
        if cfg.url.is_empty() {
            return Err(ProviderError::config(format!("API_URL_{suffix} not set")));
        }
        // Fail fast on missing credentials rather than on the first 401.
        if cfg.auth.is_empty() || cfg.token_id.is_empty() || cfg.token_key.is_empty() {
            return Err(ProviderError::config(format!(
                "missing auth headers for {suffix}: need AUTH, TOKEN_ID, TOKEN_KEY"
            )));
        }
        Ok(cfg)
    }

    fn headers(&self) -> Result<HeaderMap, ProviderError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let value = |v: &str| {
            HeaderValue::from_str(v)
                .map_err(|_| ProviderError::config("invalid header value in tier credentials"))
        };
        headers.insert(AUTHORIZATION, value(&self.auth)?);
        headers.insert("Token-id", value(&self.token_id)?);
        headers.insert("Token-key", value(&self.token_key)?);
        Ok(headers)
    }
}

/// VNPT API adapter for chat completions over the two model tiers.
#[derive(Debug, Clone)]
pub struct VnptAdapter {
    client: reqwest::Client,
    small: TierEndpoint,
    large: TierEndpoint,
}

#[derive(Debug, Clone)]
struct TierEndpoint {
    url: String,
    headers: HeaderMap,
}

impl VnptAdapter {
    /// Create from environment variables (`API_URL_SMALL`, `API_URL_LARGE`, ...).
    pub fn from_env() -> Result<Self, ProviderError> {
        let timeout = std::env::var("VNPT_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        Self::with_config(
            TierConfig::from_env("SMALL")?,
            TierConfig::from_env("LARGE")?,
            timeout,
        )
    }

    /// Create with explicit tier configuration.
    pub fn with_config(
        small: TierConfig,
        large: TierConfig,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            small: TierEndpoint {
                url: small.url.clone(),
                headers: small.headers()?,
            },
            large: TierEndpoint {
                url: large.url.clone(),
                headers: large.headers()?,
            },
        })
    }

    fn endpoint(&self, tier: ModelTier) -> &TierEndpoint {
        match tier {
            ModelTier::Small => &self.small,
            ModelTier::Large => &self.large,
        }
    }
}

// =============================================================================
// API TYPES
// =============================================================================

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'static str,
    messages: &'a [Message],
    temperature: f32,
    top_p: f32,
    top_k: u32,
    n: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    choices: Option<Vec<Choice>>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Outer shape of a wrapped error body: `{"dataSign":"...","dataBase64":"..."}`.
#[derive(Deserialize)]
struct WrappedBody {
    #[serde(rename = "dataBase64")]
    data_base64: Option<String>,
}

/// Inner decoded error object.
#[derive(Deserialize)]
struct DecodedError {
    error: Option<DecodedErrorBody>,
}

#[derive(Deserialize)]
struct DecodedErrorBody {
    code: Option<i64>,
    message: Option<String>,
}

// =============================================================================
// ERROR DECODING
// =============================================================================

/// Phrases that mark a decoded 400 as a policy/safety refusal.
const SAFETY_SIGNALS: &[&str] = &[
    "tôi không thể",
    "không thể cung cấp",
    "không thể hỗ trợ",
    "an toàn",
    "chính sách",
    "policy",
    "vi phạm",
    "bất hợp pháp",
    "từ chối",
    "refuse",
];

/// Decode the base64-wrapped error object from a response body, if present.
fn decode_wrapped_error(body: &str) -> Option<DecodedErrorBody> {
    let wrapped: WrappedBody = serde_json::from_str(body).ok()?;
    let b64 = wrapped.data_base64?;
    let raw = BASE64.decode(b64.as_bytes()).ok()?;
    let text = String::from_utf8_lossy(&raw);
    let decoded: DecodedError = serde_json::from_str(&text).ok()?;
    decoded.error
}

/// Whether a decoded error is a policy/safety refusal we must not retry.
fn is_safety_refusal(err: &DecodedErrorBody) -> bool {
    if err.code != Some(400) {
        return false;
    }
    let msg = err.message.as_deref().unwrap_or_default().to_lowercase();
    SAFETY_SIGNALS.iter().any(|s| msg.contains(s))
}

// =============================================================================
// CHAT PROVIDER IMPL
// =============================================================================

#[async_trait]
impl ChatProvider for VnptAdapter {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let total_chars: usize = req.messages.iter().map(|m| m.content.len()).sum();
        if total_chars > MAX_INPUT_CHARS {
            return Err(ProviderError::invalid_request(format!(
                "input too large: {total_chars} chars (max {MAX_INPUT_CHARS})"
            )));
        }

        let endpoint = self.endpoint(req.tier);

        let api_req = ChatApiRequest {
            model: req.tier.model_id(),
            messages: &req.messages,
            temperature: req.temperature,
            top_p: req.top_p,
            top_k: req.top_k,
            n: 1,
            max_completion_tokens: req.max_completion_tokens,
            response_format: if req.json_mode {
                Some(ResponseFormat {
                    format_type: "json_object",
                })
            } else {
                None
            },
            seed: req.seed,
        };

        let start = Instant::now();

        let response = self
            .client
            .post(&endpoint.url)
            .headers(endpoint.headers.clone())
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let ctx = ErrorContext::new().with_status(status.as_u16());

        // 429 and 403 both mean the quota is gone for a while; the batch
        // worker pauses on this discriminant instead of burning retries.
        if status.as_u16() == 429 || status.as_u16() == 403 {
            return Err(ProviderError::rate_limited(RATE_LIMIT_RETRY_AFTER, ctx));
        }

        if status.is_server_error() {
            return Err(ProviderError::provider_with_context(
                PROVIDER,
                format!("HTTP {}", status.as_u16()),
                true,
                ctx,
            ));
        }

        if !status.is_success() {
            // Other 4xx: the real error may be wrapped in a base64 payload.
            if let Some(decoded) = decode_wrapped_error(&body) {
                if is_safety_refusal(&decoded) {
                    return Err(ProviderError::refused_with_context(
                        decoded.message.unwrap_or_else(|| "policy refusal".into()),
                        ctx.with_code("safety_refusal_400"),
                    ));
                }
            }
            return Err(ProviderError::provider_with_context(
                PROVIDER,
                format!("HTTP {}: {}", status.as_u16(), truncate(&body, 200)),
                true,
                ctx,
            ));
        }

        let parsed: ChatApiResponse = match serde_json::from_str(&body) {
            Ok(p) => p,
            Err(e) => {
                return Err(ProviderError::provider_with_context(
                    PROVIDER,
                    format!("invalid JSON body: {e}"),
                    true,
                    ctx,
                ))
            }
        };

        let content = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .and_then(|m| m.content);

        match content {
            Some(content) => Ok(ChatResponse {
                content,
                latency: start.elapsed(),
            }),
            None => {
                // A 200 with no choices can still carry a wrapped refusal.
                if let Some(decoded) = decode_wrapped_error(&body) {
                    if is_safety_refusal(&decoded) {
                        return Err(ProviderError::refused_with_context(
                            decoded.message.unwrap_or_else(|| "policy refusal".into()),
                            ctx.with_code("safety_refusal_400"),
                        ));
                    }
                }
                Err(ProviderError::provider_with_context(
                    PROVIDER,
                    "no choices in response",
                    true,
                    ctx,
                ))
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
