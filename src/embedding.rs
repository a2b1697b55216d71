//! Embedding client for the VNPT embedding endpoint.
//!
//! One HTTP call per text unit. The service has no batched request form, so
//! the retrieval engine loops over chunks and aborts on the first failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::gateway::{ErrorContext, ProviderError};

const EMBED_MODEL_ID: &str = "vnptai_hackathon_embedding";

/// Trait for embedding providers. Each call embeds exactly one text.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// VNPT embedding API client.
#[derive(Debug, Clone)]
pub struct VnptEmbedder {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
}

impl VnptEmbedder {
    /// Create from `API_URL_EMBED`, `AUTH_EMBED`, `TOKEN_ID_EMBED`, `TOKEN_KEY_EMBED`.
    pub fn from_env() -> Result<Self, ProviderError> {
        let var = |name: &str| -> String {
            std::env::var(name).unwrap_or_default().trim().to_string()
        };
        Self::with_config(
            var("API_URL_EMBED"),
            var("AUTH_EMBED"),
            var("TOKEN_ID_EMBED"),
            var("TOKEN_KEY_EMBED"),
            Duration::from_secs(60),
        )
    }

    /// Create with explicit configuration.
    pub fn with_config(
        url: impl Into<String>,
        auth: impl Into<String>,
        token_id: impl Into<String>,
        token_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let url = url.into();
        let auth = auth.into();
        let token_id = token_id.into();
        let token_key = token_key.into();

        if url.is_empty() || auth.is_empty() || token_id.is_empty() || token_key.is_empty() {
            return Err(ProviderError::config(
                "missing embedding environment variables (API_URL_EMBED, AUTH_EMBED, TOKEN_ID_EMBED, TOKEN_KEY_EMBED)",
            ));
        }

        // The embedding endpoint expects a Bearer credential; the chat tiers don't.
        let auth = if auth.to_lowercase().starts_with("bearer ") {
            auth
        } else {
            format!("Bearer {auth}")
        };

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let value = |v: &str| {
            HeaderValue::from_str(v)
                .map_err(|_| ProviderError::config("invalid header value in embedding credentials"))
        };
        headers.insert(AUTHORIZATION, value(&auth)?);
        headers.insert("Token-id", value(&token_id)?);
        headers.insert("Token-key", value(&token_key)?);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            headers,
        })
    }
}

#[derive(Serialize)]
struct EmbedApiRequest<'a> {
    model: &'static str,
    input: &'a str,
    encoding_format: &'static str,
}

#[derive(Deserialize)]
struct EmbedApiResponse {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for VnptEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ProviderError::invalid_request("cannot embed empty text"));
        }

        let api_req = EmbedApiRequest {
            model: EMBED_MODEL_ID,
            input: text,
            encoding_format: "float",
        };

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .json(&api_req)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::provider_with_context(
                "vnpt-embed",
                format!("HTTP {}: {}", status.as_u16(), body.chars().take(200).collect::<String>()),
                status.as_u16() == 429 || status.is_server_error(),
                ErrorContext::new().with_status(status.as_u16()),
            ));
        }

        let parsed: EmbedApiResponse = response.json().await.map_err(|e| {
            ProviderError::provider("vnpt-embed", format!("invalid JSON body: {e}"), false)
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| {
                ProviderError::provider("vnpt-embed", "no embedding in response", false)
            })
    }
}
