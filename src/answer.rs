//! Answer generation via the Anthropic Messages API.
//!
//! The assembled payload is sent as a single user message. The reply text
//! is the concatenation of the response's `text` content blocks; token
//! counts come from `usage` and feed the cost estimates in
//! [`docqa_core::pricing`]. Estimates are reported only.
//!
//! Every failure is returned as an [`AnswerError`] so the caller can still
//! show retrieval results.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AnswerConfig;
use docqa_core::pricing::{
    estimate_all, format_usage_report, CostEstimate, PricingTier, TokenUsage,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("{0} not found in environment variables")]
    MissingCredential(String),

    #[error("request to answer service failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("answer service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed answer service response: {0}")]
    MalformedResponse(String),
}

/// A generated answer with its token accounting.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub usage: TokenUsage,
    pub estimates: Vec<CostEstimate>,
}

impl Answer {
    pub fn usage_report(&self) -> String {
        format_usage_report(&self.usage, &self.estimates)
    }
}

/// Turns an assembled payload into an answer.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn generate(&self, payload: &str) -> Result<Answer, AnswerError>;
}

pub struct AnthropicClient {
    client: reqwest::Client,
    api_url: String,
    model: String,
    max_tokens: u32,
    api_key_env: String,
    api_key: Option<String>,
    pricing: Vec<PricingTier>,
}

impl AnthropicClient {
    /// Build a client, reading the API key from `answer.api_key_env`.
    ///
    /// A missing key is not an error here; [`generate`](AnswerService::generate)
    /// reports it when an answer is actually requested.
    pub fn from_config(config: &AnswerConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key_env: config.api_key_env.clone(),
            api_key,
            pricing: config.pricing.clone(),
        })
    }

    /// Replace the key picked up from the environment.
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    fn request_body(&self, payload: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                {"role": "user", "content": payload}
            ]
        })
    }
}

#[async_trait]
impl AnswerService for AnthropicClient {
    async fn generate(&self, payload: &str) -> Result<Answer, AnswerError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AnswerError::MissingCredential(self.api_key_env.clone()))?;

        info!(model = %self.model, "requesting answer");
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&self.request_body(payload))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnswerError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        let (text, usage) = parse_response(&json)?;
        debug!(
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "answer received"
        );

        Ok(Answer {
            text,
            usage,
            estimates: estimate_all(&usage, &self.pricing),
        })
    }
}

/// Extract the answer text and token usage from a Messages API response.
pub fn parse_response(json: &serde_json::Value) -> Result<(String, TokenUsage), AnswerError> {
    let content = json
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| AnswerError::MalformedResponse("missing content array".to_string()))?;

    let text: String = content
        .iter()
        .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect();

    let usage = json
        .get("usage")
        .ok_or_else(|| AnswerError::MalformedResponse("missing usage".to_string()))?;
    let count = |field: &str| {
        usage
            .get(field)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| AnswerError::MalformedResponse(format!("missing usage.{}", field)))
    };

    Ok((
        text,
        TokenUsage {
            input_tokens: count("input_tokens")?,
            output_tokens: count("output_tokens")?,
        },
    ))
}
