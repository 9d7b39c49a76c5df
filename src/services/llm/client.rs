//! HTTP client for OpenAI-chat-completions-compatible LLM providers.
//! Tries the primary provider, falls back to the secondary, and in
//! mock mode never makes a network call at all (used in tests and
//! offline development).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::models::AiProvider;
use crate::services::heuristic;

use super::models::{validate, ClassificationResult, LlmError, RawClassification};

const SYSTEM_PROMPT: &str = "You are a customer feedback classifier. Given a piece of \
customer feedback, respond with strict JSON only, no prose, matching exactly this shape: \
{\"sentiment\": \"POSITIVE\"|\"NEGATIVE\"|\"NEUTRAL\", \"topics\": [string, ...], \
\"is_urgent\": boolean}. Topics should be drawn from Billing, Technical, UX, Security, \
General where they apply.";

#[derive(Clone)]
struct Provider {
    api_base: String,
    api_key: String,
    model: String,
    tag: AiProvider,
}

pub struct LlmClient {
    http: Client,
    primary: Option<Provider>,
    secondary: Option<Provider>,
    mock_mode: bool,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build reqwest client");

        let primary = config.primary_api_key.as_ref().map(|key| Provider {
            api_base: config.primary_api_base.clone(),
            api_key: key.clone(),
            model: config.primary_model.clone(),
            tag: AiProvider::PrimaryLlm,
        });

        let secondary = config.secondary_api_key.as_ref().map(|key| Provider {
            api_base: config.secondary_api_base.clone().unwrap_or_default(),
            api_key: key.clone(),
            model: config.secondary_model.clone().unwrap_or_default(),
            tag: AiProvider::SecondaryLlm,
        });

        Self { http, primary, secondary, mock_mode: config.mock_mode }
    }

    /// Classifies `text`, trying the primary provider then the
    /// secondary. In mock mode this runs the heuristic internally and
    /// tags the result as `Mock` provenance, matching the original
    /// system's mock path (which itself just calls the heuristic
    /// after a short simulated delay).
    pub async fn classify(
        &self,
        text: &str,
    ) -> Result<(ClassificationResult, AiProvider), LlmError> {
        if self.mock_mode {
            tokio::time::sleep(Duration::from_millis(300)).await;
            let h = heuristic::analyze(text);
            return Ok((
                ClassificationResult {
                    sentiment: h.sentiment,
                    topics: h.topics,
                    is_urgent: h.is_urgent,
                    confidence_score: 0.95,
                },
                AiProvider::Mock,
            ));
        }

        let Some(provider) = self.primary.as_ref().or(self.secondary.as_ref()) else {
            return Err(LlmError::NoProviderConfigured);
        };

        match self.call_provider(provider, text).await {
            Ok(result) => Ok((result, provider.tag)),
            Err(e) if provider.tag == AiProvider::PrimaryLlm => {
                tracing::warn!(error = %e, "primary LLM provider failed, trying secondary");
                if let Some(secondary) = self.secondary.as_ref() {
                    let result = self.call_provider(secondary, text).await?;
                    Ok((result, secondary.tag))
                } else {
                    Err(e)
                }
            },
            Err(e) => Err(e),
        }
    }

    async fn call_provider(
        &self,
        provider: &Provider,
        text: &str,
    ) -> Result<ClassificationResult, LlmError> {
        let request = ChatCompletionRequest {
            model: provider.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: SYSTEM_PROMPT.to_string() },
                ChatMessage { role: "user".to_string(), content: text.to_string() },
            ],
            temperature: 0.0,
            response_format: ResponseFormat { r#type: "json_object".to_string() },
        };

        let url = format!("{}/chat/completions", provider.api_base.trim_end_matches('/'));

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", provider.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::UpstreamUnavailable(format!("timeout: {e}"))
                } else {
                    LlmError::UpstreamUnavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(LlmError::RateLimited(retry_after));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::UpstreamUnavailable(format!("HTTP {status}: {body}")));
        }

        let completion: ChatCompletionResponse =
            response.json().await.map_err(|e| LlmError::UpstreamBadFormat(e.to_string()))?;

        let content = completion
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .ok_or_else(|| LlmError::UpstreamBadFormat("empty choices".to_string()))?;

        let raw: RawClassification = serde_json::from_str(content)
            .map_err(|e| LlmError::UpstreamBadFormat(format!("{e}: {content}")))?;

        Ok(validate(raw))
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
