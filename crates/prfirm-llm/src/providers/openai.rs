use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use prfirm_core::config::ModelConfig;
use prfirm_core::error::{PrFirmError, Result};
use prfirm_core::traits::LlmClient;
use prfirm_core::types::*;

use super::presets::get_preset;

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible client. Works with OpenRouter, OpenAI, Groq, Ollama, etc.
pub struct OpenAiClient {
    http: Client,
    endpoint: String,
    api_key: Option<String>,
    extra_headers: Vec<(String, String)>,
}

impl OpenAiClient {
    /// Build a client from model config, resolving the endpoint and key
    /// through the provider preset when one exists.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let preset = get_preset(&config.provider);

        let endpoint = config
            .base_url
            .clone()
            .or_else(|| preset.as_ref().map(|p| p.default_base_url.to_string()))
            .unwrap_or_else(|| OPENAI_API_URL.to_string());

        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty() && !k.starts_with("${"))
            .or_else(|| {
                preset
                    .as_ref()
                    .and_then(|p| p.api_key_env)
                    .and_then(|var| std::env::var(var).ok())
            });

        if let Some(p) = &preset {
            if p.needs_api_key() && api_key.is_none() {
                return Err(PrFirmError::Config(format!(
                    "no API key for provider '{}': set model.api_key or {}",
                    config.provider,
                    p.api_key_env.unwrap_or("the provider's key variable"),
                )));
            }
        }

        let extra_headers = preset
            .map(|p| {
                p.extra_headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PrFirmError::LlmRequest(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            api_key,
            extra_headers,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

// Request types
#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

// Response types
#[derive(Deserialize, Debug)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's text from a `/chat/completions` body.
pub(crate) fn parse_response(body: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(body).map_err(|e| PrFirmError::LlmParse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| PrFirmError::LlmParse("response contained no choices".into()))
}

impl LlmClient for OpenAiClient {
    fn complete(&self, request: CompletionRequest) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            let body = ChatRequest {
                model: &request.model,
                messages: &request.messages,
                max_tokens: request.max_tokens,
                temperature: if request.temperature > 0.0 {
                    Some(request.temperature)
                } else {
                    None
                },
                stream: false,
            };

            let mut req = self.http.post(&self.endpoint).json(&body);

            if let Some(api_key) = &self.api_key {
                req = req.header("Authorization", format!("Bearer {}", api_key));
            }
            for (k, v) in &self.extra_headers {
                req = req.header(k.as_str(), v.as_str());
            }

            let response = req
                .send()
                .await
                .map_err(|e| PrFirmError::LlmRequest(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "unknown".to_string());
                return Err(PrFirmError::LlmRequest(format!("HTTP {}: {}", status, body)));
            }

            let text = response
                .text()
                .await
                .map_err(|e| PrFirmError::LlmRequest(e.to_string()))?;
            let content = parse_response(&text)?;
            debug!(model = %request.model, chars = content.len(), "LLM call complete");
            Ok(content)
        })
    }
}
