//! Google Generative Language adapter

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{AdvisorError, Result};
use crate::llm::provider::{api_error, ChatStream, LlmProvider};
use crate::llm::sse;
use crate::llm::types::{
    ChatCompletionOptions, ChatCompletionResult, ChatMessage, MessageRole, ProviderId, TokenUsage,
};

pub struct GeminiProvider {
    client: Client,
    config: ProviderConfig,
    api_key: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: UsageMetadata,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct UsageMetadata {
    prompt_token_count: u32,
    candidates_token_count: u32,
    total_token_count: u32,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            config,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    fn request(
        &self,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
        method: &str,
    ) -> Result<RequestBuilder> {
        let api_key = self.api_key.as_deref().ok_or(AdvisorError::NotConfigured {
            provider: ProviderId::Google,
        })?;
        let model = options.model.as_deref().unwrap_or(&self.config.model);
        let url = format!(
            "{}/models/{}:{}",
            self.config.endpoint.trim_end_matches('/'),
            model,
            method
        );

        let body = build_request(
            messages,
            GenerationConfig {
                temperature: options.temperature.or(self.config.temperature),
                max_output_tokens: options.max_tokens.or(self.config.max_tokens),
                top_p: options.top_p,
            },
        );

        Ok(self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body))
    }
}

/// System messages become the system instruction; assistant turns use the
/// `model` role
fn build_request(messages: &[ChatMessage], generation_config: GenerationConfig) -> GenerateRequest {
    let system: Vec<Part> = messages
        .iter()
        .filter(|m| m.role == MessageRole::System)
        .map(|m| Part {
            text: m.content.clone(),
        })
        .collect();

    let contents = messages
        .iter()
        .filter(|m| m.role != MessageRole::System)
        .map(|m| Content {
            role: Some(match m.role {
                MessageRole::Assistant => "model".to_string(),
                _ => "user".to_string(),
            }),
            parts: vec![Part {
                text: m.content.clone(),
            }],
        })
        .collect();

    GenerateRequest {
        contents,
        system_instruction: (!system.is_empty()).then(|| Content {
            role: None,
            parts: system,
        }),
        generation_config,
    }
}

fn candidate_text(candidate: &Candidate) -> String {
    candidate
        .content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect()
}

fn to_result(requested: &str, parsed: GenerateResponse) -> Result<ChatCompletionResult> {
    let candidate = parsed
        .candidates
        .first()
        .ok_or_else(|| AdvisorError::MalformedResponse {
            provider: ProviderId::Google,
            message: "no candidates in response".to_string(),
        })?;
    let usage = &parsed.usage_metadata;

    Ok(ChatCompletionResult {
        content: candidate_text(candidate),
        provider: ProviderId::Google,
        model: parsed
            .model_version
            .clone()
            .unwrap_or_else(|| requested.to_string()),
        usage: TokenUsage {
            prompt_tokens: usage.prompt_token_count,
            completion_tokens: usage.candidates_token_count,
            total_tokens: usage.total_token_count,
        },
        finish_reason: candidate
            .finish_reason
            .as_deref()
            .unwrap_or("STOP")
            .to_lowercase(),
    })
}

fn stream_delta(data: &str) -> serde_json::Result<Option<String>> {
    let event: GenerateResponse = serde_json::from_str(data)?;
    Ok(event.candidates.first().map(candidate_text))
}

#[async_trait::async_trait]
impl LlmProvider for GeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
    ) -> Result<ChatCompletionResult> {
        let requested = options.model.as_deref().unwrap_or(&self.config.model);
        debug!("google chat request, model={}", requested);

        let response = self
            .request(messages, options, "generateContent")?
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body = response.text().await?;
        let parsed: GenerateResponse =
            serde_json::from_str(&body).map_err(|e| AdvisorError::MalformedResponse {
                provider: ProviderId::Google,
                message: e.to_string(),
            })?;
        to_result(requested, parsed)
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
    ) -> Result<ChatStream> {
        let response = self
            .request(messages, options, "streamGenerateContent")?
            .query(&[("alt", "sse")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(sse::decode(response.bytes_stream(), stream_delta))
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}
