//! OpenAI-compatible chat-completions adapter (Groq, HuggingFace router)

use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{AdvisorError, Result};
use crate::llm::provider::{api_error, ChatStream, LlmProvider};
use crate::llm::sse;
use crate::llm::types::{
    ChatCompletionOptions, ChatCompletionResult, ChatMessage, ProviderId, TokenUsage,
};

pub struct OpenAiCompatibleProvider {
    id: ProviderId,
    client: Client,
    config: ProviderConfig,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    model: Option<String>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompatibleProvider {
    pub fn new(id: ProviderId, config: ProviderConfig, api_key: Option<String>) -> Self {
        Self {
            id,
            client: Client::new(),
            config,
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    fn request(
        &self,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
        stream: bool,
    ) -> Result<RequestBuilder> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AdvisorError::NotConfigured { provider: self.id })?;

        let body = ChatRequest {
            model: options.model.as_deref().unwrap_or(&self.config.model),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            max_tokens: options.max_tokens.or(self.config.max_tokens),
            temperature: options.temperature.or(self.config.temperature),
            top_p: options.top_p,
            stream,
        };

        let url = format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'));
        Ok(self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body))
    }
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatibleProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
    ) -> Result<ChatCompletionResult> {
        let requested = options.model.as_deref().unwrap_or(&self.config.model);
        debug!("{} chat request, model={}", self.id, requested);

        let response = self.request(messages, options, false)?.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }

        let body = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| AdvisorError::MalformedResponse {
                provider: self.id,
                message: e.to_string(),
            })?;
        to_result(self.id, requested, parsed)
    }

    async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
    ) -> Result<ChatStream> {
        let response = self.request(messages, options, true)?.send().await?;
        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(sse::decode(response.bytes_stream(), stream_delta))
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

fn to_result(id: ProviderId, requested: &str, parsed: ChatResponse) -> Result<ChatCompletionResult> {
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AdvisorError::MalformedResponse {
            provider: id,
            message: "no choices in response".to_string(),
        })?;
    let usage = parsed.usage.unwrap_or_default();

    Ok(ChatCompletionResult {
        content: choice.message.content.unwrap_or_default(),
        provider: id,
        model: parsed.model.unwrap_or_else(|| requested.to_string()),
        usage: TokenUsage {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        },
        finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
    })
}

fn stream_delta(data: &str) -> serde_json::Result<Option<String>> {
    let event: StreamEvent = serde_json::from_str(data)?;
    Ok(event.choices.into_iter().next().and_then(|c| c.delta.content))
}
