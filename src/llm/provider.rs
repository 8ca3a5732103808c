//! Provider adapter interface

use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::{AdvisorError, Result};
use crate::llm::gemini::GeminiProvider;
use crate::llm::openai::OpenAiCompatibleProvider;
use crate::llm::types::{ChatCompletionOptions, ChatCompletionResult, ChatMessage, ProviderId, StreamChunk};

/// Finite, non-restartable sequence of completion chunks
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamChunk>> + Send>>;

/// One backing LLM service
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
    ) -> Result<ChatCompletionResult>;

    async fn chat_stream(
        &self,
        _messages: &[ChatMessage],
        _options: &ChatCompletionOptions,
    ) -> Result<ChatStream> {
        Err(AdvisorError::StreamingUnsupported(self.id()))
    }

    /// Credential/config presence only, never a network probe
    fn is_available(&self) -> bool;
}

/// Build the adapter for a provider id
pub fn create_provider(
    id: ProviderId,
    config: ProviderConfig,
    api_key: Option<String>,
) -> Arc<dyn LlmProvider> {
    match id {
        ProviderId::Groq | ProviderId::HuggingFace => {
            Arc::new(OpenAiCompatibleProvider::new(id, config, api_key))
        }
        ProviderId::Google => Arc::new(GeminiProvider::new(config, api_key)),
    }
}

/// Read an error body and turn it into [`AdvisorError::Api`]
pub(crate) async fn api_error(response: reqwest::Response) -> AdvisorError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .or_else(|| v.get("error"))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or(body);
    AdvisorError::Api { status, message }
}
