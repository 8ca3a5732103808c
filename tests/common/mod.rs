//! In-process mock providers shared by the integration tests

#![allow(dead_code)]

use advisor_council::llm::{
    ChatCompletionOptions, ChatCompletionResult, ChatMessage, LlmProvider, MessageRole, PhaseConfig,
    ProviderId, TokenUsage,
};
use advisor_council::metrics::MetricsCollector;
use advisor_council::resilience::{BreakerOptions, BreakerRegistry, BreakerStatus, RetryPolicy};
use advisor_council::{AdvisorError, LlmRouter, NoopMetrics, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub type Responder = Arc<dyn Fn(&[ChatMessage]) -> Result<String> + Send + Sync>;

pub struct MockProvider {
    id: ProviderId,
    available: bool,
    delay: Option<Duration>,
    responder: Responder,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(id: ProviderId, responder: Responder) -> Self {
        Self {
            id,
            available: true,
            delay: None,
            responder,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Gives `answer` to questions, scores critiques by the "quality N"
    /// marker in the reviewed answer, and merges on synthesis requests
    pub fn advisor(id: ProviderId, answer: &str) -> Self {
        let answer = answer.to_string();
        Self::new(
            id,
            Arc::new(move |messages: &[ChatMessage]| {
                let user = last_user(messages);
                if is_critique(messages) {
                    Ok(format!("{{\"score\": {}, \"feedback\": \"fine\"}}", quality(&user)))
                } else if user.contains("synthesizing answers") {
                    Ok("Combined plan from the council.".to_string())
                } else {
                    Ok(answer.clone())
                }
            }),
        )
    }

    pub fn failing(id: ProviderId, status: u16) -> Self {
        Self::new(
            id,
            Arc::new(move |_: &[ChatMessage]| {
                Err(AdvisorError::Api {
                    status,
                    message: "boom".to_string(),
                })
            }),
        )
    }

    pub fn unavailable(id: ProviderId) -> Self {
        let mut provider = Self::advisor(id, "never used");
        provider.available = false;
        provider
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every message body this provider was sent
    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LlmProvider for MockProvider {
    fn id(&self) -> ProviderId {
        self.id
    }

    async fn chat(
        &self,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
    ) -> Result<ChatCompletionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .unwrap()
            .extend(messages.iter().map(|m| m.content.clone()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let content = (self.responder)(messages)?;
        Ok(ChatCompletionResult {
            content,
            provider: self.id,
            model: options.model.clone().unwrap_or_else(|| "mock-model".to_string()),
            usage: TokenUsage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
            finish_reason: "stop".to_string(),
        })
    }

    fn is_available(&self) -> bool {
        self.available
    }
}

pub fn is_critique(messages: &[ChatMessage]) -> bool {
    messages
        .iter()
        .any(|m| m.role == MessageRole::System && m.content.contains("JSON only"))
}

pub fn last_user(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

/// The N in a "quality N" marker, or 5
pub fn quality(text: &str) -> u32 {
    text.split("quality ")
        .nth(1)
        .and_then(|rest| rest.split(|c: char| !c.is_ascii_digit()).next())
        .and_then(|n| n.parse().ok())
        .unwrap_or(5)
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5), 2.0)
}

pub fn router_with(providers: Vec<Arc<MockProvider>>) -> LlmRouter {
    router_with_metrics(providers, Arc::new(NoopMetrics), BreakerOptions::default())
}

pub fn router_with_metrics(
    providers: Vec<Arc<MockProvider>>,
    metrics: Arc<dyn MetricsCollector>,
    breaker: BreakerOptions,
) -> LlmRouter {
    let mut router = LlmRouter::new(
        PhaseConfig::default(),
        Arc::new(BreakerRegistry::new(breaker)),
        fast_retry(),
        metrics,
    );
    for provider in providers {
        router.register(provider);
    }
    router
}

/// Keeps every metric call for inspection
#[derive(Default)]
pub struct RecordingMetrics {
    pub requests: Mutex<Vec<(String, String, String)>>,
    pub errors: Mutex<Vec<(String, String, String)>>,
    pub states: Mutex<Vec<(String, BreakerStatus)>>,
}

impl MetricsCollector for RecordingMetrics {
    fn record_request(&self, provider: &str, model: &str, status: &str, _duration_ms: u64) {
        self.requests
            .lock()
            .unwrap()
            .push((provider.to_string(), model.to_string(), status.to_string()));
    }

    fn record_error(&self, provider: &str, model: &str, error_type: &str) {
        self.errors
            .lock()
            .unwrap()
            .push((provider.to_string(), model.to_string(), error_type.to_string()));
    }

    fn set_breaker_state(&self, name: &str, state: BreakerStatus) {
        self.states.lock().unwrap().push((name.to_string(), state));
    }
}
