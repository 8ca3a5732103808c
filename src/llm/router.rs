//! Phase-based routing of chat calls through breaker and retry

use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{AdvisorError, Result};
use crate::llm::provider::{create_provider, ChatStream, LlmProvider};
use crate::llm::types::{
    ChatCompletionOptions, ChatCompletionResult, ChatMessage, HealthStatus, ModelConfig,
    ModelHealthCheck, Phase, ProviderId,
};
use crate::metrics::MetricsCollector;
use crate::resilience::{BreakerEvent, BreakerRegistry, RetryPolicy};

const HEALTH_PROBE: &str = "Reply with the single word OK.";
const DEPRECATION_MARKERS: &[&str] = &["decommissioned", "deprecated"];

/// Which provider serves each phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub draft: ProviderId,
    pub critique: ProviderId,
    #[serde(rename = "final")]
    pub final_phase: ProviderId,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            draft: ProviderId::Groq,
            critique: ProviderId::Google,
            final_phase: ProviderId::HuggingFace,
        }
    }
}

impl PhaseConfig {
    pub fn provider_for(&self, phase: Phase) -> ProviderId {
        match phase {
            Phase::Draft => self.draft,
            Phase::Critique => self.critique,
            Phase::Final => self.final_phase,
        }
    }
}

/// Routes chat calls to provider adapters.
///
/// Every call runs as `retry(breaker(adapter.chat))`, with the breaker named
/// after the provider id, so each retried attempt is counted by the breaker
/// and an open breaker fails the call without further attempts.
pub struct LlmRouter {
    providers: HashMap<ProviderId, Arc<dyn LlmProvider>>,
    phases: PhaseConfig,
    breakers: Arc<BreakerRegistry>,
    retry: RetryPolicy,
    metrics: Arc<dyn MetricsCollector>,
}

impl LlmRouter {
    /// Build a router with no adapters. Breaker state changes in `breakers`
    /// are forwarded to `metrics` from here on.
    pub fn new(
        phases: PhaseConfig,
        breakers: Arc<BreakerRegistry>,
        retry: RetryPolicy,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        let sink = Arc::clone(&metrics);
        breakers.subscribe(Arc::new(move |event: &BreakerEvent| {
            if let Some(status) = event.kind.status() {
                sink.set_breaker_state(&event.name, status);
            }
        }));

        Self {
            providers: HashMap::new(),
            phases,
            breakers,
            retry,
            metrics,
        }
    }

    /// Build a router with an adapter for every enabled provider in `config`
    pub fn from_config(config: &Config, metrics: Arc<dyn MetricsCollector>) -> Self {
        let breakers = Arc::new(BreakerRegistry::new(config.breaker.options()));
        let mut router = Self::new(config.router, breakers, config.retry.policy(), metrics);

        for id in ProviderId::ALL {
            let Some(provider_config) = config.provider(id) else {
                continue;
            };
            if !provider_config.enabled {
                debug!("Provider {} disabled in config", id);
                continue;
            }
            let api_key = config.resolve_api_key(id);
            if api_key.is_none() {
                warn!("Provider {} has no API key; it will be reported unavailable", id);
            }
            router.register(create_provider(id, provider_config.clone(), api_key));
        }

        router
    }

    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.id(), provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn phases(&self) -> &PhaseConfig {
        &self.phases
    }

    pub fn breakers(&self) -> &Arc<BreakerRegistry> {
        &self.breakers
    }

    /// Registered and credentialed
    pub fn is_available(&self, provider: ProviderId) -> bool {
        self.providers
            .get(&provider)
            .map_or(false, |adapter| adapter.is_available())
    }

    fn resolve(&self, provider: ProviderId) -> Result<Arc<dyn LlmProvider>> {
        let adapter = self
            .providers
            .get(&provider)
            .ok_or_else(|| AdvisorError::UnknownProvider(provider.to_string()))?;
        if !adapter.is_available() {
            return Err(AdvisorError::NotConfigured { provider });
        }
        Ok(Arc::clone(adapter))
    }

    pub async fn chat_for_phase(
        &self,
        phase: Phase,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
    ) -> Result<ChatCompletionResult> {
        let provider = self.phases.provider_for(phase);
        debug!("Routing {:?} phase to {}", phase, provider);
        self.chat(provider, None, messages, options).await
    }

    /// Call a specific provider; `model` overrides `options.model`
    pub async fn chat(
        &self,
        provider: ProviderId,
        model: Option<&str>,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
    ) -> Result<ChatCompletionResult> {
        let mut options = options.clone();
        if let Some(model) = model {
            options.model = Some(model.to_string());
        }
        let model_label = options.model.clone().unwrap_or_else(|| "default".to_string());

        let adapter = match self.resolve(provider) {
            Ok(adapter) => adapter,
            Err(err) => {
                self.metrics
                    .record_error(provider.as_str(), &model_label, err.kind());
                return Err(err);
            }
        };

        debug!("Calling {} model={}", provider, model_label);
        let started = Instant::now();
        let adapter = &adapter;
        let options = &options;
        let breakers = &self.breakers;
        let outcome = self
            .retry
            .execute(move || {
                breakers.run(provider.as_str(), move || adapter.chat(messages, options))
            })
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(result) => {
                self.metrics
                    .record_request(provider.as_str(), &result.model, "success", elapsed_ms);
            }
            Err(err) => {
                self.metrics
                    .record_request(provider.as_str(), &model_label, "error", elapsed_ms);
                self.metrics
                    .record_error(provider.as_str(), &model_label, err.kind());
            }
        }
        outcome
    }

    /// [`chat`](Self::chat) that gives up with [`AdvisorError::Cancelled`]
    /// as soon as `token` fires, including before the call starts
    pub async fn chat_with_cancel(
        &self,
        provider: ProviderId,
        model: Option<&str>,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
        token: &CancellationToken,
    ) -> Result<ChatCompletionResult> {
        if token.is_cancelled() {
            return Err(AdvisorError::Cancelled);
        }
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(AdvisorError::Cancelled),
            result = self.chat(provider, model, messages, options) => result,
        }
    }

    /// Open a streamed completion. Breaker and retry guard establishing the
    /// stream, not the chunks that follow.
    pub async fn chat_stream(
        &self,
        provider: ProviderId,
        model: Option<&str>,
        messages: &[ChatMessage],
        options: &ChatCompletionOptions,
    ) -> Result<ChatStream> {
        let adapter = self.resolve(provider)?;
        let mut options = options.clone();
        if let Some(model) = model {
            options.model = Some(model.to_string());
        }

        let adapter = &adapter;
        let options = &options;
        let breakers = &self.breakers;
        self.retry
            .execute(move || {
                breakers.run(provider.as_str(), move || {
                    adapter.chat_stream(messages, options)
                })
            })
            .await
    }

    /// Ping one model directly, bypassing breaker and retry
    pub async fn health_check(&self, model: &ModelConfig) -> ModelHealthCheck {
        let mut check = ModelHealthCheck {
            model: model.model.clone(),
            provider: model.provider,
            name: model.name.clone(),
            status: HealthStatus::Unavailable,
            latency_ms: 0,
            error: None,
            checked_at: Utc::now(),
        };

        let adapter = match self.resolve(model.provider) {
            Ok(adapter) => adapter,
            Err(err) => {
                check.error = Some(err.to_string());
                return check;
            }
        };

        let options = ChatCompletionOptions {
            model: Some(model.model.clone()),
            max_tokens: Some(5),
            temperature: Some(0.0),
            ..ChatCompletionOptions::default()
        };
        let messages = [ChatMessage::user(HEALTH_PROBE)];
        let timeout = self.breakers.defaults().timeout;

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, adapter.chat(&messages, &options)).await;
        check.latency_ms = started.elapsed().as_millis() as u64;
        check.checked_at = Utc::now();

        match outcome {
            Ok(Ok(_)) => check.status = HealthStatus::Healthy,
            Ok(Err(err)) => {
                check.status = if is_deprecation(&err) {
                    HealthStatus::Deprecated
                } else {
                    HealthStatus::Error
                };
                check.error = Some(err.to_string());
            }
            Err(_) => {
                check.status = HealthStatus::Error;
                check.error = Some(
                    AdvisorError::Timeout {
                        name: model.name.clone(),
                        elapsed_ms: timeout.as_millis() as u64,
                    }
                    .to_string(),
                );
            }
        }

        if check.status != HealthStatus::Healthy {
            warn!(
                "Model {} ({}) is {:?}: {}",
                model.name,
                model.provider,
                check.status,
                check.error.as_deref().unwrap_or("")
            );
        }
        check
    }

    pub async fn health_check_all(&self, models: &[ModelConfig]) -> Vec<ModelHealthCheck> {
        let checks = join_all(models.iter().map(|model| self.health_check(model))).await;
        let healthy = checks
            .iter()
            .filter(|c| c.status == HealthStatus::Healthy)
            .count();
        info!("Health check: {}/{} models healthy", healthy, checks.len());
        checks
    }

    /// The subset of `models` that answered the health probe
    pub async fn healthy_models(&self, models: &[ModelConfig]) -> Vec<ModelConfig> {
        let checks = self.health_check_all(models).await;
        models
            .iter()
            .zip(checks)
            .filter(|(_, check)| check.status == HealthStatus::Healthy)
            .map(|(model, _)| model.clone())
            .collect()
    }
}

fn is_deprecation(err: &AdvisorError) -> bool {
    match err {
        AdvisorError::Api { status: 404, .. } => true,
        other => crate::error::matches_any(&other.to_string(), DEPRECATION_MARKERS),
    }
}
