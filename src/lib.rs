//! Advisor Council - resilient multi-provider LLM orchestration
//!
//! Routes chat calls to Groq, Google and HuggingFace through per-provider
//! circuit breakers and retry with backoff, runs a council of models that
//! answer, critique each other anonymously and synthesize one answer, and
//! cleans every model output before it reaches a user.

pub mod config;
pub mod error;
pub mod llm;
pub mod metrics;
pub mod resilience;
pub mod sanitize;

pub use config::Config;
pub use error::{AdvisorError, Result};
pub use llm::{Council, CouncilContext, LlmProvider, LlmRouter};
pub use metrics::{MetricsCollector, NoopMetrics, TracingMetrics};
pub use resilience::{BreakerRegistry, RetryPolicy};
pub use sanitize::sanitize;
