//! Error types for the advisor council

use thiserror::Error;

use crate::llm::ProviderId;

/// Substrings that mark an error as a transient provider failure
pub const TRANSIENT_ERROR_PATTERNS: &[&str] = &[
    "timeout",
    "econnreset",
    "econnrefused",
    "connection reset",
    "connection refused",
    "socket hang up",
    "network",
    "rate limit",
    "429",
    "503",
    "502",
    "504",
    "temporarily unavailable",
    "service unavailable",
];

#[derive(Error, Debug)]
pub enum AdvisorError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Provider {provider} is not configured (missing API key)")]
    NotConfigured { provider: ProviderId },

    #[error("No adapter registered for provider {0}")]
    UnknownProvider(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout after {elapsed_ms}ms ({name})")]
    Timeout { name: String, elapsed_ms: u64 },

    #[error("Circuit breaker '{0}' is open")]
    BreakerOpen(String),

    #[error("Malformed response from {provider}: {message}")]
    MalformedResponse { provider: ProviderId, message: String },

    #[error("Streaming is not supported by {0}")]
    StreamingUnsupported(ProviderId),

    #[error("Insufficient council models: {available} available, at least 2 required")]
    InsufficientModels { available: usize },

    #[error("Insufficient council responses: {received} received, at least 2 required")]
    InsufficientResponses { received: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AdvisorError>;

impl From<reqwest::Error> for AdvisorError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => AdvisorError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None if err.is_timeout() => AdvisorError::Network(format!("timeout: {}", err)),
            None => AdvisorError::Network(err.to_string()),
        }
    }
}

impl AdvisorError {
    /// Stable label used when reporting errors to a metrics collector
    pub fn kind(&self) -> &'static str {
        match self {
            AdvisorError::Config(_) => "config",
            AdvisorError::NotConfigured { .. } => "not_configured",
            AdvisorError::UnknownProvider(_) => "unknown_provider",
            AdvisorError::Api { status: 429, .. } => "rate_limit",
            AdvisorError::Api { .. } => "api",
            AdvisorError::Network(_) => "network",
            AdvisorError::Timeout { .. } => "timeout",
            AdvisorError::BreakerOpen(_) => "breaker_open",
            AdvisorError::MalformedResponse { .. } => "malformed_response",
            AdvisorError::StreamingUnsupported(_) => "streaming_unsupported",
            AdvisorError::InsufficientModels { .. } => "insufficient_models",
            AdvisorError::InsufficientResponses { .. } => "insufficient_responses",
            AdvisorError::Cancelled => "cancelled",
            AdvisorError::Io(_) => "io",
            AdvisorError::Json(_) => "json",
        }
    }

    /// Default retry classification.
    ///
    /// Breaker, configuration and cancellation errors are never retried.
    /// Everything else is matched against [`TRANSIENT_ERROR_PATTERNS`].
    pub fn is_transient(&self) -> bool {
        match self {
            AdvisorError::BreakerOpen(_)
            | AdvisorError::NotConfigured { .. }
            | AdvisorError::UnknownProvider(_)
            | AdvisorError::Config(_)
            | AdvisorError::Cancelled
            | AdvisorError::InsufficientModels { .. }
            | AdvisorError::InsufficientResponses { .. } => false,
            other => matches_any(&other.to_string(), TRANSIENT_ERROR_PATTERNS),
        }
    }
}

/// Case-insensitive substring match against a list of patterns
pub(crate) fn matches_any<S: AsRef<str>>(message: &str, patterns: &[S]) -> bool {
    let message = message.to_lowercase();
    patterns
        .iter()
        .any(|pattern| message.contains(&pattern.as_ref().to_lowercase()))
}
