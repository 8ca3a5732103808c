//! Metrics collector interface
//!
//! The router and breaker registry report through this trait; exporting the
//! numbers is left to whoever embeds the crate.

use tracing::debug;

use crate::resilience::BreakerStatus;

pub trait MetricsCollector: Send + Sync {
    fn record_request(&self, provider: &str, model: &str, status: &str, duration_ms: u64);
    fn record_error(&self, provider: &str, model: &str, error_type: &str);
    fn set_breaker_state(&self, name: &str, state: BreakerStatus);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsCollector for NoopMetrics {
    fn record_request(&self, _provider: &str, _model: &str, _status: &str, _duration_ms: u64) {}
    fn record_error(&self, _provider: &str, _model: &str, _error_type: &str) {}
    fn set_breaker_state(&self, _name: &str, _state: BreakerStatus) {}
}

/// Emits every metric as a `debug` tracing event under the `metrics` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMetrics;

impl MetricsCollector for TracingMetrics {
    fn record_request(&self, provider: &str, model: &str, status: &str, duration_ms: u64) {
        debug!(target: "metrics", provider, model, status, duration_ms, "llm_request");
    }

    fn record_error(&self, provider: &str, model: &str, error_type: &str) {
        debug!(target: "metrics", provider, model, error_type, "llm_error");
    }

    fn set_breaker_state(&self, name: &str, state: BreakerStatus) {
        debug!(target: "metrics", name, state = state.gauge_value(), "circuit_breaker_state");
    }
}
