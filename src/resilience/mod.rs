//! Failure handling around provider calls: circuit breakers and retries

mod breaker;
mod retry;

pub use breaker::*;
pub use retry::*;
