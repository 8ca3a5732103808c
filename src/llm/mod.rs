//! LLM provider integrations, routing and council deliberation

mod consensus;
mod council;
mod gemini;
mod openai;
mod provider;
mod router;
mod sse;
mod types;

pub use consensus::{compute_consensus, parse_critique, rank_responses, ParsedCritique, NEUTRAL_SCORE};
pub use council::{truncate_response, Council, CouncilContext};
pub use gemini::GeminiProvider;
pub use openai::OpenAiCompatibleProvider;
pub use provider::{create_provider, ChatStream, LlmProvider};
pub use router::{LlmRouter, PhaseConfig};
pub use types::*;
