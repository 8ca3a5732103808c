//! Shared LLM data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AdvisorError;

/// Backing LLM services known to the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Groq,
    Google,
    HuggingFace,
}

impl ProviderId {
    pub const ALL: [ProviderId; 3] = [ProviderId::Groq, ProviderId::Google, ProviderId::HuggingFace];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Groq => "groq",
            ProviderId::Google => "google",
            ProviderId::HuggingFace => "huggingface",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "groq" => Ok(ProviderId::Groq),
            "google" | "gemini" => Ok(ProviderId::Google),
            "huggingface" | "hf" => Ok(ProviderId::HuggingFace),
            other => Err(AdvisorError::UnknownProvider(other.to_string())),
        }
    }
}

/// Logical stage of the advisory pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Draft,
    Critique,
    Final,
}

impl FromStr for Phase {
    type Err = AdvisorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(Phase::Draft),
            "critique" => Ok(Phase::Critique),
            "final" => Ok(Phase::Final),
            other => Err(AdvisorError::Config(format!("Unknown phase: {}", other))),
        }
    }
}

/// Whether a model takes part in critique or only processes documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelRole {
    #[default]
    Council,
    RagSpecialist,
}

/// Catalog entry for one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: ProviderId,
    pub model: String,
    /// Human-readable name for logging
    pub name: String,
    #[serde(default)]
    pub role: ModelRole,
}

impl ModelConfig {
    pub fn new(provider: ProviderId, model: &str, name: &str, role: ModelRole) -> Self {
        Self {
            provider,
            model: model.to_string(),
            name: name.to_string(),
            role,
        }
    }

    pub fn council(provider: ProviderId, model: &str, name: &str) -> Self {
        Self::new(provider, model, name, ModelRole::Council)
    }
}

/// Council-eligible models from a catalog
pub fn council_models(catalog: &[ModelConfig]) -> Vec<ModelConfig> {
    catalog
        .iter()
        .filter(|m| m.role == ModelRole::Council)
        .cloned()
        .collect()
}

/// The document-processing specialist, if one is configured
pub fn rag_specialist(catalog: &[ModelConfig]) -> Option<&ModelConfig> {
    catalog.iter().find(|m| m.role == ModelRole::RagSpecialist)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Per-call overrides; providers fill in anything left unset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletionOptions {
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
}

impl ChatCompletionOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatCompletionResult {
    pub content: String,
    pub provider: ProviderId,
    pub model: String,
    pub usage: TokenUsage,
    pub finish_reason: String,
}

/// One piece of a streamed completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    pub content: String,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CouncilResponse {
    /// Anonymous id; never derived from provider or model
    pub id: String,
    pub content: String,
    pub provider: ProviderId,
    pub model: String,
    pub tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilCritique {
    pub response_id: String,
    pub critic_id: String,
    /// 1-10
    pub score: f64,
    pub feedback: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseScore {
    pub response_id: String,
    pub average_score: f64,
    pub critique_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consensus {
    /// Mean over every critique score in the run
    pub average_score: f64,
    pub best_response_id: String,
    pub synthesized: bool,
    pub scores: Vec<ResponseScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilMetadata {
    pub total_tokens: u32,
    pub models_used: Vec<String>,
    pub processing_time_ms: u64,
    /// Set when cancellation cut the run short
    pub partial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouncilResult {
    pub responses: Vec<CouncilResponse>,
    pub critiques: Vec<CouncilCritique>,
    pub final_response: String,
    pub consensus: Consensus,
    pub metadata: CouncilMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Deprecated,
    Error,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelHealthCheck {
    pub model: String,
    pub provider: ProviderId,
    pub name: String,
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_id_round_trip_names() {
        for id in ProviderId::ALL {
            assert_eq!(id.as_str().parse::<ProviderId>().unwrap(), id);
        }
        assert_eq!("gemini".parse::<ProviderId>().unwrap(), ProviderId::Google);
        assert!("openai".parse::<ProviderId>().is_err());
    }

    #[test]
    fn test_model_role_defaults_to_council() {
        let model: ModelConfig =
            toml::from_str("provider = \"groq\"\nmodel = \"m\"\nname = \"M\"").unwrap();
        assert_eq!(model.role, ModelRole::Council);
    }

    #[test]
    fn test_council_models_excludes_rag_specialist() {
        let catalog = vec![
            ModelConfig::council(ProviderId::Groq, "a", "A"),
            ModelConfig::new(ProviderId::HuggingFace, "clara", "CLaRA", ModelRole::RagSpecialist),
            ModelConfig::council(ProviderId::Google, "b", "B"),
        ];

        let council = council_models(&catalog);
        assert_eq!(council.len(), 2);
        assert!(council.iter().all(|m| m.role == ModelRole::Council));
        assert_eq!(rag_specialist(&catalog).unwrap().model, "clara");
    }

    #[test]
    fn test_phase_parse() {
        assert_eq!("Draft".parse::<Phase>().unwrap(), Phase::Draft);
        assert_eq!("final".parse::<Phase>().unwrap(), Phase::Final);
        assert!("review".parse::<Phase>().is_err());
    }

    #[test]
    fn test_role_serializes_kebab_case() {
        let json = serde_json::to_string(&ModelRole::RagSpecialist).unwrap();
        assert_eq!(json, "\"rag-specialist\"");
    }
}
