//! Configuration management for the advisor council

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::{AdvisorError, Result};
use crate::llm::{ModelConfig, ModelRole, PhaseConfig, ProviderId};
use crate::resilience::{BreakerOptions, RetryPolicy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider settings keyed by provider id
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Phase to provider table
    #[serde(default)]
    pub router: PhaseConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub council: CouncilConfig,

    /// Model catalog
    #[serde(default = "default_catalog")]
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API base URL
    pub endpoint: String,

    /// API key (can be env var reference like $GROQ_API_KEY)
    #[serde(default)]
    pub api_key: String,

    /// Model used when a call does not name one
    pub model: String,

    #[serde(default = "enabled_by_default")]
    pub enabled: bool,

    pub max_tokens: Option<u32>,

    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    pub timeout_ms: u64,
    pub error_threshold_percentage: f64,
    pub reset_timeout_ms: u64,
    pub volume_threshold: usize,
    pub window_size: usize,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        let options = BreakerOptions::default();
        Self {
            timeout_ms: options.timeout.as_millis() as u64,
            error_threshold_percentage: options.error_threshold_percentage,
            reset_timeout_ms: options.reset_timeout.as_millis() as u64,
            volume_threshold: options.volume_threshold,
            window_size: options.window_size,
        }
    }
}

impl BreakerConfig {
    pub fn options(&self) -> BreakerOptions {
        BreakerOptions {
            timeout: Duration::from_millis(self.timeout_ms),
            error_threshold_percentage: self.error_threshold_percentage,
            reset_timeout: Duration::from_millis(self.reset_timeout_ms),
            volume_threshold: self.volume_threshold,
            window_size: self.window_size,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CouncilConfig {
    /// Ranked responses handed to the synthesis call
    pub synthesis_top_n: usize,

    /// Responses are cut to this many characters inside critique and
    /// synthesis prompts
    pub max_response_chars: usize,

    pub temperature: Option<f32>,

    pub max_tokens: Option<u32>,
}

impl Default for CouncilConfig {
    fn default() -> Self {
        Self {
            synthesis_top_n: 3,
            max_response_chars: 4000,
            temperature: Some(0.7),
            max_tokens: Some(2048),
        }
    }
}

fn enabled_by_default() -> bool {
    true
}

/// Production catalog: six council models and the RAG specialist
pub fn default_catalog() -> Vec<ModelConfig> {
    vec![
        ModelConfig::council(ProviderId::Groq, "llama-3.3-70b-versatile", "Llama 3.3 70B Versatile"),
        ModelConfig::council(ProviderId::Groq, "kimi-k2-instruct-0905", "Kimi K2 Instruct"),
        ModelConfig::council(ProviderId::Google, "gemini-2.5-flash", "Gemini 2.5 Flash"),
        ModelConfig::council(
            ProviderId::HuggingFace,
            "deepseek-ai/DeepSeek-R1-Distill-Qwen-32B",
            "DeepSeek R1 32B",
        ),
        ModelConfig::council(
            ProviderId::HuggingFace,
            "microsoft/Phi-3-mini-4k-instruct",
            "Phi-3 Mini 4K",
        ),
        ModelConfig::council(
            ProviderId::HuggingFace,
            "Qwen/Qwen2.5-14B-Instruct-1M",
            "Qwen 2.5 14B 1M",
        ),
        ModelConfig::new(
            ProviderId::HuggingFace,
            "apple/CLaRa-7B-Instruct",
            "CLaRA 7B RAG Specialist",
            ModelRole::RagSpecialist,
        ),
    ]
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = BTreeMap::new();

        providers.insert(
            ProviderId::Groq.to_string(),
            ProviderConfig {
                endpoint: "https://api.groq.com/openai/v1".to_string(),
                api_key: "$GROQ_API_KEY".to_string(),
                model: "llama-3.3-70b-versatile".to_string(),
                enabled: true,
                max_tokens: Some(2048),
                temperature: Some(0.7),
            },
        );

        providers.insert(
            ProviderId::Google.to_string(),
            ProviderConfig {
                endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
                api_key: "$GOOGLE_AI_API_KEY".to_string(),
                model: "gemini-2.5-flash".to_string(),
                enabled: true,
                max_tokens: Some(2048),
                temperature: Some(0.7),
            },
        );

        providers.insert(
            ProviderId::HuggingFace.to_string(),
            ProviderConfig {
                endpoint: "https://router.huggingface.co/v1".to_string(),
                api_key: "$HUGGINGFACE_API_KEY".to_string(),
                model: "Qwen/Qwen2.5-14B-Instruct-1M".to_string(),
                enabled: true,
                max_tokens: Some(2048),
                temperature: Some(0.7),
            },
        );

        Self {
            providers,
            router: PhaseConfig::default(),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            council: CouncilConfig::default(),
            models: default_catalog(),
        }
    }
}

impl Config {
    /// Load config from file or create default
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content)
                .map_err(|e| AdvisorError::Config(format!("{}: {}", config_path.display(), e)))?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(&config_path)?;
            info!("Wrote default config to {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| AdvisorError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("advisor-council")
            .join("config.toml")
    }

    pub fn provider(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    /// Resolve API key from config (handles env var references)
    pub fn resolve_api_key(&self, id: ProviderId) -> Option<String> {
        self.provider(id).and_then(|p| {
            if let Some(var) = p.api_key.strip_prefix('$') {
                std::env::var(var).ok().filter(|v| !v.is_empty())
            } else if p.api_key.is_empty() {
                None
            } else {
                Some(p.api_key.clone())
            }
        })
    }

    /// Check the catalog and numeric settings
    pub fn validate(&self) -> Result<()> {
        for name in self.providers.keys() {
            name.parse::<ProviderId>()
                .map_err(|_| AdvisorError::Config(format!("Unknown provider section: {}", name)))?;
        }

        let enabled_council = self
            .models
            .iter()
            .filter(|m| m.role == ModelRole::Council)
            .filter(|m| self.provider(m.provider).map_or(false, |p| p.enabled))
            .count();
        if enabled_council == 0 {
            return Err(AdvisorError::Config(
                "At least one council model must belong to an enabled provider".to_string(),
            ));
        }

        let breaker = &self.breaker;
        if !(0.0..=100.0).contains(&breaker.error_threshold_percentage) {
            return Err(AdvisorError::Config(format!(
                "breaker.error_threshold_percentage must be within 0-100, got {}",
                breaker.error_threshold_percentage
            )));
        }
        if breaker.timeout_ms == 0 || breaker.window_size == 0 {
            return Err(AdvisorError::Config(
                "breaker.timeout_ms and breaker.window_size must be positive".to_string(),
            ));
        }
        if breaker.volume_threshold > breaker.window_size {
            return Err(AdvisorError::Config(
                "breaker.volume_threshold cannot exceed breaker.window_size".to_string(),
            ));
        }

        let retry = &self.retry;
        if retry.max_attempts == 0 {
            return Err(AdvisorError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if retry.backoff_multiplier < 1.0 {
            return Err(AdvisorError::Config(
                "retry.backoff_multiplier must be at least 1.0".to_string(),
            ));
        }
        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err(AdvisorError::Config(
                "retry.initial_delay_ms cannot exceed retry.max_delay_ms".to_string(),
            ));
        }

        if self.council.synthesis_top_n == 0 || self.council.max_response_chars == 0 {
            return Err(AdvisorError::Config(
                "council.synthesis_top_n and council.max_response_chars must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
