use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PrFirmError, Result};
use crate::platform::PlatformSpec;

/// Top-level PR Firm configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub resilience: ResilienceConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Platform definitions that replace or extend the built-in registry.
    #[serde(default)]
    pub platforms: Vec<PlatformSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_id: default_model_id(),
            api_key: None,
            base_url: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String { "openrouter".to_string() }
fn default_model_id() -> String { "anthropic/claude-3.5-sonnet".to_string() }
fn default_max_tokens() -> u32 { 4096 }
fn default_temperature() -> f32 { 0.7 }
fn default_timeout_secs() -> u64 { 30 }

/// Guards around every outbound generation call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResilienceConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Fixed-window rate limit: at most `max_calls` per `period_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_calls")]
    pub max_calls: u32,
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
}

impl RateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            period_secs: default_period_secs(),
        }
    }
}

fn default_max_calls() -> u32 { 30 }
fn default_period_secs() -> u64 { 60 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// How long the breaker stays open before allowing a half-open trial.
    #[serde(default = "default_open_duration_secs")]
    pub open_duration_secs: u64,
}

impl CircuitBreakerConfig {
    pub fn open_duration(&self) -> Duration {
        Duration::from_secs(self.open_duration_secs)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_duration_secs: default_open_duration_secs(),
        }
    }
}

fn default_failure_threshold() -> u32 { 5 }
fn default_open_duration_secs() -> u64 { 60 }

/// Pipeline tuning: revision bound, batch fan-out, node retry policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Violating compliance evaluations allowed before escalating.
    #[serde(default = "default_revision_threshold")]
    pub revision_threshold: u32,
    /// Platform sub-flows run concurrently by the guidelines batch (1 = sequential).
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    /// Retries for the drafting and editing stages.
    #[serde(default = "default_generation_max_retries")]
    pub generation_max_retries: u32,
    #[serde(default = "default_generation_wait_secs")]
    pub generation_wait_secs: u64,
    /// Retries for the validation stages and the director.
    #[serde(default = "default_validation_max_retries")]
    pub validation_max_retries: u32,
    #[serde(default = "default_validation_wait_secs")]
    pub validation_wait_secs: u64,
    /// Rewrite passes the style editor makes per platform.
    #[serde(default = "default_editor_passes")]
    pub editor_passes: u32,
}

impl PipelineConfig {
    pub fn generation_wait(&self) -> Duration {
        Duration::from_secs(self.generation_wait_secs)
    }

    pub fn validation_wait(&self) -> Duration {
        Duration::from_secs(self.validation_wait_secs)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            revision_threshold: default_revision_threshold(),
            batch_concurrency: default_batch_concurrency(),
            generation_max_retries: default_generation_max_retries(),
            generation_wait_secs: default_generation_wait_secs(),
            validation_max_retries: default_validation_max_retries(),
            validation_wait_secs: default_validation_wait_secs(),
            editor_passes: default_editor_passes(),
        }
    }
}

fn default_revision_threshold() -> u32 { 5 }
fn default_batch_concurrency() -> usize { 4 }
fn default_generation_max_retries() -> u32 { 2 }
fn default_generation_wait_secs() -> u64 { 5 }
fn default_validation_max_retries() -> u32 { 1 }
fn default_validation_wait_secs() -> u64 { 2 }
fn default_editor_passes() -> u32 { 2 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| PrFirmError::ConfigNotFound(path.display().to_string()))?;
        Self::parse(&content)
    }

    /// Parse config text, expanding `${ENV_VAR}` references first.
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        let config: AppConfig =
            toml::from_str(&expanded).map_err(|e| PrFirmError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to built-in defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let rl = &self.resilience.rate_limit;
        if rl.max_calls == 0 {
            return Err(PrFirmError::Config(
                "resilience.rate_limit.max_calls must be at least 1".into(),
            ));
        }
        if rl.period_secs == 0 {
            return Err(PrFirmError::Config(
                "resilience.rate_limit.period_secs must be at least 1".into(),
            ));
        }
        if self.resilience.circuit_breaker.failure_threshold == 0 {
            return Err(PrFirmError::Config(
                "resilience.circuit_breaker.failure_threshold must be at least 1".into(),
            ));
        }
        if self.pipeline.batch_concurrency == 0 {
            return Err(PrFirmError::Config(
                "pipeline.batch_concurrency must be at least 1".into(),
            ));
        }
        for spec in &self.platforms {
            if spec.name.trim().is_empty() {
                return Err(PrFirmError::Config("platform name must not be empty".into()));
            }
        }
        Ok(())
    }

    /// Render the resolved configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PrFirmError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Keep original if env var not set
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}
