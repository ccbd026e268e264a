//! Configuration loading, validation, and management for memloop.
//!
//! Loads configuration from `~/.memloop/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use memloop_core::agent::{
    DEFAULT_CONTEXT_WINDOW, DEFAULT_ENDPOINT, DEFAULT_MODEL, DEFAULT_MODEL_WRAPPER,
};
use memloop_core::{EmbeddingConfig, LlmConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The root configuration structure.
///
/// Maps directly to `~/.memloop/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the model endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default model
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_endpoint")]
    pub model_endpoint: String,

    #[serde(default = "default_endpoint_type")]
    pub model_endpoint_type: String,

    /// Prompt wrapper for local models
    #[serde(default = "default_model_wrapper", skip_serializing_if = "Option::is_none")]
    pub model_wrapper: Option<String>,

    /// Context window in tokens
    #[serde(default = "default_context_window")]
    pub context_window: usize,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Max tokens per model response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Persona used for new agents
    #[serde(default = "default_persona")]
    pub default_persona: String,

    /// Human used for new agents
    #[serde(default = "default_human")]
    pub default_human: String,

    /// Preset used for new agents
    #[serde(default = "default_preset")]
    pub default_preset: String,

    /// Embedding configuration
    #[serde(default)]
    pub embedding: EmbeddingSection,

    /// Core memory configuration
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Agent loop configuration
    #[serde(default)]
    pub agent: AgentLoopConfig,

    /// Rate-limit retry configuration
    #[serde(default)]
    pub retry: RetryConfig,

    /// Storage backend configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_model() -> String {
    DEFAULT_MODEL.into()
}
fn default_endpoint() -> String {
    DEFAULT_ENDPOINT.into()
}
fn default_endpoint_type() -> String {
    "openai".into()
}
fn default_model_wrapper() -> Option<String> {
    Some(DEFAULT_MODEL_WRAPPER.into())
}
fn default_context_window() -> usize {
    DEFAULT_CONTEXT_WINDOW
}
fn default_temperature() -> f32 {
    0.7
}
fn default_persona() -> String {
    "sam_pov".into()
}
fn default_human() -> String {
    "basic".into()
}
fn default_preset() -> String {
    "memgpt_chat".into()
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("model_endpoint", &self.model_endpoint)
            .field("model_endpoint_type", &self.model_endpoint_type)
            .field("model_wrapper", &self.model_wrapper)
            .field("context_window", &self.context_window)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("default_persona", &self.default_persona)
            .field("default_human", &self.default_human)
            .field("default_preset", &self.default_preset)
            .field("embedding", &self.embedding)
            .field("memory", &self.memory)
            .field("agent", &self.agent)
            .field("retry", &self.retry)
            .field("storage", &self.storage)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    #[serde(default = "default_embedding_dim")]
    pub dim: usize,
}

fn default_embedding_model() -> String {
    "nomic-text-embed".into()
}
fn default_embedding_dim() -> usize {
    384
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            endpoint: Some(default_endpoint()),
            model: default_embedding_model(),
            dim: default_embedding_dim(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_char_limit")]
    pub persona_char_limit: usize,

    #[serde(default = "default_char_limit")]
    pub human_char_limit: usize,

    /// Directory holding `personas/<name>.txt` and `humans/<name>.txt` overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<PathBuf>,
}

fn default_char_limit() -> usize {
    2000
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            persona_char_limit: default_char_limit(),
            human_char_limit: default_char_limit(),
            prompts_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    /// Maximum heartbeat continuations per user input
    #[serde(default = "default_max_heartbeat_chain")]
    pub max_heartbeat_chain: u32,

    /// Wall-clock bound on one chain, in seconds
    #[serde(default = "default_max_chain_seconds")]
    pub max_chain_seconds: u64,

    /// How often to retry a first message that fails verification
    #[serde(default = "default_first_message_attempts")]
    pub first_message_attempts: u32,

    #[serde(default = "default_true")]
    pub verify_first_message: bool,

    /// Fraction of the context window that triggers a memory warning
    #[serde(default = "default_fraction")]
    pub memory_warning_threshold: f32,

    /// Summarize instead of warning when the threshold is crossed
    #[serde(default)]
    pub auto_summarize: bool,

    /// Target fraction of the warning threshold after summarizing
    #[serde(default = "default_fraction")]
    pub summarize_fraction: f32,

    /// Render `characters="len/limit"` on core memory blocks
    #[serde(default = "default_true")]
    pub include_char_count: bool,

    /// Seed new agents with a boot `send_message` exchange
    #[serde(default = "default_true")]
    pub boot_messages: bool,

    /// Send a timed heartbeat after this many idle seconds; 0 disables it
    #[serde(default)]
    pub heartbeat_interval_secs: u64,
}

fn default_max_heartbeat_chain() -> u32 {
    10
}
fn default_max_chain_seconds() -> u64 {
    300
}
fn default_first_message_attempts() -> u32 {
    10
}
fn default_fraction() -> f32 {
    0.75
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_heartbeat_chain: default_max_heartbeat_chain(),
            max_chain_seconds: default_max_chain_seconds(),
            first_message_attempts: default_first_message_attempts(),
            verify_first_message: true,
            memory_warning_threshold: default_fraction(),
            auto_summarize: false,
            summarize_fraction: default_fraction(),
            include_char_count: true,
            boot_messages: true,
            heartbeat_interval_secs: 0,
        }
    }
}

impl AgentLoopConfig {
    pub fn max_chain_duration(&self) -> Duration {
        Duration::from_secs(self.max_chain_seconds)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0).then(|| Duration::from_secs(self.heartbeat_interval_secs))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay, in seconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_secs: f64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

fn default_max_retries() -> u32 {
    20
}
fn default_initial_delay() -> f64 {
    1.0
}
fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_secs: default_initial_delay(),
            multiplier: default_multiplier(),
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs_f64(self.initial_delay_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// "file" or "memory"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Data directory for the file backend (default: `~/.memloop/data`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

fn default_storage_backend() -> String {
    "file".into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            path: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.memloop/config.toml).
    ///
    /// Environment overrides:
    /// - `MEMLOOP_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `MEMLOOP_MODEL`
    /// - `MEMLOOP_ENDPOINT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("MEMLOOP_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("MEMLOOP_MODEL") {
            config.model = model;
        }

        if let Ok(endpoint) = std::env::var("MEMLOOP_ENDPOINT") {
            config.model_endpoint = endpoint;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".memloop")
    }

    /// Where the file backend keeps its data.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("data"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.temperature < 0.0 || self.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.context_window == 0 {
            return Err(ConfigError::ValidationError(
                "context_window must be > 0".into(),
            ));
        }

        if self.memory.persona_char_limit == 0 || self.memory.human_char_limit == 0 {
            return Err(ConfigError::ValidationError(
                "core memory char limits must be > 0".into(),
            ));
        }

        let threshold = self.agent.memory_warning_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(ConfigError::ValidationError(
                "agent.memory_warning_threshold must be in (0.0, 1.0]".into(),
            ));
        }

        let fraction = self.agent.summarize_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ConfigError::ValidationError(
                "agent.summarize_fraction must be in (0.0, 1.0)".into(),
            ));
        }

        if self.agent.first_message_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "agent.first_message_attempts must be >= 1".into(),
            ));
        }

        if self.retry.initial_delay_secs < 0.0 || self.retry.multiplier < 1.0 {
            return Err(ConfigError::ValidationError(
                "retry.initial_delay_secs must be >= 0 and retry.multiplier >= 1".into(),
            ));
        }

        if !matches!(self.storage.backend.as_str(), "file" | "memory") {
            return Err(ConfigError::ValidationError(format!(
                "unknown storage backend '{}' (expected \"file\" or \"memory\")",
                self.storage.backend
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Model settings for new agents.
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            model: self.model.clone(),
            model_endpoint: self.model_endpoint.clone(),
            model_endpoint_type: self.model_endpoint_type.clone(),
            model_wrapper: self.model_wrapper.clone(),
            context_window: self.context_window,
        }
    }

    pub fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            embedding_endpoint: self.embedding.endpoint.clone(),
            embedding_model: self.embedding.model.clone(),
            embedding_dim: self.embedding.dim,
        }
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            model_endpoint: default_endpoint(),
            model_endpoint_type: default_endpoint_type(),
            model_wrapper: default_model_wrapper(),
            context_window: default_context_window(),
            temperature: default_temperature(),
            max_tokens: None,
            default_persona: default_persona(),
            default_human: default_human(),
            default_preset: default_preset(),
            embedding: EmbeddingSection::default(),
            memory: MemoryConfig::default(),
            agent: AgentLoopConfig::default(),
            retry: RetryConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for memloop_core::Error {
    fn from(e: ConfigError) -> Self {
        memloop_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.model, "llama3:70b");
        assert_eq!(config.agent.heartbeat_interval(), None);
        assert_eq!(config.context_window, 8192);
        assert_eq!(config.memory.persona_char_limit, 2000);
        assert_eq!(config.agent.max_heartbeat_chain, 10);
        assert_eq!(config.retry.max_retries, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.model, config.model);
        assert_eq!(parsed.agent.first_message_attempts, config.agent.first_message_attempts);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_threshold_rejected() {
        let mut config = AppConfig::default();
        config.agent.memory_warning_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.agent.summarize_fraction = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_storage_backend_rejected() {
        let mut config = AppConfig::default();
        config.storage.backend = "postgres".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("postgres"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let config = AppConfig::load_from(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(config.default_preset, "memgpt_chat");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
model = "gpt-4o"
context_window = 128000

[agent]
max_heartbeat_chain = 3
auto_summarize = true
heartbeat_interval_secs = 900

[storage]
backend = "memory"
"#,
        )
        .unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.llm_config().context_window, 128000);
        assert_eq!(config.agent.max_heartbeat_chain, 3);
        assert!(config.agent.auto_summarize);
        assert_eq!(config.agent.heartbeat_interval(), Some(Duration::from_secs(900)));
        assert_eq!(config.agent.first_message_attempts, 10);
        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.retry.initial_delay(), Duration::from_secs(1));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(&path),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("llama3:70b"));
        assert!(toml_str.contains("[agent]"));
    }

    #[test]
    fn storage_dir_prefers_configured_path() {
        let mut config = AppConfig::default();
        config.storage.path = Some(PathBuf::from("/tmp/memloop-data"));
        assert_eq!(config.storage_dir(), PathBuf::from("/tmp/memloop-data"));
    }
}
