//! Configuration loading, validation, and management for Parley.
//!
//! Loads configuration from `~/.parley/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use parley_core::budget::{
    ConversationBudget, DEFAULT_MAX_CONTEXT_TOKENS, DEFAULT_RETRIEVAL_TOP_K, ResummarizePolicy,
    UserTurnOverflow,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.parley/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Context assembly and retrieval settings
    #[serde(default)]
    pub context: ContextConfig,

    /// Inference collaborator settings
    #[serde(default)]
    pub inference: InferenceConfig,

    /// Full-text chunk index settings
    #[serde(default)]
    pub index: IndexConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Hard cap on the assembled prompt, in estimated tokens
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,

    /// Desired history size (informational)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_window_target: Option<usize>,

    /// Chunks retrieved per grounded request
    #[serde(default = "default_top_k")]
    pub retrieval_top_k: usize,

    /// Dropped turns needed to request summarization (0 disables it)
    #[serde(default = "default_drop_threshold")]
    pub summarization_drop_threshold: usize,

    /// Whether an applied summary may be condensed again
    #[serde(default)]
    pub resummarize: ResummarizePolicy,

    /// Behaviour when the user turn alone exceeds the budget
    #[serde(default)]
    pub user_turn_overflow: UserTurnOverflow,

    /// Target size of document chunks produced by the chunker
    #[serde(default = "default_chunk_target_tokens")]
    pub chunk_target_tokens: usize,
}

fn default_max_context_tokens() -> usize {
    DEFAULT_MAX_CONTEXT_TOKENS
}
fn default_top_k() -> usize {
    DEFAULT_RETRIEVAL_TOP_K
}
fn default_drop_threshold() -> usize {
    1
}
fn default_chunk_target_tokens() -> usize {
    500
}

impl ContextConfig {
    /// The per-request budget derived from this configuration.
    pub fn budget(&self) -> ConversationBudget {
        ConversationBudget {
            max_context_tokens: self.max_context_tokens,
            history_window_target: self.history_window_target,
            retrieval_top_k: self.retrieval_top_k,
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: default_max_context_tokens(),
            history_window_target: None,
            retrieval_top_k: default_top_k(),
            summarization_drop_threshold: default_drop_threshold(),
            resummarize: ResummarizePolicy::default(),
            user_turn_overflow: UserTurnOverflow::default(),
            chunk_target_tokens: default_chunk_target_tokens(),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Provider name (used for logging and the default endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// API base URL; defaults to the provider's public endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// API key (can be supplied through the environment instead)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens per completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Deadline for a single inference call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-3.5-turbo".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    60
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            api_url: None,
            api_key: None,
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for InferenceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceConfig")
            .field("provider", &self.provider)
            .field("api_url", &self.api_url)
            .field("api_key", &redact(&self.api_key))
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Which full-text chunk index backs retrieval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexBackend {
    #[default]
    Memory,
    Sqlite,
    None,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,

    /// Database path for the sqlite backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl IndexConfig {
    /// Database path, defaulting to `~/.parley/chunks.db`.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("chunks.db"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.parley/config.toml).
    ///
    /// Environment overrides:
    /// - `PARLEY_API_KEY`, then `OPENAI_API_KEY`, used only when the file sets
    ///   no `inference.api_key`
    /// - `PARLEY_MODEL` and `PARLEY_MAX_CONTEXT_TOKENS`, which replace the file
    ///   values when set
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load configuration from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env_overrides()?;
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

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if self.inference.api_key.is_none() {
            self.inference.api_key = std::env::var("PARLEY_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            self.inference.model = model;
        }

        if let Ok(raw) = std::env::var("PARLEY_MAX_CONTEXT_TOKENS") {
            self.context.max_context_tokens = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "PARLEY_MAX_CONTEXT_TOKENS must be a non-negative integer, got '{raw}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".parley")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.context.retrieval_top_k == 0 {
            return Err(ConfigError::ValidationError(
                "context.retrieval_top_k must be at least 1".into(),
            ));
        }

        if self.context.chunk_target_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "context.chunk_target_tokens must be > 0".into(),
            ));
        }

        if self.inference.temperature < 0.0 || self.inference.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "inference.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.inference.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "inference.timeout_secs must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.inference.api_key.is_some()
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
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
