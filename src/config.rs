//! Configuration management
//!
//! This module handles loading, validation, and management of the ragline
//! configuration. Configuration is stored in TOML format at
//! `~/.ragline/config.toml` unless an explicit path is given.
//!
//! # Configuration Sections
//!
//! - **app**: Display name and log level
//! - **qdrant**: Vector store URL, API key, timeout
//! - **embedding**: Embedding service URL and timeout
//! - **llm**: Provider endpoint, generation parameters, and the model
//!   fallback chain (`[[llm.models]]`, lowest priority tried first)
//! - **paths**: Template directory
//! - **cache**: Response cache toggle and TTL
//!
//! API keys never live in the file; `llm.api_key_env` names the environment
//! variable holding the OpenRouter key.

use crate::llm::gateway::ModelSpec;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Config read failed for {0}: {1}")]
    Io(PathBuf, String),

    #[error("Config parse failed: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    #[serde(default)]
    pub app: AppConfig,

    /// Qdrant vector store settings
    #[serde(default)]
    pub qdrant: QdrantConfig,

    /// Embedding service settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// LLM provider and fallback chain settings
    #[serde(default)]
    pub llm: LlmConfig,

    /// Filesystem paths
    #[serde(default)]
    pub paths: PathsConfig,

    /// Response cache settings
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Display name
    #[serde(default = "default_app_name")]
    pub name: String,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Qdrant configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// Base URL of the Qdrant REST API
    #[serde(default = "default_qdrant_url")]
    pub url: String,

    /// Optional API key sent as the `api-key` header
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-search timeout in seconds
    #[serde(default = "default_qdrant_timeout_s")]
    pub timeout_s: u64,
}

/// Embedding service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of the embedding service
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Per-embed timeout in seconds
    #[serde(default = "default_embedding_timeout_s")]
    pub timeout_s: u64,
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible chat-completions API
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Referer header value required by OpenRouter
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Max tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Base backoff between retries in milliseconds (doubled per attempt)
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Fallback chain; lowest priority is tried first
    #[serde(default = "default_models")]
    pub models: Vec<ModelEntry>,
}

/// One model in the fallback chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Provider-qualified model name
    pub name: String,

    /// Chain position; lower is tried first
    pub priority: u32,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_model_timeout_s")]
    pub timeout_s: u64,

    /// Total attempts allowed for this model
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
}

impl ModelEntry {
    /// Convert to the runtime chain entry.
    pub fn to_spec(&self) -> ModelSpec {
        ModelSpec {
            name: self.name.clone(),
            timeout: Duration::from_secs(self.timeout_s),
            retry_count: self.retry_count,
            priority: self.priority,
        }
    }
}

/// Filesystem paths
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding prompt template files
    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache enabled?
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry time-to-live in seconds
    #[serde(default = "default_cache_ttl_s")]
    pub ttl_s: u64,
}

fn default_app_name() -> String {
    "ragline".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_qdrant_timeout_s() -> u64 {
    30
}

fn default_embedding_url() -> String {
    "http://localhost:8001".to_string()
}

fn default_embedding_timeout_s() -> u64 {
    10
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_referer() -> String {
    "ragline".to_string()
}

fn default_max_tokens() -> u32 {
    1024
}

fn default_temperature() -> f32 {
    0.7
}

fn default_backoff_ms() -> u64 {
    1000
}

fn default_model_timeout_s() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    2
}

fn default_models() -> Vec<ModelEntry> {
    vec![
        ModelEntry {
            name: "openai/gpt-4o-mini".to_string(),
            priority: 1,
            timeout_s: 30,
            retry_count: 2,
        },
        ModelEntry {
            name: "anthropic/claude-3-haiku".to_string(),
            priority: 2,
            timeout_s: 60,
            retry_count: 2,
        },
    ]
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("configs")
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_s() -> u64 {
    3600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: default_qdrant_url(),
            api_key: None,
            timeout_s: default_qdrant_timeout_s(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            timeout_s: default_embedding_timeout_s(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            referer: default_referer(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            backoff_ms: default_backoff_ms(),
            models: default_models(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            ttl_s: default_cache_ttl_s(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app: AppConfig::default(),
            qdrant: QdrantConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            paths: PathsConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Default on-disk location: `~/.ragline/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".ragline")
            .join("config.toml")
    }

    /// Load configuration from an explicit path.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::Io(path.to_path_buf(), e.to_string())
            }
        })?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, writing a default file first if none
    /// exists.
    pub fn load_or_create() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if !path.exists() {
            let config = Config::default();
            config.save(&path)?;
            return Ok(config);
        }
        Self::load_from_path(&path)
    }

    /// Write the configuration as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Io(parent.to_path_buf(), e.to_string()))?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        fs::write(path, content).map_err(|e| ConfigError::Io(path.to_path_buf(), e.to_string()))
    }

    /// Check cross-field invariants.
    ///
    /// URLs must be http(s), the model chain must be non-empty with distinct
    /// priorities, and every model needs at least one attempt.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, url) in [
            ("qdrant.url", &self.qdrant.url),
            ("embedding.url", &self.embedding.url),
            ("llm.base_url", &self.llm.base_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(format!(
                    "{} must start with http:// or https://, got: {}",
                    field, url
                )));
            }
        }

        if self.llm.models.is_empty() {
            return Err(ConfigError::Invalid(
                "llm.models must list at least one model".to_string(),
            ));
        }

        let mut priorities: Vec<u32> = self.llm.models.iter().map(|m| m.priority).collect();
        priorities.sort_unstable();
        priorities.dedup();
        if priorities.len() != self.llm.models.len() {
            return Err(ConfigError::Invalid(
                "llm.models priorities must be distinct".to_string(),
            ));
        }

        for model in &self.llm.models {
            if model.retry_count == 0 {
                return Err(ConfigError::Invalid(format!(
                    "model {} must allow at least one attempt",
                    model.name
                )));
            }
            if model.timeout_s == 0 {
                return Err(ConfigError::Invalid(format!(
                    "model {} must have a non-zero timeout",
                    model.name
                )));
            }
        }

        Ok(())
    }

    /// The fallback chain as runtime specs, in declaration order (the
    /// gateway sorts by priority).
    pub fn model_chain(&self) -> Vec<ModelSpec> {
        self.llm.models.iter().map(ModelEntry::to_spec).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.llm.models.len(), 2);
        assert_eq!(config.llm.models[0].priority, 1);
    }

    #[test]
    fn test_roundtrip_through_toml() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.qdrant.url, config.qdrant.url);
        assert_eq!(parsed.llm.models.len(), config.llm.models.len());
    }

    #[test]
    fn test_minimal_file_gets_defaults() {
        let parsed: Config = toml::from_str("[app]\nname = \"test\"\n").unwrap();
        assert_eq!(parsed.app.name, "test");
        assert_eq!(parsed.app.log_level, "info");
        assert_eq!(parsed.llm.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(parsed.cache.ttl_s, 3600);
    }

    #[test]
    fn test_invalid_url_rejected() {
        let mut config = Config::default();
        config.qdrant.url = "qdrant:6333".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_empty_model_chain_rejected() {
        let mut config = Config::default();
        config.llm.models.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_priorities_rejected() {
        let mut config = Config::default();
        config.llm.models[1].priority = config.llm.models[0].priority;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_retry_count_rejected() {
        let mut config = Config::default();
        config.llm.models[0].retry_count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from_path(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("config.toml");

        let mut config = Config::default();
        config.app.name = "saved".to_string();
        config.save(&path).unwrap();

        let reloaded = Config::load_from_path(&path).unwrap();
        assert_eq!(reloaded.app.name, "saved");
    }

    #[test]
    fn test_model_chain_conversion() {
        let config = Config::default();
        let chain = config.model_chain();
        assert_eq!(chain[0].name, "openai/gpt-4o-mini");
        assert_eq!(chain[0].timeout, Duration::from_secs(30));
        assert_eq!(chain[1].timeout, Duration::from_secs(60));
    }
}
