//! Configuration loading, validation, and management for LoreWeave.
//!
//! Loads configuration from `~/.loreweave/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use loreweave_core::ModelLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.loreweave/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used when a request does not name one
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Value substituted for the `{{user}}` macro
    #[serde(default = "default_user_name")]
    pub user_name: String,

    /// Limits used for models missing from the registry
    #[serde(default)]
    pub fallback_limits: ModelLimits,

    /// Lorebook scanning and budget settings
    #[serde(default)]
    pub lore: LoreConfig,

    /// History fitting settings
    #[serde(default)]
    pub history: HistoryConfig,

    /// Per-model context limits, keyed by model id
    #[serde(default = "default_models")]
    pub models: BTreeMap<String, ModelLimits>,
}

fn default_model() -> String {
    "deepseek-ai/DeepSeek-V3".into()
}
fn default_user_name() -> String {
    "User".into()
}

fn default_models() -> BTreeMap<String, ModelLimits> {
    [
        ("deepseek-ai/DeepSeek-V3", ModelLimits::new(64000, 8192, 1000)),
        ("deepseek-ai/DeepSeek-R1", ModelLimits::new(32000, 4096, 500)),
        ("Pro/Qwen/Qwen2-7B-Instruct", ModelLimits::new(32000, 4096, 500)),
        ("Qwen/Qwen2.5-72B-Instruct", ModelLimits::new(32768, 8192, 800)),
        ("gpt-4o", ModelLimits::new(128000, 4096, 1000)),
        ("gpt-3.5-turbo", ModelLimits::new(16385, 4096, 300)),
        ("claude-3-5-sonnet-20240620", ModelLimits::new(200000, 8192, 1000)),
    ]
    .into_iter()
    .map(|(name, limits)| (name.to_string(), limits))
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoreConfig {
    /// Token budget for injected lore
    #[serde(default = "default_lore_budget")]
    pub token_budget: usize,

    /// How many recent history messages are scanned for keys
    #[serde(default = "default_scan_depth")]
    pub scan_depth: usize,

    /// Maximum number of entries injected per turn
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Extra keyword passes over text contributed by triggered entries
    #[serde(default = "default_recursion_depth")]
    pub max_recursion_depth: usize,

    /// Vector hits scoring below this are ignored
    #[serde(default)]
    pub vector_min_score: f32,
}

fn default_lore_budget() -> usize {
    1500
}
fn default_scan_depth() -> usize {
    5
}
fn default_max_entries() -> usize {
    30
}
fn default_recursion_depth() -> usize {
    5
}

impl Default for LoreConfig {
    fn default() -> Self {
        Self {
            token_budget: default_lore_budget(),
            scan_depth: default_scan_depth(),
            max_entries: default_max_entries(),
            max_recursion_depth: default_recursion_depth(),
            vector_min_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Soft cap on history tokens, applied on top of the remaining budget
    #[serde(default = "default_max_history_tokens")]
    pub max_history_tokens: usize,

    /// Cumulative character cap for injected long-term memories
    #[serde(default = "default_max_memory_chars")]
    pub max_memory_chars: usize,
}

fn default_max_history_tokens() -> usize {
    4000
}
fn default_max_memory_chars() -> usize {
    2000
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_history_tokens: default_max_history_tokens(),
            max_memory_chars: default_max_memory_chars(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.loreweave/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `LOREWEAVE_MODEL`
    /// - `LOREWEAVE_USER_NAME`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(model) = std::env::var("LOREWEAVE_MODEL") {
            config.default_model = model;
        }

        if let Ok(name) = std::env::var("LOREWEAVE_USER_NAME") {
            config.user_name = name;
        }

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
        dirs_home().join(".loreweave")
    }

    /// Resolve limits for a model id.
    ///
    /// Exact registry match first, then the longest registry key contained in
    /// `model` (so `openai/gpt-4o-mini` resolves to `gpt-4o`), then the
    /// fallback limits.
    pub fn model_limits(&self, model: &str) -> ModelLimits {
        if let Some(limits) = self.models.get(model) {
            return *limits;
        }

        self.models
            .iter()
            .filter(|(key, _)| model.contains(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(key, limits)| {
                tracing::debug!(model, matched = %key, "Resolved model limits by partial match");
                *limits
            })
            .unwrap_or(self.fallback_limits)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fallback_limits.total_budget() <= 0 {
            return Err(ConfigError::ValidationError(
                "fallback_limits leave no prompt budget (context_window <= max_output + safety_buffer)"
                    .into(),
            ));
        }

        if let Some((name, _)) = self.models.iter().find(|(_, l)| l.context_window == 0) {
            return Err(ConfigError::ValidationError(format!(
                "model '{name}' has a zero context_window"
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            user_name: default_user_name(),
            fallback_limits: ModelLimits::default(),
            lore: LoreConfig::default(),
            history: HistoryConfig::default(),
            models: default_models(),
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lore.token_budget, 1500);
        assert_eq!(config.lore.scan_depth, 5);
        assert_eq!(config.lore.max_entries, 30);
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.models, config.models);
    }

    #[test]
    fn exact_model_match_wins() {
        let config = AppConfig::default();
        let limits = config.model_limits("gpt-3.5-turbo");
        assert_eq!(limits, ModelLimits::new(16385, 4096, 300));
    }

    #[test]
    fn partial_model_match_prefers_longest_key() {
        let mut config = AppConfig::default();
        config
            .models
            .insert("gpt-4".into(), ModelLimits::new(8192, 1024, 100));
        let limits = config.model_limits("openai/gpt-4o-2024-08-06");
        assert_eq!(limits.context_window, 128000);
    }

    #[test]
    fn unknown_model_uses_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.model_limits("mystery-model"), ModelLimits::default());
    }

    #[test]
    fn unusable_fallback_rejected() {
        let config = AppConfig {
            fallback_limits: ModelLimits::new(100, 90, 20),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_context_window_rejected() {
        let mut config = AppConfig::default();
        config.models.insert("broken".into(), ModelLimits::new(0, 0, 0));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_model, "deepseek-ai/DeepSeek-V3");
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
user_name = "Mira"

[lore]
token_budget = 800

[models."local/llama"]
context_window = 8192
max_output = 1024
safety_buffer = 200
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.user_name, "Mira");
        assert_eq!(config.lore.token_budget, 800);
        assert_eq!(config.lore.scan_depth, 5);
        assert_eq!(
            config.model_limits("local/llama"),
            ModelLimits::new(8192, 1024, 200)
        );
        assert!(!config.models.contains_key("gpt-4o"));
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "lore = \"not a table\"").unwrap();
        let err = AppConfig::load_from(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("default_model"));
        assert!(toml_str.contains("token_budget"));
    }
}
