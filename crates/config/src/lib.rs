//! Configuration loading, validation, and management for sopilot.
//!
//! Loads configuration from `~/.sopilot/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.sopilot/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL for the default provider's API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Default LLM provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Default temperature
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Default max tokens per LLM response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Prompt and rule language ("en", "ja", ...)
    #[serde(default = "default_language")]
    pub language: String,

    /// Token for the model-hosting service, forwarded to the browser bridge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hugging_face_hub_token: Option<String>,

    #[serde(default)]
    pub sop: SopConfig,

    #[serde(default)]
    pub browser: BrowserConfig,

    #[serde(default)]
    pub agent: AgentConfig,

    #[serde(default)]
    pub prompts: PromptConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "gemini".into()
}
fn default_model() -> String {
    "gemini-2.5-flash".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    8192
}
fn default_language() -> String {
    "en".into()
}
fn default_true() -> bool {
    true
}

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
            .field("api_url", &self.api_url)
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("language", &self.language)
            .field("hugging_face_hub_token", &redact(&self.hugging_face_hub_token))
            .field("sop", &self.sop)
            .field("browser", &self.browser)
            .field("agent", &self.agent)
            .field("prompts", &self.prompts)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

/// SOP guidance settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SopConfig {
    /// Whether plans are guided by the SOP library
    #[serde(default)]
    pub enabled: bool,

    /// YAML SOP database
    #[serde(default = "default_sop_library")]
    pub library_path: String,
}

fn default_sop_library() -> String {
    "dataset_for_sop_generation_updated.yaml".into()
}

impl Default for SopConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            library_path: default_sop_library(),
        }
    }
}

/// Browser bridge settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// Base URL of the HTTP bridge hosting the browser environment
    #[serde(default = "default_bridge_url")]
    pub bridge_url: String,

    #[serde(default)]
    pub headless: bool,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Retry failed element actions with force
    #[serde(default = "default_true")]
    pub retry_with_force: bool,

    /// Pause after each executed action
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Pause before reading values off the page
    #[serde(default = "default_extract_wait_ms")]
    pub extract_wait_ms: u64,

    /// Per-request timeout for bridge calls
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_bridge_url() -> String {
    "http://127.0.0.1:8765".into()
}
fn default_seed() -> u64 {
    42
}
fn default_settle_delay_ms() -> u64 {
    1000
}
fn default_extract_wait_ms() -> u64 {
    3000
}
fn default_request_timeout_secs() -> u64 {
    180
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            bridge_url: default_bridge_url(),
            headless: false,
            seed: default_seed(),
            retry_with_force: true,
            settle_delay_ms: default_settle_delay_ms(),
            extract_wait_ms: default_extract_wait_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Task loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Plan/act iterations per task
    #[serde(default = "default_max_loops")]
    pub max_loops: u32,

    /// Root directory for per-task logs
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Verification rounds per plan
    #[serde(default = "default_repair_attempts")]
    pub repair_attempts: u32,

    /// Completion attempts per LLM call
    #[serde(default = "default_llm_attempts")]
    pub llm_attempts: u32,

    #[serde(default = "default_llm_retry_delay_ms")]
    pub llm_retry_delay_ms: u64,
}

fn default_max_loops() -> u32 {
    8
}
fn default_output_dir() -> String {
    "task_execution_data_full_logs".into()
}
fn default_repair_attempts() -> u32 {
    3
}
fn default_llm_attempts() -> u32 {
    3
}
fn default_llm_retry_delay_ms() -> u64 {
    2000
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
            output_dir: default_output_dir(),
            repair_attempts: default_repair_attempts(),
            llm_attempts: default_llm_attempts(),
            llm_retry_delay_ms: default_llm_retry_delay_ms(),
        }
    }
}

/// Where prompt templates and intent rules live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_template_dir")]
    pub template_dir: String,

    #[serde(default = "default_rules_dir")]
    pub rules_dir: String,
}

fn default_template_dir() -> String {
    "prompts".into()
}
fn default_rules_dir() -> String {
    "rules".into()
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template_dir: default_template_dir(),
            rules_dir: default_rules_dir(),
        }
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.sopilot/config.toml).
    ///
    /// Also checks environment variables for API keys:
    /// - `SOPILOT_API_KEY` (highest priority)
    /// - `GEMINI_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_path())
    }

    /// Load from `path`, then apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from an environment lookup.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.is_none() {
            self.api_key = lookup("SOPILOT_API_KEY")
                .or_else(|| lookup("GEMINI_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(provider) = lookup("SOPILOT_PROVIDER") {
            self.default_provider = provider;
        }

        if let Some(model) = lookup("SOPILOT_MODEL") {
            self.default_model = model;
        }

        if self.hugging_face_hub_token.is_none() {
            self.hugging_face_hub_token = lookup("HUGGING_FACE_HUB_TOKEN");
        }
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
        dirs_home().join(".sopilot")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_temperature < 0.0 || self.default_temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.agent.max_loops == 0 {
            return Err(ConfigError::ValidationError("agent.max_loops must be >= 1".into()));
        }

        if self.agent.repair_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "agent.repair_attempts must be >= 1".into(),
            ));
        }

        if self.agent.llm_attempts == 0 {
            return Err(ConfigError::ValidationError("agent.llm_attempts must be >= 1".into()));
        }

        if self.sop.enabled && self.sop.library_path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "sop.library_path is required when sop.enabled = true".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
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
            api_url: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            language: default_language(),
            hugging_face_hub_token: None,
            sop: SopConfig::default(),
            browser: BrowserConfig::default(),
            agent: AgentConfig::default(),
            prompts: PromptConfig::default(),
            providers: HashMap::new(),
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

impl From<ConfigError> for sopilot_core::Error {
    fn from(e: ConfigError) -> Self {
        sopilot_core::Error::Config {
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert_eq!(config.default_provider, "gemini");
        assert_eq!(config.browser.seed, 42);
        assert_eq!(config.agent.max_loops, 8);
        assert!(config.browser.retry_with_force);
        assert!(!config.sop.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(parsed.agent.output_dir, config.agent.output_dir);
    }

    #[test]
    fn partial_sections_fill_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
language = "ja"

[sop]
enabled = true

[agent]
max_loops = 3
"#,
        )
        .unwrap();
        assert_eq!(config.language, "ja");
        assert!(config.sop.enabled);
        assert_eq!(config.sop.library_path, "dataset_for_sop_generation_updated.yaml");
        assert_eq!(config.agent.max_loops, 3);
        assert_eq!(config.agent.repair_attempts, 3);
        assert_eq!(config.browser.extract_wait_ms, 3000);
    }

    #[test]
    fn invalid_temperature_rejected() {
        let config = AppConfig {
            default_temperature: 5.0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_loops_rejected() {
        let mut config = AppConfig::default();
        config.agent.max_loops = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn enabled_sop_needs_library() {
        let mut config = AppConfig::default();
        config.sop.enabled = true;
        config.sop.library_path = "  ".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("library_path"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_provider, "gemini");
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "default_temperature = \"hot\"").unwrap();
        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn env_key_priority() {
        let mut config = AppConfig::default();
        config.apply_env(env_from(&[
            ("OPENAI_API_KEY", "openai"),
            ("GEMINI_API_KEY", "gemini"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("gemini"));

        let mut config = AppConfig::default();
        config.apply_env(env_from(&[
            ("SOPILOT_API_KEY", "own"),
            ("GEMINI_API_KEY", "gemini"),
            ("SOPILOT_MODEL", "gemini-2.5-pro"),
            ("HUGGING_FACE_HUB_TOKEN", "hf_x"),
        ]));
        assert_eq!(config.api_key.as_deref(), Some("own"));
        assert_eq!(config.default_model, "gemini-2.5-pro");
        assert_eq!(config.hugging_face_hub_token.as_deref(), Some("hf_x"));
    }

    #[test]
    fn file_key_beats_env() {
        let mut config = AppConfig {
            api_key: Some("from-file".into()),
            ..AppConfig::default()
        };
        config.apply_env(env_from(&[("SOPILOT_API_KEY", "env")]));
        assert_eq!(config.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            hugging_face_hub_token: Some("hf_secret".into()),
            ..AppConfig::default()
        };
        let text = format!("{config:?}");
        assert!(!text.contains("sk-secret"));
        assert!(!text.contains("hf_secret"));
        assert!(text.contains("[REDACTED]"));
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gemini-2.5-flash"));
        assert!(toml_str.contains("[browser]"));
        assert!(toml_str.contains("task_execution_data_full_logs"));
    }
}
