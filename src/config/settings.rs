use crate::oracle::openai::DEFAULT_BASE_URL;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "command-auditor";

pub const ENV_RULES_FILE: &str = "COMMAND_AUDITOR_RULES";
pub const ENV_PROMPT_FILE: &str = "COMMAND_AUDITOR_PROMPT";
pub const ENV_LOG_LEVEL: &str = "COMMAND_AUDITOR_LOG_LEVEL";
pub const ENV_MODEL: &str = "AI_AUDITOR_MODEL";

// Older names, read when the new ones are unset
pub const LEGACY_ENV_RULES_FILE: &str = "COMMAND_CHECKER_RULES";
pub const LEGACY_ENV_PROMPT_FILE: &str = "COMMAND_CHECKER_PROMPT";
pub const LEGACY_ENV_LOG_LEVEL: &str = "COMMAND_CHECKER_LOG_LEVEL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Config directory not found")]
    DirectoryNotFound,

    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub security: SecurityConfig,
    pub ai: AiConfig,
    pub rules: RulesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SecurityConfig {
    pub max_command_length: usize,
    pub allow_multiline: bool,
    pub blocked_patterns: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_command_length: 1000,
            allow_multiline: false,
            blocked_patterns: vec![
                r"rm\s+-rf\s+/".to_string(),
                r">(/dev/sda|/dev/hda)".to_string(),
                r"curl.*\|\s*bash".to_string(),
            ],
        }
    }
}

/// What the oracle stage answers when it cannot produce a usable judgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Allow the command
    #[default]
    Open,
    /// Block the command
    Closed,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AiConfig {
    pub model: String,
    pub timeout_seconds: u64,
    pub max_tokens: u32,
    pub max_retries: u32,
    pub base_url: String,
    pub api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub failure_policy: FailurePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<PathBuf>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            timeout_seconds: 30,
            max_tokens: 500,
            max_retries: 0,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            api_key: None,
            failure_policy: FailurePolicy::Open,
            prompt_template: None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct RulesConfig {
    /// Ordered rewrite/block rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
    /// Free-form rule description handed to the oracle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_rules_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            audit_log: None,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        let home = std::env::var("HOME")
            .map_err(|_| ConfigError::DirectoryNotFound)?;
        Ok(PathBuf::from(home).join(".config").join(APP_DIR))
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Err(ConfigError::ReadError(
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Config file not found"
                )
            ));
        }

        Self::load_from(&path)
    }

    /// Load configuration from a specific file, then apply environment overrides
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env_overrides();

        config.validate()?;

        Ok(config)
    }

    /// Load configuration, falling back to defaults if the file is missing or broken
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let (config, error) = Self::load_with_fallback(path);
        if let Some(e) = error {
            tracing::warn!(error = %e, "failed to load config, using defaults");
        }
        config
    }

    /// Like [`Config::load_or_default`], but hands the load error back to the
    /// caller instead of logging it.
    ///
    /// A missing file is not an error. Callers that install the tracing
    /// subscriber from the returned config report the error afterwards.
    pub fn load_with_fallback(path: Option<&Path>) -> (Self, Option<ConfigError>) {
        let loaded = match path {
            Some(path) => Self::load_from(path),
            None => Self::load(),
        };

        match loaded {
            Ok(config) => (config, None),
            Err(e) => {
                let mut config = Self::default();
                config.apply_env_overrides();
                let missing = matches!(&e, ConfigError::ReadError(io) if io.kind() == std::io::ErrorKind::NotFound);
                (config, (!missing).then_some(e))
            }
        }
    }

    /// Apply environment variable overrides for file paths, log level and model
    pub fn apply_env_overrides(&mut self) {
        if let Some(rules_file) = env_with_legacy(ENV_RULES_FILE, LEGACY_ENV_RULES_FILE) {
            self.rules.rules_file = Some(PathBuf::from(rules_file));
        }

        if let Some(prompt_file) = env_with_legacy(ENV_PROMPT_FILE, LEGACY_ENV_PROMPT_FILE) {
            self.ai.prompt_template = Some(PathBuf::from(prompt_file));
        }

        if let Some(level) = env_with_legacy(ENV_LOG_LEVEL, LEGACY_ENV_LOG_LEVEL) {
            self.logging.level = level.to_lowercase();
        }

        if let Some(model) = non_empty_env(ENV_MODEL) {
            self.ai.model = model;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.security.max_command_length == 0 {
            return Err(ConfigError::InvalidValue(
                "max_command_length must be greater than 0".to_string()
            ));
        }

        if self.ai.model.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "ai.model must not be empty".to_string()
            ));
        }

        if self.ai.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue(
                "timeout_seconds must be greater than 0".to_string()
            ));
        }

        if self.ai.max_tokens == 0 {
            return Err(ConfigError::InvalidValue(
                "max_tokens must be greater than 0".to_string()
            ));
        }

        if !self.ai.base_url.starts_with("http://") && !self.ai.base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                format!("Invalid base_url: {}. Must be an http(s) URL", self.ai.base_url)
            ));
        }

        Ok(())
    }

    /// Get API key from environment variable or config
    pub fn get_api_key(&self) -> Option<String> {
        // First try environment variable
        if !self.ai.api_key_env.is_empty() {
            if let Some(key) = non_empty_env(&self.ai.api_key_env) {
                return Some(key);
            }
        }

        // Fall back to config file if present
        self.ai.api_key.clone().filter(|key| !key.is_empty())
    }

    /// Check if API key is available
    pub fn has_api_key(&self) -> bool {
        self.get_api_key().is_some()
    }

    /// Rule file path, defaulting to `rules.toml` in the config directory
    pub fn rules_file(&self) -> Option<PathBuf> {
        self.resolve(self.rules.rules_file.as_deref(), "rules.toml")
    }

    /// Oracle rule description path, defaulting to `ai-rules.md`
    pub fn ai_rules_file(&self) -> Option<PathBuf> {
        self.resolve(self.rules.ai_rules_file.as_deref(), "ai-rules.md")
    }

    /// Prompt template path, defaulting to `prompt.md`
    pub fn prompt_template(&self) -> Option<PathBuf> {
        self.resolve(self.ai.prompt_template.as_deref(), "prompt.md")
    }

    fn resolve(&self, configured: Option<&Path>, default_name: &str) -> Option<PathBuf> {
        match configured {
            Some(path) => Some(expand_path(path)),
            None => Self::config_dir().ok().map(|dir| dir.join(default_name)),
        }
    }
}

/// Expand a leading `~/` to the home directory
pub fn expand_path(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_with_legacy(name: &str, legacy: &str) -> Option<String> {
    non_empty_env(name).or_else(|| non_empty_env(legacy))
}
