pub mod settings;

pub use settings::{
    expand_path, AiConfig, Config, ConfigError, FailurePolicy, LoggingConfig, RulesConfig,
    SecurityConfig,
};
