use std::io;
use thiserror::Error;

// Import module-level errors for AppError
use crate::config::settings::ConfigError;
use crate::oracle::client::OracleError;
use crate::rules::engine::RuleLoadError;
use crate::security::gate::SecurityViolation;

/// Top-level application error that wraps all module-specific errors
///
/// The checker itself never surfaces these: each stage degrades to a
/// verdict. They are returned by the strict constructors and by setup
/// code that wants to report what went wrong.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Rules error: {0}")]
    Rules(#[from] RuleLoadError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Security violation: {0}")]
    Security(#[from] SecurityViolation),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for application-level operations
pub type AppResult<T> = std::result::Result<T, AppError>;
