//! Pre-execution command auditing.
//!
//! A command is sanitized, vetted by a local security gate, matched
//! against an ordered rewrite/block table and, when nothing local decides,
//! judged by an external LLM oracle. The result is a [`Verdict`]: run it,
//! run a replacement, or refuse it.
//!
//! ```no_run
//! use command_auditor::{CommandChecker, Config};
//!
//! # async fn demo() {
//! let config = Config::load_or_default(None);
//! let checker = CommandChecker::from_config(&config);
//! let verdict = checker.check("rm -rf /", None).await;
//! assert!(verdict.is_error());
//! # }
//! ```

pub mod audit;
pub mod checker;
pub mod config;
pub mod error;
pub mod logging;
pub mod oracle;
pub mod rules;
pub mod security;

// Re-export commonly used types for convenience
pub use checker::{Action, CommandChecker, DecidingStage, Verdict};
pub use config::{Config, FailurePolicy};
pub use error::{AppError, AppResult};
pub use oracle::{AiOracle, CommandContext, OracleClient, OracleError, OracleRequest};
pub use rules::{RuleEngine, RuleOutcome};
pub use security::{sanitize, SanitizedCommand, SecurityGate, SecurityViolation};
