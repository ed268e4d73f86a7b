//! Ordered rewrite and block rules loaded from the rules file.
//!
//! ```toml
//! [[rule]]
//! pattern = "^rm -rf (\\S+)$"
//! replace = "trash \\1"
//! reason = "Prefer recoverable deletes"
//!
//! [[rule]]
//! pattern = "git\\s+push\\s+--force\\b"
//! error = "Use --force-with-lease instead"
//! ```

pub mod engine;

pub use engine::{
    translate_template, RewriteRule, RuleDefinition, RuleEffect, RuleEngine, RuleFile,
    RuleLoadError, RuleOutcome,
};
