use crate::config::SecurityConfig;
use crate::security::patterns::{PatternCategory, PatternLibrary, PatternRule};
use crate::security::sanitizer::SanitizedCommand;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityViolation {
    #[error("Empty command")]
    EmptyCommand,

    #[error("Command too long: {length} > {max} characters")]
    TooLong { length: usize, max: usize },

    #[error("Multiline commands not allowed")]
    MultilineNotAllowed,

    #[error("Null bytes detected in command")]
    NullByte,

    #[error("Dangerous command pattern detected: {pattern} ({message})")]
    DangerousPattern { pattern: String, message: String },

    #[error("Blocked command pattern: {pattern}")]
    BlockedPattern { pattern: String, message: String },

    #[error("Command injection attempt detected: {pattern} ({message})")]
    InjectionAttempt { pattern: String, message: String },
}

impl SecurityViolation {
    /// Short tag used in audit records
    pub fn kind(&self) -> &'static str {
        match self {
            SecurityViolation::EmptyCommand => "EMPTY",
            SecurityViolation::TooLong { .. } => "TOO-LONG",
            SecurityViolation::MultilineNotAllowed => "MULTILINE",
            SecurityViolation::NullByte => "NULL-BYTE",
            SecurityViolation::DangerousPattern { .. } => "DANGEROUS",
            SecurityViolation::BlockedPattern { .. } => "BLOCKED",
            SecurityViolation::InjectionAttempt { .. } => "INJECTION",
        }
    }

    /// The pattern that vetoed the command, for pattern-based violations
    pub fn pattern(&self) -> Option<&str> {
        match self {
            SecurityViolation::DangerousPattern { pattern, .. }
            | SecurityViolation::BlockedPattern { pattern, .. }
            | SecurityViolation::InjectionAttempt { pattern, .. } => Some(pattern),
            _ => None,
        }
    }
}

/// Advisory output of a passing gate check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityReport {
    /// Suspicious patterns that matched but did not block
    pub suspicious: Vec<String>,
}

/// Deterministic local veto stage
pub struct SecurityGate {
    max_command_length: usize,
    allow_multiline: bool,
    library: &'static PatternLibrary,
    blocked: Vec<PatternRule>,
}

impl SecurityGate {
    pub fn new(config: &SecurityConfig) -> Self {
        Self::with_library(config, PatternLibrary::builtin())
    }

    pub fn with_library(config: &SecurityConfig, library: &'static PatternLibrary) -> Self {
        // Operator patterns are compiled once; a bad one is skipped, not fatal
        let blocked = config
            .blocked_patterns
            .iter()
            .filter_map(|pattern| {
                PatternRule::compile(PatternCategory::Dangerous, pattern, "Blocked by configuration")
                    .map_err(|e| {
                        tracing::warn!(pattern = %pattern, error = %e, "skipping invalid blocked pattern");
                    })
                    .ok()
            })
            .collect();

        Self {
            max_command_length: config.max_command_length,
            allow_multiline: config.allow_multiline,
            library,
            blocked,
        }
    }

    /// Run every check in order, stopping at the first violation
    pub fn check(&self, command: &SanitizedCommand) -> Result<SecurityReport, SecurityViolation> {
        let command = command.as_str();

        self.check_structure(command)?;
        self.check_dangerous(command)?;
        self.check_blocked(command)?;
        let suspicious = self.scan_suspicious(command);
        self.check_injection(command)?;

        tracing::info!(command = %truncate(command, 50), "command passed security validation");

        Ok(SecurityReport { suspicious })
    }

    fn check_structure(&self, command: &str) -> Result<(), SecurityViolation> {
        if command.trim().is_empty() {
            return Err(SecurityViolation::EmptyCommand);
        }

        let length = command.chars().count();
        if length > self.max_command_length {
            tracing::warn!(length, max = self.max_command_length, "command too long");
            return Err(SecurityViolation::TooLong {
                length,
                max: self.max_command_length,
            });
        }

        if !self.allow_multiline && (command.contains('\n') || command.contains('\r')) {
            tracing::warn!("multiline commands not allowed");
            return Err(SecurityViolation::MultilineNotAllowed);
        }

        // Unreachable through `sanitize`, which strips NUL
        if command.contains('\0') {
            tracing::warn!("null bytes detected in command");
            return Err(SecurityViolation::NullByte);
        }

        Ok(())
    }

    fn check_dangerous(&self, command: &str) -> Result<(), SecurityViolation> {
        if let Some(rule) = self.library.first_match(PatternCategory::Dangerous, command) {
            tracing::error!(pattern = rule.pattern(), command, "SECURITY ALERT: dangerous command pattern");
            return Err(SecurityViolation::DangerousPattern {
                pattern: rule.pattern().to_string(),
                message: rule.message.clone(),
            });
        }
        Ok(())
    }

    fn check_blocked(&self, command: &str) -> Result<(), SecurityViolation> {
        if let Some(rule) = self.blocked.iter().find(|rule| rule.is_match(command)) {
            tracing::warn!(pattern = rule.pattern(), command, "blocked command pattern");
            return Err(SecurityViolation::BlockedPattern {
                pattern: rule.pattern().to_string(),
                message: rule.message.clone(),
            });
        }
        Ok(())
    }

    fn scan_suspicious(&self, command: &str) -> Vec<String> {
        self.library
            .matches(PatternCategory::Suspicious, command)
            .map(|rule| {
                tracing::warn!(pattern = rule.pattern(), command, "suspicious pattern detected");
                rule.pattern().to_string()
            })
            .collect()
    }

    fn check_injection(&self, command: &str) -> Result<(), SecurityViolation> {
        if let Some(rule) = self.library.first_match(PatternCategory::Injection, command) {
            tracing::error!(pattern = rule.pattern(), command, "SECURITY ALERT: command injection attempt");
            return Err(SecurityViolation::InjectionAttempt {
                pattern: rule.pattern().to_string(),
                message: rule.message.clone(),
            });
        }
        Ok(())
    }

    pub fn blocked_pattern_count(&self) -> usize {
        self.blocked.len()
    }
}

impl Default for SecurityGate {
    fn default() -> Self {
        Self::new(&SecurityConfig::default())
    }
}

/// First `max` characters of a command, with an ellipsis when cut
pub(crate) fn truncate(command: &str, max: usize) -> String {
    let mut chars = command.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
