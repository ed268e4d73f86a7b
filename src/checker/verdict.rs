use serde::Serialize;
use std::fmt;

/// What the caller should do with the command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run the command unchanged
    Pass,
    /// Run this command instead
    Execute { command: String },
    /// Do not run the command
    Error { message: String },
}

impl Action {
    pub fn execute(command: impl Into<String>) -> Self {
        Action::Execute {
            command: command.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Action::Error {
            message: message.into(),
        }
    }

    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Pass => "PASS",
            Action::Execute { .. } => "EXECUTE",
            Action::Error { .. } => "ERROR",
        }
    }
}

/// Pipeline stage that produced the verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DecidingStage {
    Security,
    Rule,
    Ai,
    Default,
}

impl DecidingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecidingStage::Security => "security",
            DecidingStage::Rule => "rule",
            DecidingStage::Ai => "ai",
            DecidingStage::Default => "default",
        }
    }
}

impl fmt::Display for DecidingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pipeline's decision plus provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub action: Action,
    pub stage: DecidingStage,
    pub reason: Option<String>,
    pub rule_pattern: Option<String>,
    pub original_command: String,
    pub sanitized_command: String,
}

impl Verdict {
    pub fn new(
        action: Action,
        stage: DecidingStage,
        original_command: impl Into<String>,
        sanitized_command: impl Into<String>,
    ) -> Self {
        Self {
            action,
            stage,
            reason: None,
            rule_pattern: None,
            original_command: original_command.into(),
            sanitized_command: sanitized_command.into(),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_optional_reason(mut self, reason: Option<String>) -> Self {
        self.reason = reason;
        self
    }

    pub fn with_rule_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.rule_pattern = Some(pattern.into());
        self
    }

    pub fn is_pass(&self) -> bool {
        matches!(self.action, Action::Pass)
    }

    pub fn is_execute(&self) -> bool {
        matches!(self.action, Action::Execute { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self.action, Action::Error { .. })
    }

    /// Replacement command for `Execute` verdicts
    pub fn command(&self) -> Option<&str> {
        match &self.action {
            Action::Execute { command } => Some(command),
            _ => None,
        }
    }

    /// Block message for `Error` verdicts
    pub fn message(&self) -> Option<&str> {
        match &self.action {
            Action::Error { message } => Some(message),
            _ => None,
        }
    }

    /// Single-line form read by shell hooks: `PASS`, `EXECUTE: <cmd>` or `ERROR: <msg>`
    pub fn shell_line(&self) -> String {
        match &self.action {
            Action::Pass => "PASS".to_string(),
            Action::Execute { command } => format!("EXECUTE: {}", command),
            Action::Error { message } => format!("ERROR: {}", message),
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"action":"PASS"}"#.to_string())
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.shell_line())
    }
}

#[derive(Serialize)]
struct VerdictJson<'a> {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analysis_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_pattern: Option<&'a str>,
    deciding_stage: DecidingStage,
    original_command: &'a str,
    sanitized_command: &'a str,
}

impl Serialize for Verdict {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        VerdictJson {
            action: self.action.as_str(),
            command: self.command(),
            message: self.message(),
            reason: self.reason.as_deref(),
            analysis_type: (self.stage == DecidingStage::Ai).then_some("ai"),
            rule_pattern: self.rule_pattern.as_deref(),
            deciding_stage: self.stage,
            original_command: &self.original_command,
            sanitized_command: &self.sanitized_command,
        }
        .serialize(serializer)
    }
}
