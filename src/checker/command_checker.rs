use crate::audit::AuditLogger;
use crate::checker::verdict::{Action, DecidingStage, Verdict};
use crate::config::{expand_path, Config};
use crate::error::AppResult;
use crate::oracle::{AiOracle, CommandContext, PromptTemplate};
use crate::rules::{RuleEngine, RuleOutcome};
use crate::security::{sanitize, SecurityGate, SecurityViolation};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

pub const EMPTY_COMMAND_REASON: &str = "Empty command";
pub const SECURITY_FAILURE_REASON: &str = "Security check failed";

/// Runs a command through sanitization, the security gate, the rule table
/// and finally the oracle, stopping at the first stage that decides.
///
/// Everything is immutable after construction, so one checker can be
/// shared across tasks behind an `Arc`.
pub struct CommandChecker {
    gate: SecurityGate,
    rules: RuleEngine,
    oracle: AiOracle,
    audit: Option<AuditLogger>,
}

impl CommandChecker {
    pub fn new(gate: SecurityGate, rules: RuleEngine, oracle: AiOracle) -> Self {
        Self {
            gate,
            rules,
            oracle,
            audit: None,
        }
    }

    /// Build every stage from `config`, degrading any stage that fails to load
    pub fn from_config(config: &Config) -> Self {
        let gate = SecurityGate::new(&config.security);
        let rules = RuleEngine::load_or_empty(config.rules_file().as_deref());

        let oracle = AiOracle::from_config(config).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to build oracle client - AI validation disabled");
            let prompt = PromptTemplate::load(
                config.prompt_template().as_deref(),
                config.ai_rules_file().as_deref(),
            );
            AiOracle::unavailable(prompt, &config.ai)
        });

        let audit = config.logging.audit_log.as_ref().and_then(|path| {
            AuditLogger::with_path(expand_path(path))
                .map_err(|e| tracing::warn!(error = %e, "audit log unavailable"))
                .ok()
        });

        Self {
            gate,
            rules,
            oracle,
            audit,
        }
    }

    /// Like `from_config`, but fail instead of degrading
    pub fn try_from_config(config: &Config) -> AppResult<Self> {
        config.validate()?;

        let gate = SecurityGate::new(&config.security);
        let rules = match config.rules_file() {
            Some(path) if path.exists() => RuleEngine::load(&path)?,
            _ => RuleEngine::empty(),
        };
        let oracle = AiOracle::from_config(config)?;
        let audit = match &config.logging.audit_log {
            Some(path) => Some(AuditLogger::with_path(expand_path(path))?),
            None => None,
        };

        Ok(Self {
            gate,
            rules,
            oracle,
            audit,
        })
    }

    pub fn with_audit_logger(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn gate(&self) -> &SecurityGate {
        &self.gate
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub fn oracle(&self) -> &AiOracle {
        &self.oracle
    }

    /// Decide what to do with `command`. Never fails.
    pub async fn check(&self, command: &str, context: Option<&CommandContext>) -> Verdict {
        self.check_with_cancel(command, context, std::future::pending::<()>())
            .await
    }

    /// Like `check`, but an in-flight oracle call is abandoned once `cancel` resolves
    pub async fn check_with_cancel<F>(
        &self,
        command: &str,
        context: Option<&CommandContext>,
        cancel: F,
    ) -> Verdict
    where
        F: Future<Output = ()>,
    {
        let verdict = match AssertUnwindSafe(self.run(command, context, cancel))
            .catch_unwind()
            .await
        {
            Ok(verdict) => verdict,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::error!(error = %message, "command check panicked, allowing command");
                Verdict::new(
                    Action::Pass,
                    DecidingStage::Default,
                    command,
                    sanitize(command).into_string(),
                )
                .with_reason(format!("Internal error: {}", message))
            }
        };

        self.record(&verdict);
        verdict
    }

    async fn run<F>(&self, command: &str, context: Option<&CommandContext>, cancel: F) -> Verdict
    where
        F: Future<Output = ()>,
    {
        if command.trim().is_empty() {
            return Verdict::new(Action::Pass, DecidingStage::Default, command, "")
                .with_reason(EMPTY_COMMAND_REASON);
        }

        let sanitized = sanitize(command);

        match self.gate.check(&sanitized) {
            Ok(_) => {}
            Err(SecurityViolation::EmptyCommand) => {
                return Verdict::new(Action::Pass, DecidingStage::Default, command, sanitized.as_str())
                    .with_reason(EMPTY_COMMAND_REASON);
            }
            Err(violation) => {
                tracing::error!(violation = %violation, "security violation");
                if let Some(audit) = &self.audit {
                    if let Err(e) = audit.log_security_event(
                        violation.kind(),
                        sanitized.as_str(),
                        &violation.to_string(),
                    ) {
                        tracing::warn!(error = %e, "failed to write audit log");
                    }
                }

                let verdict = Verdict::new(
                    Action::error(format!("Security violation: {}", violation)),
                    DecidingStage::Security,
                    command,
                    sanitized.as_str(),
                )
                .with_reason(SECURITY_FAILURE_REASON);

                return match violation.pattern() {
                    Some(pattern) => verdict.with_rule_pattern(pattern),
                    None => verdict,
                };
            }
        }

        match self.rules.apply(&sanitized) {
            RuleOutcome::Rewrite {
                command: rewritten,
                reason,
                pattern,
            } => {
                return Verdict::new(Action::execute(rewritten), DecidingStage::Rule, command, sanitized.as_str())
                    .with_reason(reason)
                    .with_rule_pattern(pattern);
            }
            RuleOutcome::Block {
                message,
                reason,
                pattern,
            } => {
                return Verdict::new(Action::error(message), DecidingStage::Rule, command, sanitized.as_str())
                    .with_reason(reason)
                    .with_rule_pattern(pattern);
            }
            RuleOutcome::NoMatch => {}
        }

        let judgment = self
            .oracle
            .judge_until(sanitized.as_str(), context, cancel)
            .await;

        Verdict::new(judgment.action, DecidingStage::Ai, command, sanitized.as_str())
            .with_optional_reason(judgment.reason)
    }

    fn record(&self, verdict: &Verdict) {
        tracing::info!(
            action = verdict.action.as_str(),
            stage = %verdict.stage,
            reason = verdict.reason.as_deref().unwrap_or(""),
            "command checked"
        );

        if let Some(audit) = &self.audit {
            if let Err(e) = audit.log_verdict(verdict) {
                tracing::warn!(error = %e, "failed to write audit log");
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
