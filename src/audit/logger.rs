use crate::checker::verdict::Verdict;
use crate::security::gate::truncate;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024; // 10MB
const SECURITY_COMMAND_PREVIEW: usize = 100;
const VERDICT_COMMAND_PREVIEW: usize = 200;

pub struct AuditLogger {
    log_path: PathBuf,
}

impl AuditLogger {
    /// Create an AuditLogger with a custom log path
    pub fn with_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let log_path = path.as_ref().to_path_buf();

        // Ensure directory exists
        if let Some(parent) = log_path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self { log_path })
    }

    /// Record the outcome of one check
    ///
    /// Commands are cut to a fixed preview; messages and reasons are ours
    /// and stay whole.
    pub fn log_verdict(&self, verdict: &Verdict) -> std::io::Result<()> {
        let mut entry = format!(
            "{} [STAGE:{}] [{}] command=\"{}\"",
            Self::prefix(),
            verdict.stage,
            verdict.action.as_str(),
            escape(&truncate(&verdict.original_command, VERDICT_COMMAND_PREVIEW))
        );

        if let Some(command) = verdict.command() {
            entry.push_str(&format!(" rewritten=\"{}\"", escape(&truncate(command, VERDICT_COMMAND_PREVIEW))));
        }
        if let Some(message) = verdict.message() {
            entry.push_str(&format!(" message=\"{}\"", escape(message)));
        }
        if let Some(reason) = &verdict.reason {
            entry.push_str(&format!(" reason=\"{}\"", escape(reason)));
        }
        entry.push('\n');

        self.append(&entry)
    }

    /// Log a security event for forensics
    ///
    /// Only a prefix of the command is kept so oversized input cannot
    /// bloat the log.
    pub fn log_security_event(
        &self,
        event_type: &str,
        command: &str,
        details: &str,
    ) -> std::io::Result<()> {
        let entry = format!(
            "{} [SECURITY-{}] command=\"{}\" details=\"{}\"\n",
            Self::prefix(),
            event_type,
            escape(&truncate(command, SECURITY_COMMAND_PREVIEW)),
            escape(details)
        );

        self.append(&entry)
    }

    fn prefix() -> String {
        let timestamp = Utc::now().to_rfc3339();
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
        format!("[{}] [{}]", timestamp, user)
    }

    fn append(&self, entry: &str) -> std::io::Result<()> {
        // Check and rotate log if needed
        self.rotate_if_needed()?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;

        file.write_all(entry.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Rotate log file if it exceeds MAX_LOG_SIZE
    fn rotate_if_needed(&self) -> std::io::Result<()> {
        if !self.log_path.exists() {
            return Ok(());
        }

        let metadata = fs::metadata(&self.log_path)?;
        if metadata.len() > MAX_LOG_SIZE {
            // Rotate: audit.log -> audit.log.1
            let backup_path = self.log_path.with_extension("log.1");
            fs::rename(&self.log_path, backup_path)?;
        }

        Ok(())
    }

    /// Get the path to the log file
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }
}

/// Keep each entry on one line
fn escape(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}
