#![allow(dead_code)]

use async_trait::async_trait;
use command_auditor::config::AiConfig;
use command_auditor::oracle::{AiOracle, OracleClient, OracleError, OracleRequest, PromptTemplate};
use command_auditor::rules::{RuleDefinition, RuleEngine};
use command_auditor::{CommandChecker, FailurePolicy, SecurityGate};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Counts how often the oracle was consulted
#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Replies with a fixed payload
pub struct MockOracle {
    response: String,
    calls: CallCounter,
}

impl MockOracle {
    pub fn new(response: &str) -> (Self, CallCounter) {
        let calls = CallCounter::default();
        (
            Self {
                response: response.to_string(),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl OracleClient for MockOracle {
    async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
        self.calls.bump();
        Ok(self.response.clone())
    }
}

/// Always fails at the transport level
pub struct FailingOracle;

#[async_trait]
impl OracleClient for FailingOracle {
    async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
        Err(OracleError::ApiError("API returned status 500: upstream down".to_string()))
    }
}

/// Panics mid-call
pub struct PanickingOracle;

#[async_trait]
impl OracleClient for PanickingOracle {
    async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
        panic!("oracle client exploded");
    }
}

/// Never answers within a test's patience
pub struct SlowOracle;

#[async_trait]
impl OracleClient for SlowOracle {
    async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
        tokio::time::sleep(Duration::from_secs(120)).await;
        Ok(r#"{"action":"PASS"}"#.to_string())
    }
}

pub fn ai_config(policy: FailurePolicy) -> AiConfig {
    AiConfig {
        failure_policy: policy,
        ..AiConfig::default()
    }
}

/// Checker with default security settings, the given rules and oracle client
pub fn checker_with(
    rules: &[RuleDefinition],
    client: Option<Box<dyn OracleClient>>,
    policy: FailurePolicy,
) -> CommandChecker {
    CommandChecker::new(
        SecurityGate::default(),
        RuleEngine::from_definitions(rules),
        AiOracle::new(client, PromptTemplate::default(), &ai_config(policy)),
    )
}

/// Checker backed by a mock oracle returning `response`
pub fn checker_with_mock(rules: &[RuleDefinition], response: &str) -> (CommandChecker, CallCounter) {
    let (oracle, calls) = MockOracle::new(response);
    (
        checker_with(rules, Some(Box::new(oracle)), FailurePolicy::Open),
        calls,
    )
}

/// Write a rules file into a fresh temp directory
pub fn write_rules_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("rules.toml");
    fs::write(&path, contents).unwrap();
    (temp_dir, path)
}
