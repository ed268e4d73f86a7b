use crate::checker::verdict::Action;
use crate::config::{AiConfig, Config, FailurePolicy};
use crate::oracle::client::{OracleClient, OracleError, OracleRequest};
use crate::oracle::openai::OpenAiClient;
use crate::oracle::prompt::{CommandContext, PromptTemplate};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

pub const AI_UNAVAILABLE: &str = "AI unavailable";
pub const DEFAULT_BLOCK_MESSAGE: &str = "Command blocked by AI review";

/// The oracle stage's answer for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgment {
    pub action: Action,
    pub reason: Option<String>,
}

impl Judgment {
    pub fn new(action: Action) -> Self {
        Self { action, reason: None }
    }
}

/// Validate an untrusted oracle payload
pub fn parse_judgment(raw: &str) -> Result<Judgment, OracleError> {
    let cleaned = strip_code_fence(raw);
    if cleaned.is_empty() {
        return Err(OracleError::EmptyResponse);
    }

    let value: Value = serde_json::from_str(cleaned)?;
    let object = value
        .as_object()
        .ok_or_else(|| OracleError::InvalidResponse("expected a JSON object".to_string()))?;

    let action = match object.get("action") {
        Some(Value::String(action)) => action.trim().to_uppercase(),
        Some(Value::Null) | None => {
            return Err(OracleError::InvalidResponse("missing action".to_string()));
        }
        Some(other) => return Err(OracleError::UnknownAction(other.to_string())),
    };

    let text = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let action = match action.as_str() {
        "PASS" => Action::Pass,
        "EXECUTE" => match text("command") {
            Some(command) => Action::Execute { command },
            None => {
                return Err(OracleError::InvalidResponse(
                    "EXECUTE without command".to_string(),
                ));
            }
        },
        "ERROR" => Action::Error {
            message: text("message").unwrap_or_else(|| DEFAULT_BLOCK_MESSAGE.to_string()),
        },
        _ => return Err(OracleError::UnknownAction(action)),
    };

    Ok(Judgment {
        action,
        reason: text("reason"),
    })
}

/// Strip a surrounding markdown code block (```json ... ```)
fn strip_code_fence(response: &str) -> &str {
    let mut cleaned = response.trim();

    if cleaned.starts_with("```") {
        if let Some(first_newline) = cleaned.find('\n') {
            cleaned = &cleaned[first_newline + 1..];
        } else {
            cleaned = cleaned.trim_start_matches('`');
        }
        if let Some(last_backticks) = cleaned.rfind("```") {
            cleaned = &cleaned[..last_backticks];
        }
        cleaned = cleaned.trim();
    }

    cleaned
}

/// Consults the external oracle for commands no local rule decided
pub struct AiOracle {
    client: Option<Box<dyn OracleClient>>,
    prompt: PromptTemplate,
    model: String,
    timeout: Duration,
    deadline: Duration,
    max_tokens: u32,
    policy: FailurePolicy,
}

impl AiOracle {
    pub fn new(client: Option<Box<dyn OracleClient>>, prompt: PromptTemplate, config: &AiConfig) -> Self {
        let timeout = Duration::from_secs(config.timeout_seconds);

        Self {
            client,
            prompt,
            model: config.model.clone(),
            timeout,
            deadline: overall_deadline(timeout, config.max_retries),
            max_tokens: config.max_tokens,
            policy: config.failure_policy,
        }
    }

    /// Oracle without a client; every judgment is the policy default
    pub fn unavailable(prompt: PromptTemplate, config: &AiConfig) -> Self {
        Self::new(None, prompt, config)
    }

    /// Build the HTTP-backed oracle described by `config`
    ///
    /// A missing API key is not an error: the oracle is created disabled.
    pub fn from_config(config: &Config) -> Result<Self, OracleError> {
        let prompt = PromptTemplate::load(
            config.prompt_template().as_deref(),
            config.ai_rules_file().as_deref(),
        );

        let client: Option<Box<dyn OracleClient>> = match config.get_api_key() {
            Some(api_key) => Some(Box::new(OpenAiClient::with_base_url(
                api_key,
                config.ai.base_url.clone(),
                config.ai.max_retries,
            )?)),
            None => {
                tracing::warn!("API key not found - AI validation disabled");
                None
            }
        };

        Ok(Self::new(client, prompt, &config.ai))
    }

    pub fn is_available(&self) -> bool {
        self.client.is_some()
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub async fn judge(&self, command: &str, context: Option<&CommandContext>) -> Judgment {
        self.judge_until(command, context, std::future::pending::<()>()).await
    }

    /// Judge `command`, giving up with the policy default once `cancel` resolves
    pub async fn judge_until<F>(&self, command: &str, context: Option<&CommandContext>, cancel: F) -> Judgment
    where
        F: Future<Output = ()>,
    {
        let Some(client) = &self.client else {
            tracing::warn!("OpenAI client not available, using failure policy");
            return self.fallback(AI_UNAVAILABLE);
        };

        let request = OracleRequest {
            prompt: self.prompt.render(command, context),
            model: self.model.clone(),
            timeout: self.timeout,
            max_tokens: self.max_tokens,
        };

        let call = tokio::time::timeout(self.deadline, client.complete(&request));

        let outcome = tokio::select! {
            result = call => result.unwrap_or(Err(OracleError::Timeout)),
            _ = cancel => Err(OracleError::Cancelled),
        };

        match outcome.and_then(|raw| parse_judgment(&raw)) {
            Ok(judgment) => {
                tracing::info!(action = judgment.action.as_str(), "oracle judgment");
                judgment
            }
            Err(e) => {
                tracing::warn!(error = %e, policy = ?self.policy, "oracle failed, using failure policy");
                self.fallback(&e.fallback_reason())
            }
        }
    }

    /// Policy default when no usable judgment exists
    pub fn fallback(&self, reason: &str) -> Judgment {
        let action = match self.policy {
            FailurePolicy::Open => Action::Pass,
            FailurePolicy::Closed => Action::error(format!("Command blocked: {}", reason)),
        };

        Judgment {
            action,
            reason: Some(reason.to_string()),
        }
    }
}

/// Outer bound covering every attempt plus the backoff between them
fn overall_deadline(timeout: Duration, max_retries: u32) -> Duration {
    let attempts = max_retries.saturating_add(1);
    let backoff_secs = (1u64 << max_retries.min(16)) - 1;
    timeout
        .saturating_mul(attempts)
        .saturating_add(Duration::from_secs(backoff_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct MockClient {
        response: Result<String, ()>,
        last_prompt: Mutex<Option<String>>,
    }

    impl MockClient {
        fn replying(response: &str) -> Self {
            Self {
                response: Ok(response.to_string()),
                last_prompt: Mutex::new(None),
            }
        }

        fn failing() -> Self {
            Self {
                response: Err(()),
                last_prompt: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl OracleClient for MockClient {
        async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
            *self.last_prompt.lock().unwrap() = Some(request.prompt.clone());
            self.response
                .clone()
                .map_err(|_| OracleError::ApiError("boom".to_string()))
        }
    }

    struct SlowClient;

    #[async_trait]
    impl OracleClient for SlowClient {
        async fn complete(&self, _request: &OracleRequest) -> Result<String, OracleError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(r#"{"action":"PASS"}"#.to_string())
        }
    }

    fn oracle_with(client: impl OracleClient + 'static, policy: FailurePolicy) -> AiOracle {
        let config = AiConfig {
            failure_policy: policy,
            ..AiConfig::default()
        };
        AiOracle::new(Some(Box::new(client)), PromptTemplate::default(), &config)
    }

    #[test]
    fn test_parse_pass() {
        let judgment = parse_judgment(r#"{"action":"PASS"}"#).unwrap();
        assert_eq!(judgment.action, Action::Pass);
        assert_eq!(judgment.reason, None);
    }

    #[test]
    fn test_parse_lowercase_action() {
        let judgment = parse_judgment(r#"{"action":"execute","command":"ls -la"}"#).unwrap();
        assert_eq!(judgment.action, Action::execute("ls -la"));
    }

    #[test]
    fn test_parse_error_default_message() {
        let judgment = parse_judgment(r#"{"action":"ERROR"}"#).unwrap();
        assert_eq!(judgment.action, Action::error(DEFAULT_BLOCK_MESSAGE));
    }

    #[test]
    fn test_parse_keeps_reason() {
        let judgment =
            parse_judgment(r#"{"action":"ERROR","message":"no","reason":"wipes disk"}"#).unwrap();
        assert_eq!(judgment.action, Action::error("no"));
        assert_eq!(judgment.reason.as_deref(), Some("wipes disk"));
    }

    #[test]
    fn test_parse_code_fence() {
        let judgment = parse_judgment("```json\n{\"action\": \"PASS\"}\n```").unwrap();
        assert_eq!(judgment.action, Action::Pass);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(parse_judgment(""), Err(OracleError::EmptyResponse)));
        assert!(matches!(parse_judgment("```\n```"), Err(OracleError::EmptyResponse)));
        assert!(matches!(parse_judgment("not json"), Err(OracleError::JsonError(_))));
        assert!(matches!(parse_judgment("[1,2]"), Err(OracleError::InvalidResponse(_))));
        assert!(matches!(parse_judgment("{}"), Err(OracleError::InvalidResponse(_))));
        assert!(matches!(
            parse_judgment(r#"{"action":null}"#),
            Err(OracleError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_judgment(r#"{"action":"ALLOW"}"#),
            Err(OracleError::UnknownAction(_))
        ));
        assert!(matches!(
            parse_judgment(r#"{"action":"EXECUTE","command":"  "}"#),
            Err(OracleError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_judge_without_client() {
        let oracle = AiOracle::unavailable(PromptTemplate::default(), &AiConfig::default());
        assert!(!oracle.is_available());

        let judgment = oracle.judge("ls", None).await;
        assert_eq!(judgment.action, Action::Pass);
        assert_eq!(judgment.reason.as_deref(), Some(AI_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_judge_without_client_closed() {
        let config = AiConfig {
            failure_policy: FailurePolicy::Closed,
            ..AiConfig::default()
        };
        let oracle = AiOracle::unavailable(PromptTemplate::default(), &config);

        let judgment = oracle.judge("ls", None).await;
        assert_eq!(judgment.action, Action::error("Command blocked: AI unavailable"));
    }

    #[tokio::test]
    async fn test_judge_prompt_reaches_client() {
        let client = std::sync::Arc::new(MockClient::replying(r#"{"action":"PASS"}"#));

        struct Shared(std::sync::Arc<MockClient>);

        #[async_trait]
        impl OracleClient for Shared {
            async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
                self.0.complete(request).await
            }
        }

        let oracle = AiOracle::new(
            Some(Box::new(Shared(client.clone()))),
            PromptTemplate::new(Some("judge {{COMMAND}}".to_string()), None),
            &AiConfig::default(),
        );
        oracle.judge("ls /tmp", None).await;

        assert_eq!(
            client.last_prompt.lock().unwrap().as_deref(),
            Some("judge ls /tmp")
        );
    }

    #[tokio::test]
    async fn test_judge_fails_open_on_error() {
        let oracle = oracle_with(MockClient::failing(), FailurePolicy::Open);
        let judgment = oracle.judge("ls", None).await;
        assert_eq!(judgment.action, Action::Pass);
        assert!(judgment.reason.unwrap().starts_with("AI error"));
    }

    #[tokio::test]
    async fn test_judge_fails_closed_on_garbage() {
        let oracle = oracle_with(MockClient::replying("sure, looks fine"), FailurePolicy::Closed);
        let judgment = oracle.judge("ls", None).await;
        assert_eq!(
            judgment.action,
            Action::error("Command blocked: Invalid AI JSON response")
        );
    }

    #[tokio::test]
    async fn test_judge_until_cancelled() {
        let oracle = oracle_with(SlowClient, FailurePolicy::Open);
        let judgment = oracle
            .judge_until("ls", None, tokio::time::sleep(Duration::from_millis(20)))
            .await;
        assert_eq!(judgment.action, Action::Pass);
        assert_eq!(judgment.reason.as_deref(), Some("AI request cancelled"));
    }

    #[tokio::test]
    async fn test_judge_times_out() {
        let config = AiConfig {
            timeout_seconds: 1,
            ..AiConfig::default()
        };
        let oracle = AiOracle::new(Some(Box::new(SlowClient)), PromptTemplate::default(), &config);

        let judgment = oracle.judge("ls", None).await;
        assert_eq!(judgment.action, Action::Pass);
        assert_eq!(judgment.reason.as_deref(), Some("AI request timed out"));
    }

    #[test]
    fn test_overall_deadline() {
        let timeout = Duration::from_secs(30);
        assert_eq!(overall_deadline(timeout, 0), Duration::from_secs(30));
        assert_eq!(overall_deadline(timeout, 2), Duration::from_secs(93));
    }
}
