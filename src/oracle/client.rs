use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while consulting the oracle
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded, retry after {0}s")]
    RateLimitExceeded(u64),

    #[error("Request timeout")]
    Timeout,

    #[error("Request cancelled")]
    Cancelled,

    #[error("Empty response")]
    EmptyResponse,

    #[error("Invalid API response: {0}")]
    InvalidResponse(String),

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl OracleError {
    /// Map a transport error, keeping timeouts distinguishable
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Timeout
        } else {
            OracleError::NetworkError(err)
        }
    }

    /// Diagnostic reason attached to the fallback verdict
    pub fn fallback_reason(&self) -> String {
        match self {
            OracleError::Timeout => "AI request timed out".to_string(),
            OracleError::Cancelled => "AI request cancelled".to_string(),
            OracleError::EmptyResponse => "Empty AI response".to_string(),
            OracleError::JsonError(_) => "Invalid AI JSON response".to_string(),
            OracleError::UnknownAction(action) => format!("Invalid AI action: {}", action),
            OracleError::InvalidResponse(detail) => format!("Invalid AI response: {}", detail),
            other => format!("AI error: {}", other),
        }
    }
}

/// A single judgment request
#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub prompt: String,
    pub model: String,
    pub timeout: Duration,
    pub max_tokens: u32,
}

/// Trait for services that judge a command from a rendered prompt
///
/// Implementations return the raw response text; validating it is the
/// adapter's job, since the payload is untrusted.
#[async_trait]
pub trait OracleClient: Send + Sync {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError>;
}
