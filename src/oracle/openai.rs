use crate::oracle::client::{OracleClient, OracleError, OracleRequest};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    response_format: ResponseFormat,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible chat completion endpoints
pub struct OpenAiClient {
    api_key: String,
    base_url: String,
    max_retries: u32,
    http_client: Client,
}

impl OpenAiClient {
    /// `max_retries` extra attempts are made on 429 and 5xx responses only
    pub fn with_base_url(api_key: String, base_url: String, max_retries: u32) -> Result<Self, OracleError> {
        let http_client = Client::builder().build()?;

        Ok(Self {
            api_key,
            base_url,
            max_retries,
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body<'a>(request: &'a OracleRequest) -> ChatRequest<'a> {
        ChatRequest {
            model: &request.model,
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            response_format: ResponseFormat {
                kind: "json_object",
            },
            max_tokens: request.max_tokens,
        }
    }

    /// Pull the first choice's text out of a completion response
    fn extract_content(response: ChatResponse) -> Result<String, OracleError> {
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        if content.trim().is_empty() {
            return Err(OracleError::EmptyResponse);
        }

        Ok(content)
    }

    fn is_retryable(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }
}

#[async_trait]
impl OracleClient for OpenAiClient {
    async fn complete(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let body = Self::request_body(request);
        let endpoint = self.endpoint();

        let mut attempt = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            attempt += 1;

            let response = self
                .http_client
                .post(&endpoint)
                .bearer_auth(&self.api_key)
                .timeout(request.timeout)
                .json(&body)
                .send()
                .await
                .map_err(OracleError::from_transport)?;

            let status = response.status();

            if status.is_success() {
                let completion: ChatResponse = response
                    .json()
                    .await
                    .map_err(OracleError::from_transport)?;
                return Self::extract_content(completion);
            }

            if Self::is_retryable(status) && attempt <= self.max_retries {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());

                let wait_ms = retry_after
                    .map(|secs| secs.saturating_mul(1000))
                    .unwrap_or(0)
                    .max(backoff_ms);
                tracing::warn!(
                    status = status.as_u16(),
                    wait_ms,
                    attempt,
                    max_retries = self.max_retries,
                    "oracle request failed, retrying"
                );

                tokio::time::sleep(Duration::from_millis(wait_ms)).await;
                backoff_ms = backoff_ms.saturating_mul(2);
                continue;
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(OracleError::RateLimitExceeded(retry_after));
            }

            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(OracleError::ApiError(format!(
                "API returned status {}: {}",
                status, error_text
            )));
        }
    }
}
