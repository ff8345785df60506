//! Generic LLM client for OpenAI-compatible endpoints.
//!
//! Epistemic foundation:
//! - K_i: OpenAI chat-completions schema is the de facto standard
//! - K_i: Gemini, OpenRouter and on-prem servers (vLLM, Ollama) all speak it
//! - B_i: API will respond within timeout (might fail)
//! - B_i: Response will be valid JSON (might fail)
//! - I^B: Network availability unknowable → retry with backoff

use crate::models::{ModelSpec, OracleError, Result, SheetwiseError};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
}

/// Chat completion response.
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// API error response (OpenAI-compatible).
///
/// Gemini wraps the same object in a one-element array; both forms are accepted.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiErrorResponse {
    Single { error: ApiErrorDetail },
    Wrapped(Vec<ApiErrorEnvelope>),
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl ApiErrorResponse {
    fn message(self) -> Option<String> {
        match self {
            Self::Single { error } => Some(error.message),
            Self::Wrapped(list) => list.into_iter().next().map(|e| e.error.message),
        }
    }
}

/// Response from a completion request.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,
    /// Model used (may differ from requested)
    pub model: String,
    /// Input tokens
    pub input_tokens: u32,
    /// Output tokens
    pub output_tokens: u32,
    /// Request duration
    pub duration: Duration,
}

/// LLM client for any OpenAI-compatible endpoint.
///
/// Features:
/// - Retry with exponential backoff on network errors and 5xx
/// - `retry-after` honoured on 429
/// - No retry on authentication or unknown-model errors
/// - Token usage tracking
pub struct LlmClient {
    client: reqwest::Client,
    /// API key (None for local endpoints without auth)
    api_key: Option<String>,
    /// Base URL for the API
    base_url: String,
    /// Custom headers to include in requests
    custom_headers: HashMap<String, String>,
    /// Request timeout
    timeout: Duration,
    /// Maximum attempts per request
    max_retries: u32,
    total_input_tokens: AtomicU64,
    total_output_tokens: AtomicU64,
}

impl LlmClient {
    /// Create a new LLM client.
    pub fn new(
        api_key: Option<String>,
        base_url: String,
        custom_headers: HashMap<String, String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(SheetwiseError::Network)?;

        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            custom_headers,
            timeout,
            max_retries: max_retries.max(1),
            total_input_tokens: AtomicU64::new(0),
            total_output_tokens: AtomicU64::new(0),
        })
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build headers for a request.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(value) = self
            .api_key
            .as_ref()
            .and_then(|key| HeaderValue::from_str(&format!("Bearer {key}")).ok())
        {
            headers.insert(AUTHORIZATION, value);
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (key, value) in &self.custom_headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::try_from(key.as_str()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, val);
            }
        }

        headers
    }

    /// Complete a chat request.
    ///
    /// B_i(API available) → Result
    /// B_i(valid response) → Result
    /// I^B(transient failures) → bounded retries
    pub async fn complete(
        &self,
        model: &ModelSpec,
        messages: Vec<Message>,
    ) -> Result<CompletionResponse> {
        let start = Instant::now();

        let request = ChatCompletionRequest {
            model: &model.id,
            messages,
            max_tokens: model.max_tokens,
            temperature: model.temperature,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error: Option<SheetwiseError> = None;

        for attempt in 0..self.max_retries {
            let is_last = attempt + 1 == self.max_retries;

            let response = self
                .client
                .post(&url)
                .headers(self.headers())
                .json(&request)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        SheetwiseError::Timeout(self.timeout)
                    } else {
                        SheetwiseError::Network(e)
                    });
                    if !is_last {
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        debug!(
                            attempt = attempt,
                            backoff_secs = backoff.as_secs(),
                            "Retrying after network error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = retry_after_delay(
                    response
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok()),
                    self.timeout,
                );

                last_error = Some(SheetwiseError::Oracle(OracleError::RateLimited {
                    retry_after_secs: retry_after.as_secs_f64(),
                }));

                if !is_last {
                    debug!(
                        attempt = attempt,
                        retry_after_secs = retry_after.as_secs_f64(),
                        "Rate limited, waiting"
                    );
                    tokio::time::sleep(retry_after).await;
                }
                continue;
            }

            if !response.status().is_success() {
                let error_body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                    .ok()
                    .and_then(ApiErrorResponse::message)
                    .unwrap_or(error_body);

                let error = match status {
                    401 | 403 => OracleError::AuthenticationFailed,
                    404 => OracleError::ModelNotFound(model.id.clone()),
                    _ => OracleError::ApiError { status, message },
                };
                last_error = Some(SheetwiseError::Oracle(error));

                // Client errors other than 429 will not improve on retry
                if status < 500 {
                    break;
                }

                if !is_last {
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
                continue;
            }

            let body: ChatCompletionResponse = response.json().await.map_err(|e| {
                SheetwiseError::Oracle(OracleError::InvalidResponse(format!(
                    "Failed to parse response: {e}"
                )))
            })?;

            let content = body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| {
                    SheetwiseError::Oracle(OracleError::InvalidResponse(
                        "No content in response".to_string(),
                    ))
                })?;

            let usage = body.usage.unwrap_or_default();
            self.total_input_tokens
                .fetch_add(usage.prompt_tokens as u64, Ordering::Relaxed);
            self.total_output_tokens
                .fetch_add(usage.completion_tokens as u64, Ordering::Relaxed);

            return Ok(CompletionResponse {
                content,
                model: body.model.unwrap_or_else(|| model.id.clone()),
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                duration: start.elapsed(),
            });
        }

        Err(last_error.unwrap_or_else(|| {
            SheetwiseError::Oracle(OracleError::MaxRetriesExceeded {
                attempts: self.max_retries,
                last_error: "Unknown error".to_string(),
            })
        }))
    }

    /// Complete with system and user prompts (convenience method).
    pub async fn complete_with_system(
        &self,
        model: &ModelSpec,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<CompletionResponse> {
        let messages = vec![Message::system(system_prompt), Message::user(user_prompt)];
        self.complete(model, messages).await
    }

    /// Get total tokens tracked as (input, output).
    pub fn total_tokens(&self) -> (u64, u64) {
        (
            self.total_input_tokens.load(Ordering::Relaxed),
            self.total_output_tokens.load(Ordering::Relaxed),
        )
    }

    /// Health check: ping the /models endpoint.
    ///
    /// K_i: endpoint is reachable and responding
    /// B_i: endpoint is healthy if /models returns 200
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let url = format!("{}/models", self.base_url);

        match self
            .client
            .get(&url)
            .headers(self.headers())
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                if response.status().is_success() {
                    HealthCheckResult {
                        status: HealthStatus::Healthy,
                        latency_ms: Some(latency_ms),
                        error: None,
                    }
                } else {
                    HealthCheckResult {
                        status: HealthStatus::Unhealthy,
                        latency_ms: Some(latency_ms),
                        error: Some(format!("HTTP {}", response.status().as_u16())),
                    }
                }
            }
            Err(e) => HealthCheckResult {
                status: HealthStatus::Unreachable,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Delay requested by a 429 `retry-after` header.
///
/// Unparseable, negative or non-finite values fall back to one second.
/// The delay never exceeds `cap`.
fn retry_after_delay(header: Option<&str>, cap: Duration) -> Duration {
    header
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(Duration::from_secs(1))
        .min(cap)
}

/// Health check result.
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    /// Health status
    pub status: HealthStatus,
    /// Latency in milliseconds (if reachable)
    pub latency_ms: Option<u64>,
    /// Error message (if unhealthy or unreachable)
    pub error: Option<String>,
}

/// Health status of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Endpoint is responding normally
    Healthy,
    /// Endpoint is responding but with errors
    Unhealthy,
    /// Endpoint is not reachable
    Unreachable,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unreachable => write!(f, "unreachable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_api_error_accepts_plain_and_wrapped_forms() {
        let plain: ApiErrorResponse =
            serde_json::from_str(r#"{"error": {"message": "bad key", "code": 401}}"#).unwrap();
        assert_eq!(plain.message().as_deref(), Some("bad key"));

        let wrapped: ApiErrorResponse =
            serde_json::from_str(r#"[{"error": {"message": "quota", "status": "RESOURCE_EXHAUSTED"}}]"#)
                .unwrap();
        assert_eq!(wrapped.message().as_deref(), Some("quota"));
    }

    #[test]
    fn test_headers_include_bearer_and_custom() {
        let mut custom = HashMap::new();
        custom.insert("X-Team".to_string(), "analytics".to_string());
        let client = LlmClient::new(
            Some("secret".to_string()),
            "http://localhost:11434/v1/".to_string(),
            custom,
            5,
            1,
        )
        .unwrap();

        let headers = client.headers();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer secret");
        assert_eq!(headers.get("x-team").unwrap(), "analytics");
        assert_eq!(client.base_url(), "http://localhost:11434/v1");
    }

    #[test]
    fn test_retry_after_delay_rejects_malformed_values() {
        let cap = Duration::from_secs(30);
        assert_eq!(retry_after_delay(Some("2"), cap), Duration::from_secs(2));
        assert_eq!(retry_after_delay(Some(" 0.5 "), cap), Duration::from_millis(500));
        assert_eq!(retry_after_delay(Some("-1"), cap), Duration::from_secs(1));
        assert_eq!(retry_after_delay(Some("NaN"), cap), Duration::from_secs(1));
        assert_eq!(retry_after_delay(Some("inf"), cap), Duration::from_secs(1));
        assert_eq!(retry_after_delay(Some("soon"), cap), Duration::from_secs(1));
        assert_eq!(retry_after_delay(None, cap), Duration::from_secs(1));
        assert_eq!(retry_after_delay(Some("1e30"), cap), cap);
    }

    /// Serve `429` with the given `retry-after` to every request.
    async fn serve_rate_limited(retry_after: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);

                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                while !request_complete(&request) {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let response = format!(
                    "HTTP/1.1 429 Too Many Requests\r\nretry-after: {retry_after}\r\n\
                     content-length: 0\r\nconnection: close\r\n\r\n"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}/v1"), hits)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(end) = text.find("\r\n\r\n") else {
            return false;
        };
        let length = text[..end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= end + 4 + length
    }

    #[tokio::test]
    async fn test_negative_retry_after_surfaces_rate_limit_error() {
        let (base_url, hits) = serve_rate_limited("-1").await;
        let client = LlmClient::new(None, base_url, HashMap::new(), 5, 2).unwrap();

        let err = client
            .complete_with_system(&ModelSpec::default(), "system", "How many rows?")
            .await
            .unwrap_err();

        match err {
            SheetwiseError::Oracle(OracleError::RateLimited { retry_after_secs }) => {
                assert_eq!(retry_after_secs, 1.0)
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_headers_without_key_skip_authorization() {
        let client =
            LlmClient::new(None, "http://localhost/v1".to_string(), HashMap::new(), 5, 1).unwrap();
        assert!(client.headers().get(AUTHORIZATION).is_none());
    }
}
