//! OpenAI-compatible chat-completions transport.
//!
//! Works against any endpoint speaking the `/chat/completions` protocol
//! (OpenAI, OpenRouter, MiniMax, local gateways). Handles:
//!
//! - Bearer authentication and extra default headers
//! - JSON response mode for text requests
//! - `image_url` content parts for vision requests
//! - Retry with exponential backoff on connection errors, timeouts,
//!   HTTP 429, HTTP 5xx and unparseable replies
//! - JSON-object extraction from the reply text

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::extract::extract_json_object;
use super::{InferenceRequest, InferenceTransport, TransportReply};
use crate::config::TransportConfig;
use crate::error::{AnalyzerError, IgnitionError};

/// Identifier used when attributing transport failures.
const TRANSPORT_ID: &str = "openai-compatible";

/// Chat-completions client shared by every persona.
#[derive(Debug, Clone)]
pub struct OpenAICompatibleTransport {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    /// Retries after the first attempt.
    max_retries: u32,
    /// Delay before the first retry; doubles on each subsequent retry.
    backoff_base: Duration,
    /// Request `response_format: json_object` for text-only requests.
    json_mode: bool,
    default_headers: HashMap<String, String>,
}

impl OpenAICompatibleTransport {
    /// Build a transport from configuration.
    ///
    /// Fails with a configuration error when the config does not validate,
    /// no API key is configured or the HTTP client cannot be built. No
    /// network activity happens here.
    pub fn from_config(config: &TransportConfig) -> Result<Self, IgnitionError> {
        config.validate()?;
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                IgnitionError::config(
                    "API key not set. Set IGNITION_API_KEY (or OPENAI_API_KEY) or configure api_key.",
                )
            })?;

        let timeout = Duration::try_from_secs_f64(config.timeout_secs).map_err(|e| {
            IgnitionError::config(format!("timeout_secs {} is unusable: {}", config.timeout_secs, e))
        })?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IgnitionError::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            json_mode: config.json_mode,
            default_headers: config.default_headers.clone(),
        })
    }

    /// Chat-completions endpoint URL.
    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    /// Build the request body for `request`.
    pub fn build_request_body(&self, request: &InferenceRequest) -> Value {
        let user_content = match &request.image {
            Some(image) => json!([
                { "type": "text", "text": request.prompt },
                { "type": "image_url", "image_url": { "url": image.to_content_url() } }
            ]),
            None => Value::String(request.prompt.clone()),
        };

        let mut body = json!({
            "model": request.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": user_content }
            ],
        });

        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        // Several vision endpoints reject response_format alongside images.
        if self.json_mode && request.image.is_none() {
            body["response_format"] = json!({ "type": "json_object" });
        }

        body
    }

    async fn attempt(&self, body: &Value) -> Attempt {
        let mut http = self
            .client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key));
        for (name, value) in &self.default_headers {
            http = http.header(name, value);
        }

        let response = match http.json(body).send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Retry(AnalyzerError::transport(TRANSPORT_ID, e.to_string())),
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => return Attempt::Retry(AnalyzerError::transport(TRANSPORT_ID, e.to_string())),
        };

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Attempt::Retry(AnalyzerError::transport(
                TRANSPORT_ID,
                format!("HTTP {}: {}", status, truncate(&text, 300)),
            ));
        }
        if status.is_client_error() {
            return Attempt::Fatal(AnalyzerError::transport(
                TRANSPORT_ID,
                format!("HTTP {} (not retryable): {}", status, truncate(&text, 300)),
            ));
        }

        match parse_completion_body(&text) {
            Ok(reply) => Attempt::Done(reply),
            Err(message) => Attempt::Retry(AnalyzerError::malformed(TRANSPORT_ID, message)),
        }
    }
}

enum Attempt {
    Done(TransportReply),
    Retry(AnalyzerError),
    Fatal(AnalyzerError),
}

#[async_trait]
impl InferenceTransport for OpenAICompatibleTransport {
    async fn complete_json(
        &self,
        request: &InferenceRequest,
    ) -> Result<TransportReply, AnalyzerError> {
        log::debug!(
            "chat completion: model={}, image={}, prompt_chars={}",
            request.model,
            request.image.is_some(),
            request.prompt.len()
        );

        let body = self.build_request_body(request);
        let mut last_error: Option<AnalyzerError> = None;
        let mut delay = self.backoff_base;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                log::warn!(
                    "model {} retry {}/{} after {:?}",
                    request.model,
                    attempt,
                    self.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = next_backoff(delay);
            }

            match self.attempt(&body).await {
                Attempt::Done(reply) => return Ok(reply),
                Attempt::Fatal(error) => {
                    log::error!("model {}: {}", request.model, error);
                    return Err(error);
                }
                Attempt::Retry(error) => {
                    log::warn!("model {} attempt {} failed: {}", request.model, attempt + 1, error);
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            AnalyzerError::transport(TRANSPORT_ID, "request failed after all retries")
        }))
    }
}

/// Pull the first choice's message text out of a chat-completions body and
/// extract its JSON object.
pub fn parse_completion_body(body: &str) -> Result<TransportReply, String> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| format!("response body is not JSON: {} - body: {}", e, truncate(body, 300)))?;

    if let Some(usage) = value.get("usage") {
        log::debug!(
            "token usage: prompt={}, completion={}, total={}",
            usage.get("prompt_tokens").and_then(Value::as_i64).unwrap_or(0),
            usage.get("completion_tokens").and_then(Value::as_i64).unwrap_or(0),
            usage.get("total_tokens").and_then(Value::as_i64).unwrap_or(0),
        );
    }

    let content = value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| "no message content in first choice".to_string())?;

    let object = extract_json_object(content)?;
    Ok(TransportReply {
        object,
        raw: content.to_string(),
    })
}

/// Doubled retry delay, saturating at `Duration::MAX`.
fn next_backoff(delay: Duration) -> Duration {
    delay.saturating_mul(2)
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
