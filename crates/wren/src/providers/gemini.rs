use std::time::Duration;

use anyhow::Result;
use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::time::timeout;

use super::base::{EventStream, Provider};
use super::configs::GeminiProviderConfig;
use crate::errors::{RelayError, RelayResult};
use crate::models::message::{ChatMessage, ChatResponse, StreamEvent};
use crate::models::role::Role;

pub const GEMINI_HOST: &str = "https://generativelanguage.googleapis.com";
pub const GEMINI_MODEL: &str = "gemini-2.0-flash";

const DEFAULT_TEMPERATURE: f32 = 0.7;
const DEFAULT_MAX_OUTPUT_TOKENS: i32 = 2048;
const TOP_P: f32 = 0.8;
const TOP_K: i32 = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 30;

pub struct GeminiProvider {
    client: Client,
    config: GeminiProviderConfig,
}

impl GeminiProvider {
    pub fn new(config: GeminiProviderConfig) -> Result<Self> {
        // No client-wide timeout: it would also cap the total read time of a
        // streaming call. The non-streaming path sets a per-request timeout,
        // the streaming path enforces a per-chunk idle timeout.
        let client = Client::builder().build()?;

        Ok(Self { client, config })
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    fn idle_timeout(&self) -> Duration {
        Duration::from_secs(
            self.config
                .stream_idle_timeout
                .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS),
        )
    }

    fn request_url(&self, method: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}",
            self.config.host.trim_end_matches('/'),
            self.config.model,
            method
        )
    }

    /// Convert the conversation to Gemini's `contents` array. Gemini only
    /// understands the roles `user` and `model`; system entries ride along
    /// as `model` turns.
    fn contents_spec(history: &[ChatMessage], message: &str) -> Vec<Value> {
        let mut contents = Vec::new();

        for entry in history {
            let role = match entry.role {
                Role::User => "user",
                Role::Assistant | Role::System => "model",
            };
            contents.push(json!({
                "role": role,
                "parts": [{"text": entry.content}]
            }));
        }

        contents.push(json!({
            "role": "user",
            "parts": [{"text": message}]
        }));

        contents
    }

    fn build_payload(&self, history: &[ChatMessage], message: &str, thinking_mode: bool) -> Value {
        let mut generation_config = json!({
            "temperature": self.config.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            "maxOutputTokens": self.config.max_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            "topP": TOP_P,
            "topK": TOP_K,
        });

        if thinking_mode {
            generation_config
                .as_object_mut()
                .unwrap()
                .insert("thinkingConfig".to_string(), json!({"includeThoughts": true}));
        }

        json!({
            "contents": Self::contents_spec(history, message),
            "generationConfig": generation_config,
        })
    }

    async fn post(&self, url: &str, payload: &Value) -> RelayResult<Value> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.config.api_key)
            .timeout(self.request_timeout())
            .json(payload)
            .send()
            .await
            .map_err(|e| RelayError::UpstreamUnavailable(e.to_string()))?;

        match response.status() {
            StatusCode::OK => response
                .json()
                .await
                .map_err(|e| RelayError::UpstreamMalformedResponse(e.to_string())),
            status => Err(Self::error_for_status(status, response).await),
        }
    }

    async fn error_for_status(status: StatusCode, response: reqwest::Response) -> RelayError {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RelayError::UpstreamAuthError(body),
            StatusCode::TOO_MANY_REQUESTS => RelayError::UpstreamQuotaExceeded {
                message: body,
                retry_after,
            },
            _ => RelayError::UpstreamUnavailable(format!("{}: {}", status, body)),
        }
    }

    fn parse_response(data: &Value, thinking_mode: bool) -> RelayResult<ChatResponse> {
        let parts = candidate_parts(data).ok_or_else(|| {
            RelayError::UpstreamMalformedResponse("no candidate content in response".to_string())
        })?;

        let (content, thoughts) = split_parts(parts);
        if content.is_empty() {
            return Err(RelayError::UpstreamMalformedResponse(
                "model returned an empty answer".to_string(),
            ));
        }

        let mut response = ChatResponse::new(content);
        if thinking_mode && !thoughts.is_empty() {
            response = response.with_thoughts(thoughts);
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    async fn complete(
        &self,
        history: &[ChatMessage],
        message: &str,
        thinking_mode: bool,
    ) -> RelayResult<ChatResponse> {
        let payload = self.build_payload(history, message, thinking_mode);
        let url = self.request_url("generateContent");

        let data = self.post(&url, &payload).await?;
        Self::parse_response(&data, thinking_mode)
    }

    async fn complete_stream(
        &self,
        history: &[ChatMessage],
        message: &str,
        thinking_mode: bool,
    ) -> RelayResult<EventStream> {
        let payload = self.build_payload(history, message, thinking_mode);
        let url = self.request_url("streamGenerateContent?alt=sse");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| RelayError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Self::error_for_status(status, response).await);
        }

        let idle_timeout = self.idle_timeout();
        let mut events = Box::pin(response.bytes_stream().eventsource());

        let stream = try_stream! {
            loop {
                let chunk = match timeout(idle_timeout, events.next()).await {
                    Err(_) => Err(RelayError::UpstreamStreamInterrupted(format!(
                        "no data from upstream for {}s",
                        idle_timeout.as_secs()
                    )))?,
                    Ok(None) => Err(RelayError::UpstreamStreamInterrupted(
                        "upstream closed the stream before completion".to_string(),
                    ))?,
                    Ok(Some(Err(e))) => {
                        Err(RelayError::UpstreamStreamInterrupted(e.to_string()))?
                    }
                    Ok(Some(Ok(event))) => event,
                };

                if chunk.data.trim().is_empty() {
                    continue;
                }

                let data: Value = serde_json::from_str(&chunk.data).map_err(|e| {
                    RelayError::UpstreamMalformedResponse(format!(
                        "unparseable stream chunk: {}",
                        e
                    ))
                })?;

                let finished = finish_reason(&data).is_some();
                let (content, mut thoughts) = match candidate_parts(&data) {
                    Some(parts) => split_parts(parts),
                    None => (String::new(), String::new()),
                };
                if !thinking_mode {
                    thoughts.clear();
                }

                if !content.is_empty() || !thoughts.is_empty() {
                    let mut event = StreamEvent::text(content);
                    if !thoughts.is_empty() {
                        event = event.with_thoughts(thoughts);
                    }
                    if finished {
                        event = event.finishing();
                    }
                    yield event;
                } else if finished {
                    yield StreamEvent::done();
                }

                if finished {
                    break;
                }
            }
        };

        Ok(stream.boxed())
    }
}

fn candidate_parts(data: &Value) -> Option<&Vec<Value>> {
    data.get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()
}

fn finish_reason(data: &Value) -> Option<&str> {
    data.get("candidates")?
        .as_array()?
        .first()?
        .get("finishReason")?
        .as_str()
}

/// Partition candidate parts into the answer channel and the reasoning
/// channel. Parts flagged `thought` carry intermediate reasoning.
fn split_parts(parts: &[Value]) -> (String, String) {
    let mut content = String::new();
    let mut thoughts = String::new();

    for part in parts {
        if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
            if part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false) {
                thoughts.push_str(text);
            } else {
                content.push_str(text);
            }
        }
    }

    (content, thoughts)
}
