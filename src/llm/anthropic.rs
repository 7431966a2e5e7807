//! Anthropic Messages API provider

use super::sse::parse_sse_lines;
use super::types::{LlmMessage, LlmRequest, LlmResponse, MessageRole, TextStream, Usage};
use super::{LlmConfig, LlmError, LlmService};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Anthropic service implementation
pub struct AnthropicService {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    model_id: String,
    max_tokens: u32,
}

impl AnthropicService {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let base_url = match config.gateway.as_deref() {
            Some(gw) => format!("{}/v1/messages", gw.trim_end_matches('/')),
            None => API_URL.to_string(),
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::unclassified(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.anthropic_api_key.clone(),
            base_url,
            model_id: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn translate_request(&self, request: &LlmRequest, stream: bool) -> AnthropicRequest {
        AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            system: if request.system.is_empty() {
                None
            } else {
                Some(request.system.clone())
            },
            messages: merge_turns(&request.messages),
            stream,
        }
    }

    async fn post(&self, body: &AnthropicRequest) -> Result<reqwest::Response, LlmError> {
        let api_key = match &self.api_key {
            Some(key) => key.as_str(),
            // Gateways authenticate on our behalf
            None if self.base_url != API_URL => "implicit",
            None => {
                return Err(LlmError::credentials(
                    "No API key configured. Set ANTHROPIC_API_KEY.",
                ))
            }
        };

        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(classify_error(status, &text));
        }
        Ok(response)
    }
}

/// Collapse consecutive same-role turns and drop leading assistant turns; the
/// Messages API expects alternating roles starting with the user.
fn merge_turns(messages: &[LlmMessage]) -> Vec<AnthropicMessage> {
    let mut merged: Vec<AnthropicMessage> = Vec::with_capacity(messages.len());
    for message in messages {
        if message.text.trim().is_empty() {
            continue;
        }
        let role = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };
        if merged.is_empty() && role == "assistant" {
            continue;
        }
        match merged.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&message.text);
            }
            _ => merged.push(AnthropicMessage {
                role: role.to_string(),
                content: message.text.clone(),
            }),
        }
    }
    merged
}

fn classify_transport_error(e: &reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::unreachable(format!("Request timeout: {e}"))
    } else if e.is_connect() {
        LlmError::unreachable(format!("Connection failed: {e}"))
    } else {
        LlmError::unclassified(format!("Request failed: {e}"))
    }
}

fn classify_error(status: reqwest::StatusCode, body: &str) -> LlmError {
    let message = serde_json::from_str::<AnthropicErrorBody>(body)
        .map_or_else(|_| body.to_string(), |parsed| parsed.error.message);
    let err = LlmError::from_status(status.as_u16(), &message);
    match serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error")?.get("retry_after")?.as_f64())
    {
        Some(secs) if status == reqwest::StatusCode::TOO_MANY_REQUESTS => {
            err.with_retry_after(Duration::from_secs_f64(secs))
        }
        _ => err,
    }
}

/// Map one SSE payload to a text fragment, a terminal error, or nothing
fn fragment_from_event(line: &str) -> Option<Result<String, LlmError>> {
    let event: AnthropicStreamEvent = match serde_json::from_str(line) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(line = %line, error = %e, "Failed to parse stream event");
            return None;
        }
    };

    match event {
        AnthropicStreamEvent::ContentBlockDelta {
            delta: AnthropicDelta::TextDelta { text },
        } if !text.is_empty() => Some(Ok(text)),
        AnthropicStreamEvent::Error { error } => Some(Err(match error.r#type.as_str() {
            "overloaded_error" | "api_error" => LlmError::service(error.message),
            "rate_limit_error" => LlmError::throttled(error.message),
            "authentication_error" | "permission_error" => LlmError::credentials(error.message),
            "invalid_request_error" => LlmError::rejected(error.message),
            _ => LlmError::unclassified(error.message),
        })),
        _ => None,
    }
}

#[async_trait]
impl LlmService for AnthropicService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = self.translate_request(request, false);
        let response = self.post(&body).await?;
        let text = response
            .text()
            .await
            .map_err(|e| LlmError::unreachable(format!("Failed to read response: {e}")))?;

        let parsed: AnthropicResponse = serde_json::from_str(&text).map_err(|e| {
            LlmError::unclassified(format!("Failed to parse response: {e} - body: {text}"))
        })?;

        let text = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text),
                AnthropicContentBlock::Other => None,
            })
            .collect::<String>();

        Ok(LlmResponse {
            text,
            usage: Usage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
        })
    }

    async fn stream(
        &self,
        request: &LlmRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, LlmError> {
        let body = self.translate_request(request, true);
        let response = self.post(&body).await?;

        let fragments = parse_sse_lines(response.bytes_stream())
            .filter_map(|line| {
                let item = match line {
                    Ok(line) => fragment_from_event(&line),
                    Err(e) => Some(Err(classify_transport_error(&e))),
                };
                std::future::ready(item)
            })
            .take_until(cancel.cancelled_owned());

        Ok(Box::pin(fragments))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// Anthropic API types

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContentBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    ContentBlockDelta {
        delta: AnthropicDelta,
    },
    Error {
        error: AnthropicErrorDetail,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicDelta {
    TextDelta {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    r#type: String,
    message: String,
}
