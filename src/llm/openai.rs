//! `OpenAI`-compatible chat completions provider
//!
//! Talks to any gateway exposing `/chat/completions` (Cloudflare AI Gateway's
//! compat endpoint, `OpenAI` itself, local proxies). The transport policy lives
//! here: a fixed request timeout and a small bounded retry count for
//! retryable failures. Callers above this layer never retry.

use super::types::{ContentBlock, LlmMessage, LlmRequest, LlmResponse, MessageRole, Usage};
use super::{LlmError, LlmService};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// OpenAI-compatible service implementation
pub struct OpenAIService {
    client: Client,
    api_key: String,
    endpoint: String,
    max_retries: u32,
}

impl OpenAIService {
    /// Create a service for the gateway at `base_url`.
    ///
    /// `timeout` bounds each attempt; `max_retries` is the number of extra
    /// attempts made after a retryable failure.
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            max_retries,
        })
    }

    fn translate_request(request: &LlmRequest) -> OpenAIRequest {
        let mut messages = Vec::new();

        if !request.system.is_empty() {
            let system_text = request
                .system
                .iter()
                .map(|s| s.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");

            messages.push(OpenAIMessage {
                role: "system".to_string(),
                content: Some(system_text),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        for msg in &request.messages {
            // Tool results expand into one "tool" message each
            messages.extend(Self::translate_message(msg));
        }

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        r#type: "function".to_string(),
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        // tool_choice is meaningless without tools and some gateways reject it
        let tool_choice = if tools.is_some() {
            request.tool_choice.map(|c| c.as_str().to_string())
        } else {
            None
        };

        OpenAIRequest {
            model: request.model.clone(),
            messages,
            tools,
            tool_choice,
            max_tokens: request.max_tokens,
            stream: false,
        }
    }

    /// Translate an LLM message to `OpenAI` format.
    /// Returns a Vec because tool results need separate messages with role "tool".
    fn translate_message(msg: &LlmMessage) -> Vec<OpenAIMessage> {
        let role = match msg.role {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        };

        let mut text_parts = Vec::new();
        let mut tool_calls = Vec::new();
        let mut tool_results = Vec::new();

        for block in &msg.content {
            match block {
                ContentBlock::Text { text } => {
                    text_parts.push(text.clone());
                }
                ContentBlock::ToolUse { id, name, input } => {
                    tool_calls.push(OpenAIToolCall {
                        id: id.clone(),
                        r#type: "function".to_string(),
                        function: OpenAIFunctionCall {
                            name: name.clone(),
                            arguments: serde_json::to_string(input)
                                .unwrap_or_else(|_| "{}".to_string()),
                        },
                    });
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    tool_results.push((tool_use_id.clone(), content.clone(), *is_error));
                }
            }
        }

        let mut messages = Vec::new();

        if !text_parts.is_empty() || !tool_calls.is_empty() {
            let content = if text_parts.is_empty() {
                None
            } else {
                Some(text_parts.join("\n"))
            };

            let tool_calls_opt = if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            };

            messages.push(OpenAIMessage {
                role: role.to_string(),
                content,
                tool_calls: tool_calls_opt,
                tool_call_id: None,
            });
        }

        for (tool_use_id, content, is_error) in tool_results {
            if is_error {
                tracing::debug!(tool_call_id = %tool_use_id, "Sending failed tool result");
            }
            messages.push(OpenAIMessage {
                role: "tool".to_string(),
                content: Some(content),
                tool_calls: None,
                tool_call_id: Some(tool_use_id),
            });
        }

        if messages.is_empty() {
            messages.push(OpenAIMessage {
                role: role.to_string(),
                content: Some(String::new()),
                tool_calls: None,
                tool_call_id: None,
            });
        }

        messages
    }

    fn normalize_response(resp: OpenAIResponse) -> LlmResponse {
        let usage = resp.usage.map_or_else(Usage::default, |u| Usage {
            input_tokens: u64::from(u.prompt_tokens),
            output_tokens: u64::from(u.completion_tokens),
        });

        let Some(choice) = resp.choices.into_iter().next() else {
            tracing::warn!("Completion response contained no choices");
            return LlmResponse {
                content: Vec::new(),
                usage,
            };
        };

        let mut content = Vec::new();

        if let Some(text) = choice.message.content {
            if !text.is_empty() {
                content.push(ContentBlock::Text { text });
            }
        }

        if let Some(tool_calls) = choice.message.tool_calls {
            for tc in tool_calls {
                if tc.function.name.is_empty() {
                    continue;
                }

                // Unparseable arguments surface as Null; the tool fan-out
                // records that call as failed instead of guessing.
                let input = if tc.function.arguments.trim().is_empty() {
                    serde_json::json!({})
                } else {
                    serde_json::from_str(&tc.function.arguments).unwrap_or_else(|e| {
                        tracing::warn!(
                            error = %e,
                            tool = %tc.function.name,
                            "Failed to parse tool call arguments"
                        );
                        serde_json::Value::Null
                    })
                };

                content.push(ContentBlock::ToolUse {
                    id: tc.id,
                    name: tc.function.name,
                    input,
                });
            }
        }

        if choice.finish_reason.as_deref() == Some("length") {
            tracing::warn!("Completion stopped at the max_tokens limit");
        }

        LlmResponse { content, usage }
    }

    /// One attempt against the chat/completions endpoint
    async fn send_once(&self, body: &OpenAIRequest) -> Result<LlmResponse, LlmError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::timeout(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::timeout(format!("Timed out reading response: {e}"))
            } else {
                LlmError::network(format!("Failed to read response: {e}"))
            }
        })?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or_else(|_| body.clone(), |r| r.error.message);
            let mut err = LlmError::from_status(status.as_u16(), &message);
            if let Some(delay) = retry_after {
                err = err.with_retry_after(delay);
            }
            return Err(err);
        }

        let openai_response: OpenAIResponse = serde_json::from_str(&body).map_err(|e| {
            LlmError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })?;

        Ok(Self::normalize_response(openai_response))
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = Self::translate_request(request);
        let mut attempt = 0;

        loop {
            match self.send_once(&body).await {
                Ok(response) => return Ok(response),
                Err(e) if e.kind.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = e.retry_after.unwrap_or_else(|| retry_delay(attempt)).min(MAX_BACKOFF);
                    tracing::warn!(
                        model = %request.model,
                        attempt,
                        delay_ms = %delay.as_millis(),
                        error = %e.message,
                        "Retrying completion request"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn retry_delay(attempt: u32) -> Duration {
    // Exponential backoff: 500ms, 1s, 2s, ...
    Duration::from_millis(500 << attempt.saturating_sub(1).min(4))
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: String,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIToolCall {
    id: String,
    #[serde(default = "function_type")]
    r#type: String,
    function: OpenAIFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    #[serde(default)]
    choices: Vec<OpenAIChoice>,
    #[serde(default)]
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[allow(clippy::struct_field_names)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
