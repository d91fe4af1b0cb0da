//! One conversational turn against the model
//!
//! A turn is either a direct reply or a three-phase tool exchange:
//! `request_completion` → `execute_tool_calls` → `reconcile`. Each phase only
//! consumes what the previous one produced.

use super::traits::ToolExecutor;
use crate::clarity::parse_reply;
use crate::llm::{
    ContentBlock, LlmError, LlmMessage, LlmRequest, LlmResponse, LlmService, MessageRole,
    SystemContent, ToolChoice, ToolUse,
};
use crate::prompt::{
    build_system_prompt, wrap_reflection_note, HISTORY_WINDOW, TOOL_FOLLOW_UP_PROMPT,
    TOOL_HISTORY_WINDOW,
};
use crate::state_machine::{ClarityOutput, Message, Role, ToolCall};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

const FIRST_CALL_MAX_TOKENS: u32 = 2048;
const RECONCILE_MAX_TOKENS: u32 = 16000;

/// Reply used when the reconciliation call returns no text
pub const TOOL_FALLBACK_REPLY: &str = "Tool results processed successfully.";

/// What a successful turn produced
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutput {
    pub content: String,
    pub clarity_output: Option<ClarityOutput>,
    pub tool_calls: Vec<ToolCall>,
}

impl TurnOutput {
    /// The assistant message to append to history
    pub fn into_message(self) -> Message {
        Message::assistant(self.content)
            .with_tool_calls(self.tool_calls)
            .with_clarity(self.clarity_output)
    }
}

/// Why a turn produced no reply
#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error("{0}")]
    Upstream(#[from] LlmError),
    #[error("Model returned neither text nor tool requests")]
    EmptyResponse,
}

/// Runs turns against a completion service and a tool executor
#[derive(Clone)]
pub struct TurnProcessor {
    llm: Arc<dyn LlmService>,
    tools: Arc<dyn ToolExecutor>,
}

impl TurnProcessor {
    pub fn new(llm: Arc<dyn LlmService>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self { llm, tools }
    }

    /// Produce the assistant reply for `user_text` given the prior `history`
    pub async fn process_turn(
        &self,
        model: &str,
        user_text: &str,
        history: &[Message],
        should_summarize: bool,
    ) -> Result<TurnOutput, TurnError> {
        let response = self
            .request_completion(model, user_text, history, should_summarize)
            .await?;

        if response.has_tool_use() {
            let tool_uses = response.tool_uses();
            tracing::info!(count = tool_uses.len(), "Model requested tools");
            let tool_calls = self.execute_tool_calls(&tool_uses).await;
            let content = self
                .reconcile(model, user_text, history, &tool_uses, &tool_calls)
                .await?;
            return Ok(TurnOutput {
                content,
                clarity_output: None,
                tool_calls,
            });
        }

        let raw = response.text();
        if raw.trim().is_empty() {
            return Err(TurnError::EmptyResponse);
        }

        let parsed = parse_reply(&raw);
        Ok(TurnOutput {
            content: parsed.content,
            clarity_output: parsed.clarity_output,
            tool_calls: Vec::new(),
        })
    }

    /// Phase 1: the persona call with every tool offered
    async fn request_completion(
        &self,
        model: &str,
        user_text: &str,
        history: &[Message],
        should_summarize: bool,
    ) -> Result<LlmResponse, LlmError> {
        let prompt_text = if should_summarize {
            wrap_reflection_note(user_text)
        } else {
            user_text.to_string()
        };

        let mut messages = history_window(history, HISTORY_WINDOW);
        messages.push(LlmMessage::text(MessageRole::User, prompt_text));

        let request = LlmRequest {
            model: model.to_string(),
            system: vec![SystemContent::new(build_system_prompt(should_summarize))],
            messages,
            tools: self.tools.definitions(),
            tool_choice: Some(ToolChoice::Auto),
            max_tokens: Some(FIRST_CALL_MAX_TOKENS),
        };

        self.llm.complete(&request).await
    }

    /// Phase 2: run every requested tool concurrently
    async fn execute_tool_calls(&self, tool_uses: &[ToolUse]) -> Vec<ToolCall> {
        let runs = tool_uses.iter().map(|tool_use| async move {
            let failed = |reason: String| {
                tracing::warn!(tool = %tool_use.name, reason = %reason, "Tool execution failed");
                ToolCall::failed(
                    &tool_use.id,
                    &tool_use.name,
                    tool_use.input.clone(),
                    format!("Failed to execute {}: {reason}", tool_use.name),
                )
            };

            if !tool_use.input.is_object() {
                return failed("invalid arguments".to_string());
            }

            match self.tools.execute(&tool_use.name, tool_use.input.clone()).await {
                Some(output) if output.success => ToolCall::succeeded(
                    &tool_use.id,
                    &tool_use.name,
                    tool_use.input.clone(),
                    output.output,
                ),
                Some(output) => failed(output.error_message().unwrap_or_default()),
                None => failed("unknown tool".to_string()),
            }
        });

        join_all(runs).await
    }

    /// Phase 3: let the model respond to the tool results
    async fn reconcile(
        &self,
        model: &str,
        user_text: &str,
        history: &[Message],
        tool_uses: &[ToolUse],
        tool_calls: &[ToolCall],
    ) -> Result<String, LlmError> {
        let mut messages = history_window(history, TOOL_HISTORY_WINDOW);
        messages.push(LlmMessage::text(MessageRole::User, user_text));
        messages.push(LlmMessage {
            role: MessageRole::Assistant,
            content: tool_uses
                .iter()
                .map(|t| ContentBlock::tool_use(&t.id, &t.name, t.input.clone()))
                .collect(),
        });
        for call in tool_calls {
            messages.push(LlmMessage {
                role: MessageRole::User,
                content: vec![ContentBlock::tool_result(
                    &call.id,
                    result_text(&call.result),
                    call.is_error(),
                )],
            });
        }

        let request = LlmRequest {
            model: model.to_string(),
            system: vec![SystemContent::new(TOOL_FOLLOW_UP_PROMPT)],
            messages,
            tools: Vec::new(),
            tool_choice: None,
            max_tokens: Some(RECONCILE_MAX_TOKENS),
        };

        let text = self.llm.complete(&request).await?.text();
        if text.trim().is_empty() {
            Ok(TOOL_FALLBACK_REPLY.to_string())
        } else {
            Ok(text)
        }
    }
}

/// The last `window` history messages, oldest first
fn history_window(history: &[Message], window: usize) -> Vec<LlmMessage> {
    let start = history.len().saturating_sub(window);
    history[start..]
        .iter()
        .map(|m| {
            let role = match m.role {
                Role::User => MessageRole::User,
                Role::Assistant => MessageRole::Assistant,
                Role::System => MessageRole::System,
            };
            LlmMessage::text(role, &m.content)
        })
        .collect()
}

fn result_text(result: &Value) -> String {
    serde_json::to_string(result).unwrap_or_else(|_| "null".to_string())
}
