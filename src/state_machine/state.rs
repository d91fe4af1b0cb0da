//! Session state types

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Number of stored messages at which the one-shot reflection summary fires
/// (five user/assistant pairs).
pub const REFLECTION_POINT: usize = 10;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Structured reflection attached to the assistant message of the
/// reflection turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarityOutput {
    pub summary: String,
    pub insight: String,
    pub suggestion: String,
}

/// A completed tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    /// Tool output, or `{"error": "..."}` when execution failed
    pub result: Value,
}

impl ToolCall {
    pub fn succeeded(id: impl Into<String>, name: impl Into<String>, arguments: Value, result: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result,
        }
    }

    pub fn failed(id: impl Into<String>, name: impl Into<String>, arguments: Value, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            result: serde_json::json!({ "error": error.into() }),
        }
    }

    /// Whether the result carries an error marker
    pub fn is_error(&self) -> bool {
        self.result.get("error").is_some()
    }
}

/// One utterance in a session's history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    /// Creation time in epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarity_output: Option<ClarityOutput>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            tool_calls: None,
            clarity_output: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        if !tool_calls.is_empty() {
            self.tool_calls = Some(tool_calls);
        }
        self
    }

    pub fn with_clarity(mut self, clarity: Option<ClarityOutput>) -> Self {
        self.clarity_output = clarity;
        self
    }
}

/// Full state of one conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    pub messages: Vec<Message>,
    /// True only while a turn is in flight
    pub is_processing: bool,
    pub model: String,
    /// Set once the reflection summary has been produced; only a clear resets it
    #[serde(default)]
    pub summary_offered: bool,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            is_processing: false,
            model: model.into(),
            summary_offered: false,
        }
    }

    /// Whether a turn whose user message brings history to
    /// `len_after_user_message` should produce the reflection summary.
    ///
    /// Fires when the assistant reply of that turn becomes stored message
    /// number [`REFLECTION_POINT`].
    pub fn reflection_due(&self, len_after_user_message: usize) -> bool {
        !self.summary_offered && len_after_user_message + 1 == REFLECTION_POINT
    }
}
