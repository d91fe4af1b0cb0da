//! API request and response types

use serde::{Deserialize, Serialize};

/// Envelope wrapping every response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Request to send a chat message
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub model: Option<String>,
}

/// Request to change a session's model
#[derive(Debug, Deserialize)]
pub struct ModelRequest {
    #[serde(default)]
    pub model: String,
}

/// Request to create (or retitle) a session
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub title: Option<String>,
    pub session_id: Option<String>,
    pub first_message: Option<String>,
}

/// Response for session creation
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub title: String,
}

/// Response for a single delete
#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

/// Response for delete-all
#[derive(Debug, Serialize)]
pub struct DeletedCountResponse {
    pub deleted: usize,
}
