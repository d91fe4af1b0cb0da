//! Structured-reply extraction
//!
//! Models asked for the reflection format often wrap the JSON object in
//! prose or code fences. Extraction takes everything from the first `{` to
//! the last `}` and accepts it only if it deserializes into the four string
//! fields. Anything else degrades to plain text; this step never fails.

use crate::state_machine::ClarityOutput;
use serde::Deserialize;

/// Shown when the model produced nothing usable at all
pub const FALLBACK_REPLY: &str =
    "I'm having a little trouble organizing my thoughts right now. Could we try that again?";

/// Wire shape the reflection contract asks the model to produce
#[derive(Debug, Deserialize)]
struct StructuredReply {
    response: String,
    summary: String,
    insight: String,
    suggestion: String,
}

/// A model reply split into conversational content and optional clarity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub content: String,
    pub clarity_output: Option<ClarityOutput>,
}

/// The outermost `{ ... }` span of `raw`, if there is one
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    raw.get(start..=end)
}

/// Split a raw model reply into content and optional clarity output
pub fn parse_reply(raw: &str) -> ParsedReply {
    if let Some(candidate) = extract_json_object(raw) {
        match serde_json::from_str::<StructuredReply>(candidate) {
            Ok(reply) => {
                return ParsedReply {
                    content: reply.response,
                    clarity_output: Some(ClarityOutput {
                        summary: reply.summary,
                        insight: reply.insight,
                        suggestion: reply.suggestion,
                    }),
                };
            }
            Err(e) => {
                tracing::debug!(error = %e, "Reply is not a structured summary, using plain text");
            }
        }
    }

    let content = if raw.trim().is_empty() {
        FALLBACK_REPLY.to_string()
    } else {
        raw.to_string()
    };

    ParsedReply {
        content,
        clarity_output: None,
    }
}
