//! Tools the model can call during a turn
//!
//! Tools are stateless singletons. The registry lists their schemas for the
//! completion request and dispatches execution by name.

mod weather;

pub use weather::WeatherTool;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::llm::ToolDefinition;

/// Result from tool execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    /// Structured result on success, error text on failure
    pub output: Value,
}

impl ToolOutput {
    pub fn success(output: Value) -> Self {
        Self {
            success: true,
            output,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            output: Value::String(message.into()),
        }
    }

    /// Error text for a failed output
    pub fn error_message(&self) -> Option<String> {
        if self.success {
            return None;
        }
        Some(match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Trait for tools that can be executed by the model
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name
    fn name(&self) -> &str;

    /// Tool description for LLM
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn run(&self, input: Value) -> ToolOutput;
}

/// Collection of tools available to sessions
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Create the standard tool registry
    pub fn standard() -> Self {
        Self::new(vec![Arc::new(WeatherTool)])
    }

    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self { tools }
    }

    /// Get all tool definitions for LLM
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }

    /// Execute a tool by name; `None` when no tool has that name
    pub async fn execute(&self, name: &str, input: Value) -> Option<ToolOutput> {
        for tool in &self.tools {
            if tool.name() == name {
                return Some(tool.run(input).await);
            }
        }
        None
    }
}
