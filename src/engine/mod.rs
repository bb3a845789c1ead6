//! The reasoning-engine boundary.
//!
//! The core treats the engine as a black box behind the [`ReasoningEngine`]
//! trait: it receives the conversation and the available tool schemas and
//! returns text and/or requested tool invocations. Transport, retries, and
//! provider specifics all live behind the trait.
//!
//! [`EngineResponse::classify`] maps a raw response onto the exhaustive
//! [`EngineOutcome`] union the state machines match on.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::EngineError;

/// Role of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single conversation message.
///
/// Tool-result messages link back to the originating call via
/// `tool_call_id`; assistant messages that request tools carry the calls in
/// `tool_calls`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant message carrying tool-call requests.
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls: Some(calls),
            tool_call_id: None,
        }
    }

    /// Tool-result message linked to a preceding call by its id.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// A tool invocation requested by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Stable call identifier; tool-result messages reference it.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Convenience accessor for a string argument.
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

/// Schema of a tool as advertised to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the arguments object.
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Render in the `{"type": "function", ...}` wire shape most chat APIs
    /// expect.
    pub fn to_schema(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Model parameters forwarded verbatim to the engine client.
#[derive(Debug, Clone, Default)]
pub struct ModelParams {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Raw engine response: optional text plus zero-or-more tool calls.
#[derive(Debug, Clone, Default)]
pub struct EngineResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl EngineResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls,
        }
    }

    /// Classify the response for the state machine.
    ///
    /// A call to `delegate_tool` anywhere in the call list takes precedence:
    /// delegation is a control-flow decision, not a tool execution. Exactly
    /// one of the three cases is produced; callers match exhaustively.
    pub fn classify(self, delegate_tool: &str) -> EngineOutcome {
        if let Some(call) = self
            .tool_calls
            .iter()
            .find(|c| c.name == delegate_tool)
            .cloned()
        {
            return EngineOutcome::Delegate { call };
        }
        if !self.tool_calls.is_empty() {
            return EngineOutcome::ToolCalls(self.tool_calls);
        }
        EngineOutcome::Answer(self.content.unwrap_or_default())
    }
}

/// The three ways an engine response drives the loop.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    /// Plain text, no tool calls: the turn is terminal.
    Answer(String),
    /// Execute every call in order, then reason again.
    ToolCalls(Vec<ToolCall>),
    /// The delegation trigger was invoked: spawn a background task.
    Delegate { call: ToolCall },
}

/// Chat-completion client consumed by the core.
///
/// Implementations own transport and retry policy. An `Err` is recoverable
/// from the core's perspective: it counts toward the consecutive-failure
/// budget of the calling loop, never aborts the process.
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    async fn chat(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        params: &ModelParams,
    ) -> Result<EngineResponse, EngineError>;
}
