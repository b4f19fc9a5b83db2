//! Internal chat / completion data model.
//!
//! Wire-protocol adapters in the server crate decode both supported dialects
//! (OpenAI and Ollama) into these types; budgeting, generation and tool
//! orchestration only ever see this normalized form.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Author of a [`ChatMessage`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
    /// Result of a tool execution fed back to the model.
    Tool,
}

/// A single turn in a conversation. Content is always a flat string; the
/// adapters collapse the OpenAI structured-part shapes before this point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }
}

/// A normalized chat-completion request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    /// Chain bounded generation rounds for long-form streaming answers.
    pub multi_segment: bool,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
}

impl ChatRequest {
    /// Whether this request enters the tool-orchestration path.
    pub fn wants_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// A normalized text-completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

/// A caller-supplied tool. The parameter schema is carried opaquely; the
/// executor dispatches on name and the raw argument tree only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Tool-selection policy. Decoded permissively on the wire: unknown strings
/// fall back to `Auto`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ToolChoice {
    /// Tools are listed but must not be called.
    None,
    #[default]
    Auto,
    /// The model must call some tool before answering.
    Required,
    /// The model must call the named tool.
    Function(String),
}
