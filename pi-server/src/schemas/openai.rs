//! OpenAI-compatible API request / response types.
//!
//! The structures are kept compatible with the OpenAI REST specification so
//! existing SDK clients work without modification.  Requests decode into the
//! internal chat model; the polymorphic `content` and `tool_choice` fields
//! are collapsed here, at the wire boundary.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use pi_core::{ChatMessage, ChatRequest, CompletionRequest, Role, ToolChoice, ToolDefinition};

fn default_model() -> String {
    crate::state::MODEL_ID.to_owned()
}

fn default_true() -> bool {
    true
}

// ── Chat completions: request ────────────────────────────────────────────────

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionWire {
    #[serde(default = "default_model")]
    pub model: String,
    pub messages: Vec<MessageWire>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
    /// Chain bounded rounds for long streamed answers.  On by default.
    #[serde(default = "default_true")]
    pub multi_segment: bool,
    #[serde(default)]
    pub tools: Vec<ToolWire>,
    #[serde(default)]
    pub tool_choice: Option<ToolChoiceWire>,
}

impl ChatCompletionWire {
    pub fn into_request(self) -> ChatRequest {
        ChatRequest {
            model: self.model,
            messages: self.messages.into_iter().map(MessageWire::flatten).collect(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: self.stream,
            multi_segment: self.multi_segment,
            tools: self.tools.into_iter().map(ToolWire::into_definition).collect(),
            tool_choice: self
                .tool_choice
                .map(ToolChoiceWire::into_choice)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageWire {
    pub role: String,
    #[serde(default)]
    pub content: ContentWire,
}

impl MessageWire {
    fn flatten(self) -> ChatMessage {
        ChatMessage::new(
            self.role.parse::<Role>().unwrap_or(Role::User),
            self.content.flatten(),
        )
    }
}

/// The four wire shapes of `content`, collapsed by [`ContentWire::flatten`].
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ContentWire {
    Text(String),
    TextArray(Vec<String>),
    PartArray(Vec<PartWire>),
    Part(PartWire),
}

impl Default for ContentWire {
    fn default() -> Self {
        ContentWire::Text(String::new())
    }
}

impl ContentWire {
    /// Total flattening: every shape yields exactly one string.
    pub fn flatten(self) -> String {
        match self {
            ContentWire::Text(text) => text,
            ContentWire::TextArray(parts) => parts.join("\n"),
            ContentWire::PartArray(parts) => parts
                .into_iter()
                .filter_map(|p| p.text_content())
                .collect::<Vec<_>>()
                .concat(),
            ContentWire::Part(part) => part.text_content().unwrap_or_default(),
        }
    }
}

/// A structured content part; only text parts contribute to the flattened
/// string.
#[derive(Debug, Clone, Deserialize)]
pub struct PartWire {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl PartWire {
    fn text_content(self) -> Option<String> {
        match self.kind.as_str() {
            "" | "text" => self.text,
            _ => None,
        }
    }
}

/// OpenAI tool declaration: `{type:"function", function:{...}}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolWire {
    #[serde(rename = "type", default)]
    pub kind: String,
    pub function: ToolFunctionWire,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolFunctionWire {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Value,
}

impl ToolWire {
    fn into_definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.function.name,
            description: self.function.description,
            parameters: self.function.parameters,
        }
    }
}

/// `tool_choice` accepts `"none" | "auto" | "required"` or
/// `{type:"function", function:{name}}`; anything else decodes as `Auto`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ToolChoiceWire {
    Keyword(String),
    Object {
        #[serde(rename = "type", default)]
        kind: Option<String>,
        #[serde(default)]
        function: Option<FunctionNameWire>,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct FunctionNameWire {
    pub name: String,
}

impl ToolChoiceWire {
    pub fn into_choice(self) -> ToolChoice {
        match self {
            ToolChoiceWire::Keyword(word) => match word.as_str() {
                "none" => ToolChoice::None,
                "auto" => ToolChoice::Auto,
                "required" => ToolChoice::Required,
                _ => ToolChoice::Auto,
            },
            ToolChoiceWire::Object { function, .. } => match function {
                Some(f) => ToolChoice::Function(f.name),
                None => ToolChoice::Auto,
            },
        }
    }
}

// ── Completions: request ─────────────────────────────────────────────────────

/// Request body for `POST /v1/completions` (and `/api/generate`).
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionWire {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub prompt: PromptWire,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub stream: bool,
}

impl CompletionWire {
    pub fn into_request(self) -> CompletionRequest {
        CompletionRequest {
            model: self.model,
            prompt: self.prompt.flatten(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: self.stream,
        }
    }
}

/// `prompt` accepts a string or an array of strings joined by blank lines.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PromptWire {
    Text(String),
    Array(Vec<String>),
}

impl Default for PromptWire {
    fn default() -> Self {
        PromptWire::Text(String::new())
    }
}

impl PromptWire {
    pub fn flatten(self) -> String {
        match self {
            PromptWire::Text(text) => text,
            PromptWire::Array(parts) => parts.join("\n\n"),
        }
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

/// A single message in a chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    pub content: String,
}

/// A single choice in a chat response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ResponseMessage,
    pub finish_reason: String,
}

/// Response body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    /// Always `"chat.completion"`.
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletionResponse {
    pub fn assistant(id: String, created: i64, model: String, content: String) -> Self {
        Self {
            id,
            object: "chat.completion".into(),
            created,
            model,
            choices: vec![ChatChoice {
                index: 0,
                message: ResponseMessage {
                    role: "assistant".into(),
                    content,
                },
                finish_reason: "stop".into(),
            }],
        }
    }
}

/// A single choice in a text-completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    pub text: String,
    pub index: u32,
    pub finish_reason: String,
}

/// Response body for `POST /v1/completions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    /// Always `"text_completion"`.
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
}

impl CompletionResponse {
    pub fn of(id: String, created: i64, model: String, text: String) -> Self {
        Self {
            id,
            object: "text_completion".into(),
            created,
            model,
            choices: vec![CompletionChoice {
                text,
                index: 0,
                finish_reason: "stop".into(),
            }],
        }
    }
}

/// Model inventory entry for `GET /v1/models`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelObject {
    pub id: String,
    /// Always `"model"`.
    pub object: String,
    pub created: i64,
    pub owned_by: String,
}

pub fn new_chat_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4())
}

pub fn new_completion_id() -> String {
    format!("cmpl-{}", uuid::Uuid::new_v4())
}

// ── Streaming events ─────────────────────────────────────────────────────────

/// One content delta of a streamed chat completion.
pub fn chat_chunk(id: &str, created: i64, model: &str, content: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{ "index": 0, "delta": { "content": content } }],
    })
}

/// The terminal chat delta: empty `delta`, `finish_reason:"stop"`.
pub fn chat_terminal(id: &str, created: i64, model: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{ "index": 0, "delta": {}, "finish_reason": "stop" }],
    })
}

/// One text chunk of a streamed completion.
pub fn completion_chunk(id: &str, created: i64, model: &str, text: &str) -> Value {
    json!({
        "id": id,
        "object": "text_completion.chunk",
        "created": created,
        "model": model,
        "choices": [{ "text": text, "index": 0, "finish_reason": null }],
    })
}

/// The literal sentinel closing every SSE stream.
pub const DONE_SENTINEL: &str = "[DONE]";
