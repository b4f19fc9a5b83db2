//! Ollama-compatible API types.
//!
//! Covers the subset local clients actually touch: `/api/chat`,
//! `/api/generate`, `/api/tags`, `/api/version` and `/api/ps`.  Timestamps
//! are ISO-8601 as Ollama emits them; durations are nanoseconds.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use pi_core::{ChatMessage, ChatRequest, CompletionRequest, Role, ToolChoice};

use super::openai::PromptWire;
use crate::state::OLLAMA_MODEL_NAME;

fn default_model() -> String {
    crate::state::MODEL_ID.to_owned()
}

// ── Requests ─────────────────────────────────────────────────────────────────

/// Request body for `POST /api/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaChatWire {
    #[serde(default = "default_model")]
    pub model: String,
    pub messages: Vec<OllamaMessageWire>,
    /// Accepted for wire compatibility; this route never streams.
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub options: OllamaOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaMessageWire {
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OllamaOptions {
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub num_predict: Option<u32>,
}

impl OllamaChatWire {
    pub fn into_request(self) -> ChatRequest {
        ChatRequest {
            model: self.model,
            messages: self
                .messages
                .into_iter()
                .map(|m| {
                    ChatMessage::new(m.role.parse::<Role>().unwrap_or(Role::User), m.content)
                })
                .collect(),
            temperature: self.options.temperature,
            max_tokens: self.options.num_predict,
            stream: false,
            multi_segment: false,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// Request body for `POST /api/generate`: the completion shape plus Ollama
/// options.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaGenerateWire {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub prompt: PromptWire,
    #[serde(default)]
    pub stream: bool,
    #[serde(default)]
    pub options: OllamaOptions,
}

impl OllamaGenerateWire {
    pub fn into_request(self) -> CompletionRequest {
        CompletionRequest {
            model: self.model,
            prompt: self.prompt.flatten(),
            temperature: self.options.temperature,
            max_tokens: self.options.num_predict,
            stream: self.stream,
        }
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

fn now_iso() -> String {
    Utc::now().to_rfc3339()
}

/// Non-streaming `/api/chat` response.
pub fn chat_response(model: &str, content: &str, total_duration_ns: u64) -> Value {
    json!({
        "model": model,
        "created_at": now_iso(),
        "message": { "role": "assistant", "content": content },
        "done": true,
        "total_duration": total_duration_ns,
    })
}

/// One streamed `/api/generate` record.
pub fn generate_chunk(model: &str, chunk: &str) -> Value {
    json!({
        "model": model,
        "created_at": now_iso(),
        "response": chunk,
        "done": false,
    })
}

/// The closing `/api/generate` record.
pub fn generate_done(model: &str) -> Value {
    json!({
        "model": model,
        "created_at": now_iso(),
        "done": true,
    })
}

/// Non-streaming `/api/generate` response.
pub fn generate_response(model: &str, text: &str, total_duration_ns: u64) -> Value {
    json!({
        "model": model,
        "created_at": now_iso(),
        "response": text,
        "done": true,
        "total_duration": total_duration_ns,
    })
}

/// `GET /api/tags` inventory: the single on-device model.
pub fn tags(modified_at: &str) -> Value {
    json!({
        "models": [{
            "name": OLLAMA_MODEL_NAME,
            "modified_at": modified_at,
            "size": null,
            "digest": null,
            "details": {
                "format": "system",
                "family": "apple-intelligence",
                "families": ["apple-intelligence"],
                "parameter_size": null,
                "quantization_level": null,
            },
        }],
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn chat_wire_maps_options_into_the_internal_request() {
        let wire: OllamaChatWire = serde_json::from_str(
            r#"{
                "model": "apple.local",
                "messages": [{"role":"user","content":"hi"}],
                "stream": true,
                "options": {"temperature": 0.5, "num_predict": 128}
            }"#,
        )
        .unwrap();
        let req = wire.into_request();
        assert_eq!(req.temperature, Some(0.5));
        assert_eq!(req.max_tokens, Some(128));
        // The stream flag is accepted but this route never streams.
        assert!(!req.stream);
    }

    #[test]
    fn generate_wire_accepts_prompt_arrays() {
        let wire: OllamaGenerateWire =
            serde_json::from_str(r#"{"model":"apple.local","prompt":["a","b"],"stream":true}"#)
                .unwrap();
        let req = wire.into_request();
        assert_eq!(req.prompt, "a\n\nb");
        assert!(req.stream);
    }

    #[test]
    fn tags_entry_describes_the_apple_intelligence_family() {
        let body = tags("2024-01-01T00:00:00+00:00");
        let entry = &body["models"][0];
        assert_eq!(entry["name"], "apple.local:latest");
        assert_eq!(entry["details"]["family"], "apple-intelligence");
        assert_eq!(entry["details"]["families"][0], "apple-intelligence");
        assert!(entry["size"].is_null());
    }

    #[test]
    fn generate_records_flag_done_exactly_once_at_the_end() {
        assert_eq!(generate_chunk("m", "abc")["done"], false);
        assert_eq!(generate_done("m")["done"], true);
        assert!(generate_done("m").get("response").is_none());
    }
}
