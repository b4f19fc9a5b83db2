//! Tool-call orchestration.
//!
//! When a request carries tool definitions the model is steered into a strict
//! JSON envelope protocol: its first reply is either a normal answer or a
//! single `{"tool_call": {...}}` object.  An envelope is dispatched through
//! the [`ToolExecutor`], the raw reply and the execution result are appended
//! to the history, and a second generation produces the final answer.  One
//! round-trip per request; there are no recursive tool chains.

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::chat::{ChatMessage, ChatRequest, ToolChoice};
use crate::context::budgeted_prompt;
use crate::generator::{Generator, GeneratorFacade, DEFAULT_INSTRUCTIONS};
use crate::tools::{ToolExecutor, BUILTIN_TOOLS};

/// A parsed `{"tool_call": {...}}` envelope.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    tool_call: ToolCall,
}

/// Run the single tool round-trip and return the final answer text.
pub async fn run_tool_round(
    facade: &GeneratorFacade,
    executor: &dyn ToolExecutor,
    request: &ChatRequest,
) -> String {
    let mut messages = Vec::with_capacity(request.messages.len() + 1);
    messages.push(ChatMessage::system(tool_system_message(request)));
    messages.extend(request.messages.iter().cloned());

    let prompt = budgeted_prompt(facade, &messages).await;
    let first = facade
        .generate_or_fallback(DEFAULT_INSTRUCTIONS, &prompt)
        .await;

    let Some(call) = parse_envelope(&first) else {
        debug!("no tool envelope in first reply; treating it as the final answer");
        return first;
    };

    info!(tool = %call.name, "dispatching tool call");
    let result = executor.execute(&call.name, &call.arguments).await;
    let result_json = result.to_string();

    messages.push(ChatMessage::assistant(first));
    messages.push(ChatMessage::tool(result_json));

    let prompt = budgeted_prompt(facade, &messages).await;
    facade
        .generate_or_fallback(DEFAULT_INSTRUCTIONS, &prompt)
        .await
}

/// The synthetic system message that teaches the envelope protocol and
/// advertises both the request-supplied tools and the built-in catalog.
fn tool_system_message(request: &ChatRequest) -> String {
    let mut lines = vec!["You have access to tools.".to_owned()];

    if !request.tools.is_empty() {
        lines.push("Tools supplied with this request:".to_owned());
        for tool in &request.tools {
            match &tool.description {
                Some(desc) => lines.push(format!("- {}: {desc}", tool.name)),
                None => lines.push(format!("- {}", tool.name)),
            }
        }
    }

    lines.push("Built-in file tools (always available):".to_owned());
    for tool in BUILTIN_TOOLS {
        lines.push(format!("- {} (parameters: {})", tool.name, tool.params));
    }

    match &request.tool_choice {
        ToolChoice::Required => {
            lines.push("You must call a tool before answering.".to_owned());
        }
        ToolChoice::Function(name) => {
            lines.push(format!("You must call the tool \"{name}\"."));
        }
        ToolChoice::None | ToolChoice::Auto => {}
    }

    lines.push(
        "To call a tool, reply ONLY with a single JSON object in this exact format: \
         {\"tool_call\": {\"name\": \"<tool-name>\", \"arguments\": { ... }}}"
            .to_owned(),
    );
    lines.join("\n")
}

/// Strict-then-lenient envelope detection: try the whole reply as JSON, then
/// the substring between the first `{` and the last `}`.
pub fn parse_envelope(reply: &str) -> Option<ToolCall> {
    if let Ok(env) = serde_json::from_str::<Envelope>(reply.trim()) {
        return Some(env.tool_call);
    }
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Envelope>(&reply[start..=end])
        .ok()
        .map(|env| env.tool_call)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::chat::{ChatMessage, ToolDefinition};
    use crate::testing::ScriptedGenerator;
    use crate::tools::FsToolExecutor;

    fn tool_request(messages: Vec<ChatMessage>) -> ChatRequest {
        ChatRequest {
            model: "apple.local".into(),
            messages,
            temperature: None,
            max_tokens: None,
            stream: false,
            multi_segment: true,
            tools: vec![ToolDefinition {
                name: "list_directory".into(),
                description: Some("List files in a directory".into()),
                parameters: json!({"type": "object"}),
            }],
            tool_choice: ToolChoice::Auto,
        }
    }

    #[test]
    fn envelope_parses_strict_json() {
        let call = parse_envelope(r#"{"tool_call":{"name":"read_file","arguments":{"path":"a"}}}"#)
            .expect("strict envelope should parse");
        assert_eq!(call.name, "read_file");
        assert_eq!(call.arguments["path"], "a");
    }

    #[test]
    fn envelope_parses_when_wrapped_in_prose() {
        let reply = "Sure, I'll check.\n{\"tool_call\": {\"name\": \"check_path\", \
                     \"arguments\": {\"path\": \".\"}}}\nDone.";
        let call = parse_envelope(reply).expect("embedded envelope should parse");
        assert_eq!(call.name, "check_path");
    }

    #[test]
    fn plain_answers_are_not_envelopes() {
        assert!(parse_envelope("The answer is 42.").is_none());
        assert!(parse_envelope("{\"not_a_tool\": 1}").is_none());
    }

    #[tokio::test]
    async fn full_round_trip_feeds_tool_result_back() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.txt"), "x").expect("seed file");
        let executor = FsToolExecutor::new(dir.path().to_path_buf(), Vec::new(), false);

        let gen = Arc::new(ScriptedGenerator::replies([
            r#"{"tool_call":{"name":"list_directory","arguments":{"path":"."}}}"#,
            "The directory contains one file: a.txt.",
        ]));
        let facade = GeneratorFacade::new(Arc::clone(&gen) as Arc<dyn Generator>);

        let request = tool_request(vec![ChatMessage::user("list .")]);
        let answer = run_tool_round(&facade, &executor, &request).await;
        assert_eq!(answer, "The directory contains one file: a.txt.");

        // The second generation saw the assistant envelope and a tool message
        // carrying the executor's JSON result.
        let prompts = gen.prompts.lock().unwrap();
        let last = prompts.last().expect("two generations should have run");
        assert!(last.contains("assistant: {\"tool_call\""));
        assert!(last.contains("tool: "));
        assert!(last.contains("\"count\":1"));
    }

    #[tokio::test]
    async fn reply_without_envelope_is_final_after_one_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = FsToolExecutor::new(dir.path().to_path_buf(), Vec::new(), false);

        let gen = Arc::new(ScriptedGenerator::replies(["Just an answer."]));
        let facade = GeneratorFacade::new(Arc::clone(&gen) as Arc<dyn Generator>);

        let request = tool_request(vec![ChatMessage::user("hello")]);
        let answer = run_tool_round(&facade, &executor, &request).await;
        assert_eq!(answer, "Just an answer.");
        assert_eq!(gen.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_tool_error_is_visible_to_the_second_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let executor = FsToolExecutor::new(dir.path().to_path_buf(), Vec::new(), false);

        let gen = Arc::new(ScriptedGenerator::replies([
            r#"{"tool_call":{"name":"launch_rocket","arguments":{}}}"#,
            "I could not do that.",
        ]));
        let facade = GeneratorFacade::new(Arc::clone(&gen) as Arc<dyn Generator>);

        let request = tool_request(vec![ChatMessage::user("go")]);
        let answer = run_tool_round(&facade, &executor, &request).await;
        assert_eq!(answer, "I could not do that.");

        let prompts = gen.prompts.lock().unwrap();
        assert!(prompts.last().unwrap().contains("unknown tool: launch_rocket"));
    }

    #[test]
    fn system_message_lists_builtin_catalog_and_protocol() {
        let request = tool_request(vec![ChatMessage::user("x")]);
        let msg = tool_system_message(&request);
        assert!(msg.contains("list_directory"));
        assert!(msg.contains("read_file"));
        assert!(msg.contains("reply ONLY with a single JSON object"));
    }

    #[test]
    fn required_tool_choice_adds_an_instruction() {
        let mut request = tool_request(vec![ChatMessage::user("x")]);
        request.tool_choice = ToolChoice::Required;
        assert!(tool_system_message(&request).contains("must call a tool"));

        request.tool_choice = ToolChoice::Function("read_file".into());
        assert!(tool_system_message(&request).contains("must call the tool \"read_file\""));
    }
}
