//! OpenAI-compatible chat, completion and model-discovery routes.

use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use tracing::{debug, info};

use pi_core::context::budgeted_prompt;
use pi_core::generator::DEFAULT_INSTRUCTIONS;
use pi_core::orchestrate::run_tool_round;
use pi_core::settings::Settings;
use pi_core::{ChatMessage, ChatRequest, GeneratorFacade, Role};

use crate::error::ServerError;
use crate::http::{Request, Response, StreamDriver};
use crate::routes::{chunk_chars, segmented};
use crate::schemas::openai::{
    chat_chunk, chat_terminal, completion_chunk, new_chat_id, new_completion_id,
    ChatCompletionResponse, ChatCompletionWire, CompletionResponse, CompletionWire, ModelObject,
    DONE_SENTINEL,
};
use crate::state::{AppState, MODEL_ID};

/// Character window per SSE delta when streaming a single bounded session.
const STREAM_WINDOW_CHARS: usize = 64;

// ── Model discovery ──────────────────────────────────────────────────────────

fn model_object(state: &AppState) -> ModelObject {
    ModelObject {
        id: MODEL_ID.to_owned(),
        object: "model".to_owned(),
        created: state.model_created(),
        owned_by: "system".to_owned(),
    }
}

/// `GET /v1/models` (also mirrored at `/api/models`).
pub fn list_models(state: &Arc<AppState>) -> Result<Response, ServerError> {
    Ok(Response::json(
        200,
        &json!({ "object": "list", "data": [model_object(state)] }),
    ))
}

/// `GET /v1/models/{id}` (also mirrored at `/api/models/{id}`).
pub fn get_model(state: &Arc<AppState>, id: &str) -> Result<Response, ServerError> {
    if id == MODEL_ID {
        Ok(Response::json(200, &model_object(state)))
    } else {
        Err(ServerError::UnknownModel(id.to_owned()))
    }
}

// ── Chat completions ─────────────────────────────────────────────────────────

/// `POST /v1/chat/completions`.
///
/// Requests carrying tools run the single tool round-trip and always answer
/// non-streaming.  Streaming requests without tools produce SSE deltas,
/// multi-segment by default or a single windowed session otherwise.
pub async fn chat_completions(
    state: &Arc<AppState>,
    req: &Request,
) -> Result<Response, ServerError> {
    let wire: ChatCompletionWire = req.json()?;
    let mut chat = wire.into_request();
    validate_sampling(chat.temperature, chat.max_tokens)?;
    apply_settings(&mut chat, &state.settings);

    debug!(
        model = %chat.model,
        messages = chat.messages.len(),
        stream = chat.stream,
        tools = chat.tools.len(),
        "chat completion request"
    );

    // Tool round-trips cannot be represented as a delta sequence; the tools
    // key forces the non-streaming path regardless of the stream flag.
    if chat.wants_tools() {
        let answer = run_tool_round(&state.facade, state.executor.as_ref(), &chat).await;
        let response = ChatCompletionResponse::assistant(
            new_chat_id(),
            Utc::now().timestamp(),
            chat.model,
            answer,
        );
        return Ok(Response::json(200, &response));
    }

    if chat.stream {
        return Ok(stream_chat(state.facade.clone(), chat));
    }

    let prompt = budgeted_prompt(&state.facade, &chat.messages).await;
    let answer = state
        .facade
        .generate_or_fallback(DEFAULT_INSTRUCTIONS, &prompt)
        .await;
    info!(model = %chat.model, output_chars = answer.chars().count(), "chat completion done");

    let response = ChatCompletionResponse::assistant(
        new_chat_id(),
        Utc::now().timestamp(),
        chat.model,
        answer,
    );
    Ok(Response::json(200, &response))
}

/// Build the SSE response for a streaming chat completion.
fn stream_chat(facade: GeneratorFacade, chat: ChatRequest) -> Response {
    let driver: StreamDriver = Box::new(move |emitter| {
        async move {
            let id = new_chat_id();
            let created = Utc::now().timestamp();
            let model = chat.model.clone();
            let prompt = budgeted_prompt(&facade, &chat.messages).await;

            if chat.multi_segment {
                // stream_segments finishes the protocol (terminal + [DONE]).
                segmented::stream_segments(&facade, &prompt, &emitter, &id, created, &model)
                    .await;
                return;
            }

            match facade.generate(DEFAULT_INSTRUCTIONS, &prompt).await {
                Ok(text) => {
                    for window in chunk_chars(&text, STREAM_WINDOW_CHARS) {
                        if emitter
                            .sse_json(&chat_chunk(&id, created, &model, &window))
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let fallback = GeneratorFacade::fallback_message(&e.to_string());
                    if emitter
                        .sse_json(&chat_chunk(&id, created, &model, &fallback))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
            }

            let _ = emitter.sse_json(&chat_terminal(&id, created, &model)).await;
            let _ = emitter.sse_raw(DONE_SENTINEL).await;
        }
        .boxed()
    });

    Response::stream("text/event-stream", driver).with_header("Cache-Control", "no-cache")
}

// ── Completions ──────────────────────────────────────────────────────────────

/// `POST /v1/completions`.
pub async fn completions(state: &Arc<AppState>, req: &Request) -> Result<Response, ServerError> {
    let wire: CompletionWire = req.json()?;
    let completion = wire.into_request();
    validate_sampling(completion.temperature, completion.max_tokens)?;

    debug!(
        model = %completion.model,
        prompt_chars = completion.prompt.chars().count(),
        stream = completion.stream,
        "completion request"
    );

    if completion.stream {
        let facade = state.facade.clone();
        let driver: StreamDriver = Box::new(move |emitter| {
            async move {
                let id = new_completion_id();
                let created = Utc::now().timestamp();
                let text = facade
                    .generate_or_fallback(DEFAULT_INSTRUCTIONS, &completion.prompt)
                    .await;
                for window in chunk_chars(&text, STREAM_WINDOW_CHARS) {
                    if emitter
                        .sse_json(&completion_chunk(&id, created, &completion.model, &window))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                let _ = emitter.sse_raw(DONE_SENTINEL).await;
            }
            .boxed()
        });
        return Ok(
            Response::stream("text/event-stream", driver).with_header("Cache-Control", "no-cache")
        );
    }

    let text = state
        .facade
        .generate_or_fallback(DEFAULT_INSTRUCTIONS, &completion.prompt)
        .await;
    let response = CompletionResponse::of(
        new_completion_id(),
        Utc::now().timestamp(),
        completion.model,
        text,
    );
    Ok(Response::json(200, &response))
}

// ── Shared helpers ───────────────────────────────────────────────────────────

/// Reject sampling parameters the backend would choke on.
pub(crate) fn validate_sampling(
    temperature: Option<f32>,
    max_tokens: Option<u32>,
) -> Result<(), ServerError> {
    if let Some(t) = temperature {
        if !(0.0..=2.0).contains(&t) {
            return Err(ServerError::BadRequest(format!(
                "invalid temperature ({t}): must be between 0.0 and 2.0"
            )));
        }
    }
    if let Some(mt) = max_tokens {
        if mt == 0 || mt > 4096 {
            return Err(ServerError::BadRequest(format!(
                "invalid max_tokens ({mt}): must be between 1 and 4096"
            )));
        }
    }
    Ok(())
}

/// Apply the persistent settings to a normalized chat request.
pub(crate) fn apply_settings(chat: &mut ChatRequest, settings: &Settings) {
    if !settings.include_history {
        if let Some(last_user) = chat
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .cloned()
        {
            chat.messages = vec![last_user];
        }
    }
    if settings.include_system_prompt && !settings.system_prompt.is_empty() {
        chat.messages
            .insert(0, ChatMessage::system(settings.system_prompt.clone()));
    }
}
