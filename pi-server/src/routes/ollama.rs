//! Ollama-compatible routes.

use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde_json::json;
use tracing::{debug, info};

use pi_core::context::budgeted_prompt;
use pi_core::generator::DEFAULT_INSTRUCTIONS;

use crate::error::ServerError;
use crate::http::{Request, Response, StreamDriver};
use crate::routes::{chunk_chars, openai::apply_settings, openai::validate_sampling};
use crate::schemas::ollama::{
    chat_response, generate_chunk, generate_done, generate_response, tags as tags_body,
    OllamaChatWire, OllamaGenerateWire,
};
use crate::state::AppState;

/// Character window per NDJSON record when streaming `/api/generate`.
const STREAM_WINDOW_CHARS: usize = 64;

/// `POST /api/chat`.  Always non-streaming; the `stream` flag is accepted
/// and ignored.
pub async fn chat(state: &Arc<AppState>, req: &Request) -> Result<Response, ServerError> {
    let wire: OllamaChatWire = req.json()?;
    let mut chat = wire.into_request();
    validate_sampling(chat.temperature, chat.max_tokens)?;
    apply_settings(&mut chat, &state.settings);

    debug!(model = %chat.model, messages = chat.messages.len(), "ollama chat request");

    let started = Instant::now();
    let prompt = budgeted_prompt(&state.facade, &chat.messages).await;
    let answer = state
        .facade
        .generate_or_fallback(DEFAULT_INSTRUCTIONS, &prompt)
        .await;
    let elapsed_ns = started.elapsed().as_nanos() as u64;

    info!(model = %chat.model, output_chars = answer.chars().count(), "ollama chat done");
    Ok(Response::json(
        200,
        &chat_response(&chat.model, &answer, elapsed_ns),
    ))
}

/// `POST /api/generate`.  Streams NDJSON records when `stream:true`.
pub async fn generate(state: &Arc<AppState>, req: &Request) -> Result<Response, ServerError> {
    let wire: OllamaGenerateWire = req.json()?;
    let completion = wire.into_request();
    validate_sampling(completion.temperature, completion.max_tokens)?;

    debug!(
        model = %completion.model,
        prompt_chars = completion.prompt.chars().count(),
        stream = completion.stream,
        "ollama generate request"
    );

    if completion.stream {
        let facade = state.facade.clone();
        let driver: StreamDriver = Box::new(move |emitter| {
            async move {
                let text = facade
                    .generate_or_fallback(DEFAULT_INSTRUCTIONS, &completion.prompt)
                    .await;
                for window in chunk_chars(&text, STREAM_WINDOW_CHARS) {
                    if emitter
                        .ndjson(&generate_chunk(&completion.model, &window))
                        .await
                        .is_err()
                    {
                        return;
                    }
                }
                let _ = emitter.ndjson(&generate_done(&completion.model)).await;
            }
            .boxed()
        });
        return Ok(Response::stream("application/x-ndjson", driver));
    }

    let started = Instant::now();
    let text = state
        .facade
        .generate_or_fallback(DEFAULT_INSTRUCTIONS, &completion.prompt)
        .await;
    let elapsed_ns = started.elapsed().as_nanos() as u64;
    Ok(Response::json(
        200,
        &generate_response(&completion.model, &text, elapsed_ns),
    ))
}

/// `GET /api/tags`.
pub fn tags(state: &Arc<AppState>) -> Result<Response, ServerError> {
    Ok(Response::json(
        200,
        &tags_body(&state.started_at.to_rfc3339()),
    ))
}

/// `GET /api/version`.
pub fn version() -> Result<Response, ServerError> {
    Ok(Response::json(200, &json!({ "version": "0.1.0" })))
}

/// `GET /api/ps`.  Nothing is ever "loaded" in the Ollama sense.
pub fn ps() -> Result<Response, ServerError> {
    Ok(Response::json(200, &json!({ "models": [] })))
}
