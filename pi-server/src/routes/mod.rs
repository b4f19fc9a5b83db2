//! Request routing.
//!
//! Paths are normalized (query string and trailing slashes stripped) before
//! dispatch on `(method, path)`.  `OPTIONS` is answered with a permissive
//! CORS preflight for every route, `HEAD` mirrors the matching `GET` with an
//! empty body, and anything unmatched falls through to a plaintext 404.
//! Every response leaves here carrying `Access-Control-Allow-Origin: *`.

pub mod debug;
pub mod ollama;
pub mod openai;
pub mod segmented;

use std::sync::Arc;

use serde_json::json;

use crate::error::ServerError;
use crate::http::{Request, Response};
use crate::state::AppState;

/// Strip the query suffix and trailing slashes; the root path survives.
/// Idempotent: normalizing twice changes nothing.
pub fn normalize_path(raw: &str) -> String {
    let no_query = raw.split('?').next().unwrap_or(raw);
    let trimmed = no_query.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Dispatch one request to its handler and finalize the shared headers.
pub async fn dispatch(state: &Arc<AppState>, req: &Request) -> Response {
    let path = normalize_path(&req.path);

    if req.method == "OPTIONS" {
        return preflight();
    }

    let head = req.method == "HEAD";
    let method = if head { "GET" } else { req.method.as_str() };

    let mut response = route(state, method, &path, req)
        .await
        .unwrap_or_else(ServerError::into_response);
    if head {
        response.head_only = true;
    }
    if !response.has_header("Access-Control-Allow-Origin") {
        response = response.with_header("Access-Control-Allow-Origin", "*");
    }
    response
}

async fn route(
    state: &Arc<AppState>,
    method: &str,
    path: &str,
    req: &Request,
) -> Result<Response, ServerError> {
    match (method, path) {
        ("GET", "/") => Ok(index()),

        ("GET", "/v1/models") | ("GET", "/api/models") => openai::list_models(state),
        ("POST", "/v1/chat/completions") => openai::chat_completions(state, req).await,
        ("POST", "/v1/completions") => openai::completions(state, req).await,

        ("GET", "/api/tags") => ollama::tags(state),
        ("GET", "/api/version") => ollama::version(),
        ("GET", "/api/ps") => ollama::ps(),
        ("POST", "/api/chat") => ollama::chat(state, req).await,
        ("POST", "/api/generate") => ollama::generate(state, req).await,

        ("GET", "/debug/health") => debug::health(state),
        ("POST", "/debug/echo") => debug::echo(req),

        ("GET", p) if p.starts_with("/v1/models/") => {
            openai::get_model(state, &p["/v1/models/".len()..])
        }
        ("GET", p) if p.starts_with("/api/models/") => {
            openai::get_model(state, &p["/api/models/".len()..])
        }

        _ => Err(ServerError::NotFound(path.to_owned())),
    }
}

/// 204 with the permissive CORS header set.
fn preflight() -> Response {
    Response::no_content()
        .with_header("Access-Control-Allow-Origin", "*")
        .with_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS, HEAD")
        .with_header("Access-Control-Allow-Headers", "Content-Type, Authorization, Accept")
        .with_header("Access-Control-Max-Age", "600")
}

/// JSON index of the public surface, served at `/`.
fn index() -> Response {
    Response::json(
        200,
        &json!({
            "name": "pi-gateway",
            "endpoints": [
                "GET /v1/models",
                "GET /v1/models/{id}",
                "POST /v1/chat/completions",
                "POST /v1/completions",
                "GET /api/models",
                "GET /api/models/{id}",
                "GET /api/tags",
                "GET /api/version",
                "GET /api/ps",
                "POST /api/chat",
                "POST /api/generate",
                "GET /debug/health",
                "POST /debug/echo",
            ],
        }),
    )
}

/// Split text into windows of at most `size` characters, preserving char
/// boundaries.  Streaming paths emit one event per window.
pub(crate) fn chunk_chars(text: &str, size: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut count = 0;
    for c in text.chars() {
        current.push(c);
        count += 1;
        if count == size {
            out.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
