//! Debug endpoints: health probe and request echo.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::error::ServerError;
use crate::http::{Request, Response};
use crate::state::AppState;

/// `GET /debug/health`.
pub fn health(state: &Arc<AppState>) -> Result<Response, ServerError> {
    Ok(Response::json(
        200,
        &json!({
            "status": "ok",
            "running": state.status.running(),
            "port": state.status.port(),
            "version": env!("CARGO_PKG_VERSION"),
        }),
    ))
}

/// `POST /debug/echo`: reflect the parsed request back to the caller.
/// Text bodies come back verbatim as `bodyUtf8`; binary bodies as a count.
pub fn echo(req: &Request) -> Result<Response, ServerError> {
    let mut headers = Map::new();
    for (key, value) in req.headers.iter() {
        headers.insert(key.to_owned(), Value::String(value.to_owned()));
    }

    let mut body = json!({
        "method": req.method,
        "path": req.path,
        "headers": headers,
    });
    match std::str::from_utf8(&req.body) {
        Ok(text) => body["bodyUtf8"] = Value::String(text.to_owned()),
        Err(_) => body["bodyBytes"] = Value::from(req.body.len()),
    }

    Ok(Response::json(200, &body))
}
