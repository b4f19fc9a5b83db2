//! Unified server error type.
//!
//! Handlers return `Result<Response, ServerError>`; the router converts any
//! error into the wire shape the failing dialect expects.  Internal errors
//! are logged with full detail but surface only a generic message, so
//! backend internals never leak to clients.

use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::http::Response;

/// All errors that can occur in the request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Malformed request body or parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The model id in `/v1/models/{id}` does not exist.
    #[error("model not found: {0}")]
    UnknownModel(String),

    /// Route exists for no handler.
    #[error("not found: {0}")]
    NotFound(String),

    /// An unclassified internal failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Convert into the wire response for this error kind.
    pub fn into_response(self) -> Response {
        match self {
            ServerError::BadRequest(message) => {
                Response::json(400, &json!({ "error": { "message": message } }))
            }
            ServerError::UnknownModel(_) => Response::json(
                404,
                &json!({
                    "error": {
                        "message": "Model not found",
                        "type": "invalid_request_error",
                    }
                }),
            ),
            ServerError::NotFound(_) => Response::text(404, "Not Found"),
            ServerError::Internal(message) => {
                error!(message = %message, "internal server error");
                Response::json(500, &json!({ "error": { "message": "internal server error" } }))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::http::Body;

    fn body_json(response: &Response) -> serde_json::Value {
        match &response.body {
            Body::Bytes(bytes) => serde_json::from_slice(bytes).expect("body should be JSON"),
            Body::Stream(_) => panic!("unexpected stream body"),
        }
    }

    #[test]
    fn bad_request_carries_the_detail() {
        let resp = ServerError::BadRequest("missing field".into()).into_response();
        assert_eq!(resp.status, 400);
        assert_eq!(body_json(&resp)["error"]["message"], "missing field");
    }

    #[test]
    fn unknown_model_uses_the_openai_error_envelope() {
        let resp = ServerError::UnknownModel("gpt-9".into()).into_response();
        assert_eq!(resp.status, 404);
        let body = body_json(&resp);
        assert_eq!(body["error"]["message"], "Model not found");
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let resp = ServerError::Internal("sqlite path /secret".into()).into_response();
        assert_eq!(resp.status, 500);
        assert_eq!(body_json(&resp)["error"]["message"], "internal server error");
    }
}
