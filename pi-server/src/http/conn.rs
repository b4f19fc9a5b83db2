//! Per-connection request handling.
//!
//! Each accepted socket gets its own task: bytes accumulate in a buffer
//! until the head terminator and the declared body length are satisfied,
//! the single request is dispatched, the response (fixed or streamed) is
//! written, and the connection closes.  The handler is generic over the
//! stream type so tests can drive it with in-memory duplex pipes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::ServerError;
use crate::http::{codec, stream, Body, Request, Response};
use crate::routes;
use crate::state::AppState;

/// Bodies beyond this sanity limit are refused with 413.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Wall-clock bound on handler dispatch.  Streaming handlers return their
/// driver immediately, so this effectively binds non-streaming work only.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Log-preview cap for request bodies unless full logging is enabled.
const BODY_LOG_PREVIEW_BYTES: usize = 2048;

/// Serve exactly one request on `stream`, then close.
pub async fn serve_connection<S>(
    stream_io: S,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut reader, mut writer) = tokio::io::split(stream_io);
    let mut buf = BytesMut::with_capacity(8 * 1024);

    // ── Head ──────────────────────────────────────────────────────────────────
    let head_end = loop {
        if let Some(end) = codec::find_head_end(&buf) {
            break end;
        }
        if buf.len() > MAX_BODY_BYTES {
            write_simple(&mut writer, Response::text(413, "Payload Too Large")).await;
            return;
        }
        tokio::select! {
            _ = shutdown.changed() => return,
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    // Peer closed before a complete head arrived.
                    write_simple(
                        &mut writer,
                        Response::text(400, "malformed request: incomplete head"),
                    )
                    .await;
                    return;
                }
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "connection read error");
                    return;
                }
            }
        }
    };

    let parsed = match codec::parse_head(&buf[..head_end - 4]) {
        Ok(parsed) => parsed,
        Err(e) => {
            write_simple(
                &mut writer,
                Response::text(400, &format!("malformed request: {}", e.0)),
            )
            .await;
            return;
        }
    };

    // ── Body ──────────────────────────────────────────────────────────────────
    let body = match parsed.content_length {
        Some(len) => {
            if len > MAX_BODY_BYTES {
                write_simple(&mut writer, Response::text(413, "Payload Too Large")).await;
                return;
            }
            let total = head_end + len;
            while buf.len() < total {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    read = reader.read_buf(&mut buf) => match read {
                        Ok(0) => {
                            write_simple(
                                &mut writer,
                                Response::text(400, "malformed request: body shorter than content-length"),
                            )
                            .await;
                            return;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            debug!(error = %e, "connection read error");
                            return;
                        }
                    }
                }
            }
            buf[head_end..total].to_vec()
        }
        // No declared length: whatever arrived with the head is the body.
        None => buf[head_end..].to_vec(),
    };

    let request = Request {
        method: parsed.method,
        path: parsed.target,
        headers: parsed.headers,
        body,
    };
    // Short id correlating every log line for this request.
    let request_id = short_request_id();
    log_request_body(&state, &request, &request_id);

    // ── Dispatch ──────────────────────────────────────────────────────────────
    let started = Instant::now();
    let method = request.method.clone();
    let path = request.path.clone();

    let response = tokio::select! {
        _ = shutdown.changed() => return,
        outcome = tokio::time::timeout(REQUEST_TIMEOUT, routes::dispatch(&state, &request)) => {
            match outcome {
                Ok(response) => response,
                Err(_) => {
                    warn!(request_id = %request_id, %method, %path, "request timed out");
                    ServerError::Internal("request timed out".into())
                        .into_response()
                        .with_header("Access-Control-Allow-Origin", "*")
                }
            }
        }
    };

    // ── Write ─────────────────────────────────────────────────────────────────
    let status = response.status;
    let mut headers = response.headers;
    headers.push(("Connection".to_owned(), "close".to_owned()));

    match response.body {
        Body::Bytes(bytes) => {
            let out = codec::serialize_response(status, &headers, &bytes, response.head_only);
            if let Err(e) = writer.write_all(&out).await {
                debug!(error = %e, "response write failed");
                return;
            }
            let _ = writer.flush().await;
        }
        Body::Stream(driver) => {
            let head = codec::serialize_stream_head(status, &headers);
            if writer.write_all(&head).await.is_err() {
                return;
            }
            tokio::select! {
                _ = shutdown.changed() => return,
                result = stream::run_stream(&mut writer, driver) => {
                    if let Err(e) = result {
                        debug!(error = %e, "stream aborted");
                    }
                }
            }
        }
    }

    let _ = writer.shutdown().await;
    info!(
        request_id = %request_id,
        %method,
        %path,
        status,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request served"
    );
}

/// Eight hex chars of a fresh uuid; enough to correlate log lines.
fn short_request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_owned()
}

/// Write a pre-routing response (parse failures, size refusals) with the
/// headers every response must carry.
async fn write_simple<W: AsyncWrite + Unpin>(writer: &mut W, response: Response) {
    let mut headers = response.headers;
    headers.push(("Access-Control-Allow-Origin".to_owned(), "*".to_owned()));
    headers.push(("Connection".to_owned(), "close".to_owned()));
    let body = match response.body {
        Body::Bytes(bytes) => bytes,
        Body::Stream(_) => Vec::new(),
    };
    let out = codec::serialize_response(response.status, &headers, &body, false);
    let _ = writer.write_all(&out).await;
    let _ = writer.shutdown().await;
}

fn log_request_body(state: &AppState, request: &Request, request_id: &str) {
    if request.body.is_empty() {
        return;
    }
    let full = state.config.debug_full_log || state.settings.debug_full_request_log;
    let shown = if full {
        request.body.len()
    } else {
        request.body.len().min(BODY_LOG_PREVIEW_BYTES)
    };
    let body = String::from_utf8_lossy(&request.body[..shown]);
    let truncated = shown < request.body.len();
    if state.settings.debug_logging {
        info!(%request_id, body_len = request.body.len(), body = %body, truncated, "request body");
    } else {
        debug!(%request_id, body_len = request.body.len(), body = %body, truncated, "request body");
    }
}
