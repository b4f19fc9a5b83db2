//! Streaming-response engine.
//!
//! A streaming handler returns a driver callback; the connection writes the
//! chunked header block and then runs the driver against an [`Emitter`].
//! Every emit crosses an mpsc channel into the single writer loop that owns
//! the socket half, so concurrent emits queue instead of interleaving.  When
//! the driver returns, the engine writes the terminating zero chunk.

use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use super::codec::{encode_chunk, TERMINAL_CHUNK};
use super::StreamDriver;

/// Capacity of the emit queue feeding the writer loop.
const EMIT_QUEUE_DEPTH: usize = 32;

/// The peer went away (or the server is shutting down); the driver should
/// stop producing.
#[derive(Debug, PartialEq, Eq)]
pub struct StreamClosed;

pub type EmitResult = Result<(), StreamClosed>;

/// Handle handed to stream drivers.  Each call enqueues one chunk.
#[derive(Clone)]
pub struct Emitter {
    tx: mpsc::Sender<Vec<u8>>,
}

impl Emitter {
    /// SSE framing around a pre-serialized payload: `data: <raw>\n\n`.
    pub async fn sse_raw(&self, raw: &str) -> EmitResult {
        self.send(format!("data: {raw}\n\n").into_bytes()).await
    }

    /// SSE framing around a JSON value.
    pub async fn sse_json(&self, value: &Value) -> EmitResult {
        self.sse_raw(&value.to_string()).await
    }

    /// One NDJSON record: serialized value plus newline, flushed as a chunk.
    pub async fn ndjson(&self, value: &Value) -> EmitResult {
        self.send(format!("{value}\n").into_bytes()).await
    }

    async fn send(&self, payload: Vec<u8>) -> EmitResult {
        self.tx.send(payload).await.map_err(|_| StreamClosed)
    }
}

/// Run `driver` against `writer`, serializing all emits and closing the
/// stream with the terminal chunk.
///
/// A write error (peer closed mid-stream) aborts the loop; dropping the
/// receiver makes the driver's next emit fail with [`StreamClosed`], and the
/// driver future itself is dropped at its next suspension point.
pub async fn run_stream<W>(writer: &mut W, driver: StreamDriver) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel::<Vec<u8>>(EMIT_QUEUE_DEPTH);
    let fut = (driver)(Emitter { tx });
    tokio::pin!(fut);
    let mut driver_done = false;

    loop {
        tokio::select! {
            chunk = rx.recv() => match chunk {
                Some(data) => {
                    writer.write_all(&encode_chunk(&data)).await?;
                    writer.flush().await?;
                }
                // All senders gone: the driver (and its clones) finished.
                None => break,
            },
            _ = &mut fut, if !driver_done => {
                driver_done = true;
            }
        }
    }

    debug!("stream driver finished; writing terminal chunk");
    writer.write_all(TERMINAL_CHUNK).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod test {
    use futures::FutureExt;
    use serde_json::json;

    use super::*;

    fn driver<F, Fut>(f: F) -> StreamDriver
    where
        F: FnOnce(Emitter) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        Box::new(move |emitter| f(emitter).boxed())
    }

    #[tokio::test]
    async fn emits_are_framed_as_chunks_and_terminated() {
        let mut out = Vec::new();
        run_stream(
            &mut out,
            driver(|emitter| async move {
                emitter.sse_raw("one").await.unwrap();
                emitter.ndjson(&json!({"done": true})).await.unwrap();
            }),
        )
        .await
        .expect("stream should complete");

        let text = String::from_utf8(out).unwrap();
        // "data: one\n\n" is 11 bytes → hex "b".
        assert!(text.starts_with("b\r\ndata: one\n\n\r\n"));
        assert!(text.contains("{\"done\":true}\n"));
        assert!(text.ends_with("0\r\n\r\n"));
    }

    #[tokio::test]
    async fn sse_json_uses_data_prefix_and_double_newline() {
        let mut out = Vec::new();
        run_stream(
            &mut out,
            driver(|emitter| async move {
                emitter.sse_json(&json!({"a": 1})).await.unwrap();
            }),
        )
        .await
        .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("data: {\"a\":1}\n\n"));
    }

    #[tokio::test]
    async fn empty_driver_still_writes_terminal_chunk() {
        let mut out = Vec::new();
        run_stream(&mut out, driver(|_emitter| async move {}))
            .await
            .unwrap();
        assert_eq!(out, b"0\r\n\r\n");
    }
}
