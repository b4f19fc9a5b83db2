//! Minimal HTTP/1.1 machinery.
//!
//! The gateway speaks HTTP straight off the socket: [`conn`] accumulates raw
//! bytes into one parsed [`Request`] per connection, [`codec`] handles the
//! request-line/header grammar and response framing, and [`stream`] layers
//! SSE / NDJSON emission on chunked transfer-encoding.  One request, one
//! response, then the connection closes; there is no keep-alive.

pub mod codec;
pub mod conn;
pub mod stream;

use std::collections::HashMap;

use futures::future::BoxFuture;
use serde::Serialize;

use crate::error::ServerError;
use stream::Emitter;

/// Case-insensitive header map; keys are stored lowercase.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: HashMap<String, String>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        self.entries
            .insert(key.to_ascii_lowercase(), value.trim().to_owned());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&key.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One parsed request.  `path` is the raw request target; the router
/// normalizes it (query and trailing-slash stripping) before dispatch.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Request {
    /// Decode the body as JSON, mapping failures to a 400.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ServerError> {
        serde_json::from_slice(&self.body)
            .map_err(|e| ServerError::BadRequest(format!("invalid JSON body: {e}")))
    }
}

/// Async callback that produces a streaming body through an [`Emitter`].
pub type StreamDriver = Box<dyn FnOnce(Emitter) -> BoxFuture<'static, ()> + Send>;

/// Response payload: fully materialized bytes or a stream driver.
pub enum Body {
    Bytes(Vec<u8>),
    Stream(StreamDriver),
}

/// One response.  Header order is preserved as inserted; the connection
/// writer appends framing headers (`Content-Length` or chunked) itself.
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Body,
    /// Serialize headers as if the body were present, but send no body
    /// (HEAD mirror of a GET).
    pub head_only: bool,
}

impl Response {
    pub fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".to_owned(), content_type.to_owned())],
            body: Body::Bytes(body),
            head_only: false,
        }
    }

    pub fn json(status: u16, value: &impl Serialize) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self::new(status, "application/json", body)
    }

    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body.as_bytes().to_vec())
    }

    pub fn no_content() -> Self {
        Self {
            status: 204,
            headers: Vec::new(),
            body: Body::Bytes(Vec::new()),
            head_only: false,
        }
    }

    /// A chunked streaming response driven by `driver` after the headers.
    pub fn stream(content_type: &str, driver: StreamDriver) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".to_owned(), content_type.to_owned())],
            body: Body::Stream(driver),
            head_only: false,
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_owned(), value.to_owned()));
        self
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
    }
}
