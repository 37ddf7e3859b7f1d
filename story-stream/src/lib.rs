//! Minimal server-sent-events client for narrative story streams.
//!
//! This crate provides a focused client for long-lived `text/event-stream`
//! endpoints with:
//! - A single GET request per stream, no retries
//! - Incremental SSE decoding that tolerates arbitrary chunk boundaries
//! - Typed transport errors

use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CACHE_CONTROL};
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio_stream::Stream;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur while opening or reading a story stream.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream endpoint error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Stream closed by server")]
    Closed,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// A stream of decoded SSE messages.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<SseMessage, Error>> + Send>>;

/// SSE client for story endpoints.
#[derive(Clone)]
pub struct StoryStream {
    client: reqwest::Client,
}

impl StoryStream {
    /// Create a client with the default connect timeout.
    pub fn new() -> Result<Self, Error> {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a client with a custom connect timeout.
    ///
    /// There is deliberately no overall request timeout: a story stream stays
    /// open for as long as the backend keeps producing events.
    pub fn with_connect_timeout(timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Open `endpoint` and stream its SSE messages.
    ///
    /// The returned stream ends when the server closes the connection. A
    /// network failure mid-stream is yielded as an `Err` item.
    pub async fn connect(&self, endpoint: &str) -> Result<MessageStream, Error> {
        let response = self
            .client
            .get(endpoint)
            .headers(build_headers())
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status,
                message: body,
            });
        }

        tracing::debug!(endpoint, "story stream connected");

        // Use scan to carry the decoder's partial-line state across chunks
        let stream = response
            .bytes_stream()
            .scan(SseDecoder::new(), |decoder, result| {
                let messages = match result {
                    Ok(bytes) => decoder.push(&bytes).into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(Error::Network(e.to_string()))],
                };
                futures::future::ready(Some(messages))
            })
            .flat_map(futures::stream::iter);

        Ok(Box::pin(stream))
    }
}

fn build_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
}

// ============================================================================
// SSE decoding
// ============================================================================

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
    /// The `event:` field, if the server named the event.
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
    /// The last event id seen on the stream.
    pub id: Option<String>,
}

impl SseMessage {
    /// Whether this is a default `message` event.
    ///
    /// Named events are not delivered to a browser's `onmessage` handler, so
    /// feed consumers skip them.
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("") | Some("message"))
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes are buffered until a full line is available, so chunks may split
/// lines or multi-byte UTF-8 sequences anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: String,
    has_data: bool,
    event: Option<String>,
    last_event_id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning every message it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
        self.buffer.extend_from_slice(chunk);
        let mut messages = Vec::new();

        loop {
            // Find the next complete line (ending with \n)
            let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };

            let mut line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let line = String::from_utf8_lossy(&line);
            if let Some(message) = self.process_line(&line) {
                messages.push(message);
            }
        }

        messages
    }

    /// The most recent `id:` value seen.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    fn process_line(&mut self, line: &str) -> Option<SseMessage> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            // retry: and unknown fields
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseMessage> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        Some(SseMessage {
            event,
            data: std::mem::take(&mut self.data),
            id: self.last_event_id.clone(),
        })
    }
}
