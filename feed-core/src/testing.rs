//! Testing utilities for narrative feeds.
//!
//! This module provides tools for integration testing:
//! - `ScriptedConnector` for deterministic streams without a backend
//! - `TestHarness` for feeding raw messages into a running session
//! - Assertion helpers for verifying feed state

use crate::engine::EventLog;
use crate::fingerprint::FingerprintPolicy;
use crate::session::{Connector, MessageOutcome, RawMessageStream, SessionStatus, StreamIngestor};
use crate::world::WorldState;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Endpoint used by scripted sessions.
pub const TEST_ENDPOINT: &str = "scripted://stream-story";

/// One item a scripted stream yields.
#[derive(Debug, Clone)]
pub enum ScriptedItem {
    /// A raw message payload.
    Message(String),
    /// A transport failure.
    Failure(String),
}

impl ScriptedItem {
    pub fn message(raw: impl Into<String>) -> Self {
        ScriptedItem::Message(raw.into())
    }

    /// A message whose payload is the given JSON value.
    pub fn event(value: serde_json::Value) -> Self {
        ScriptedItem::Message(value.to_string())
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        ScriptedItem::Failure(reason.into())
    }
}

#[derive(Debug, Clone)]
enum ScriptedSession {
    Stream {
        items: Vec<ScriptedItem>,
        hold_open: bool,
    },
    Refuse {
        status: u16,
    },
    Stall,
}

/// A connector that plays back scripted streams, one per connection.
///
/// Connections beyond the scripted ones fail with a network error.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    sessions: Mutex<VecDeque<ScriptedSession>>,
    endpoints: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a stream that yields `items` and then ends.
    pub fn with_stream(self, items: Vec<ScriptedItem>) -> Self {
        self.push(ScriptedSession::Stream {
            items,
            hold_open: false,
        })
    }

    /// Script a stream that yields `items` and then stays open forever.
    pub fn with_open_stream(self, items: Vec<ScriptedItem>) -> Self {
        self.push(ScriptedSession::Stream {
            items,
            hold_open: true,
        })
    }

    /// Script a connection the server refuses with `status`.
    pub fn with_refusal(self, status: u16) -> Self {
        self.push(ScriptedSession::Refuse { status })
    }

    /// Script a connection attempt that never completes.
    pub fn with_stalled_connect(self) -> Self {
        self.push(ScriptedSession::Stall)
    }

    /// Endpoints connected to so far, in order.
    pub fn endpoints(&self) -> Vec<String> {
        lock(&self.endpoints).clone()
    }

    pub fn connection_count(&self) -> usize {
        lock(&self.endpoints).len()
    }

    fn push(self, session: ScriptedSession) -> Self {
        lock(&self.sessions).push_back(session);
        self
    }
}

impl Connector for ScriptedConnector {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<RawMessageStream, story_stream::Error>> {
        lock(&self.endpoints).push(endpoint.to_string());
        let next = lock(&self.sessions).pop_front();

        let result = match next {
            Some(ScriptedSession::Stream { items, hold_open }) => Ok(scripted_stream(items, hold_open)),
            Some(ScriptedSession::Refuse { status }) => Err(story_stream::Error::Api {
                status,
                message: "refused by script".to_string(),
            }),
            Some(ScriptedSession::Stall) => return Box::pin(futures::future::pending()),
            None => Err(story_stream::Error::Network(
                "no scripted session left".to_string(),
            )),
        };
        Box::pin(futures::future::ready(result))
    }
}

fn scripted_stream(items: Vec<ScriptedItem>, hold_open: bool) -> RawMessageStream {
    let items = futures::stream::iter(items.into_iter().map(|item| match item {
        ScriptedItem::Message(raw) => Ok(raw),
        ScriptedItem::Failure(reason) => Err(story_stream::Error::Network(reason)),
    }));

    if hold_open {
        Box::pin(items.chain(futures::stream::pending()))
    } else {
        Box::pin(items)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Test harness driving a session by hand, one message at a time.
pub struct TestHarness {
    pub ingestor: StreamIngestor<ScriptedConnector>,
}

impl TestHarness {
    /// Create a harness with a running session and the default policy.
    pub fn new() -> Self {
        Self::with_policy(FingerprintPolicy::default())
    }

    pub fn with_policy(policy: FingerprintPolicy) -> Self {
        let mut ingestor = StreamIngestor::new(ScriptedConnector::new(), policy);
        ingestor.reset_session(TEST_ENDPOINT);
        Self { ingestor }
    }

    /// Deliver a raw message.
    pub fn feed(&mut self, raw: &str) -> MessageOutcome {
        self.ingestor.on_message(raw)
    }

    /// Deliver a JSON event.
    pub fn feed_event(&mut self, value: serde_json::Value) -> MessageOutcome {
        self.ingestor.on_message(&value.to_string())
    }

    /// Deliver several JSON events in order.
    pub fn feed_events(
        &mut self,
        values: impl IntoIterator<Item = serde_json::Value>,
    ) -> Vec<MessageOutcome> {
        values.into_iter().map(|v| self.feed_event(v)).collect()
    }

    /// Simulate a transport failure.
    pub fn drop_connection(&mut self, reason: &str) -> MessageOutcome {
        self.ingestor
            .on_transport_error(story_stream::Error::Network(reason.to_string()))
    }

    /// Start a fresh session on the same harness.
    pub fn restart(&mut self) -> Uuid {
        self.ingestor.reset_session(TEST_ENDPOINT)
    }

    pub fn status(&self) -> SessionStatus {
        self.ingestor.status()
    }

    pub fn log(&self) -> &EventLog {
        self.ingestor.log()
    }

    pub fn world(&self) -> &WorldState {
        self.ingestor.world()
    }

    /// Payload text of every logged event, in order.
    pub fn payloads(&self) -> Vec<String> {
        self.log()
            .events()
            .map(|e| e.payload_text().to_string())
            .collect()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the session is in `expected` status.
#[track_caller]
pub fn assert_status(harness: &TestHarness, expected: SessionStatus) {
    assert_eq!(
        harness.status(),
        expected,
        "Expected session status {expected:?}"
    );
}

/// Assert the event log has exactly `expected` entries.
#[track_caller]
pub fn assert_log_len(harness: &TestHarness, expected: usize) {
    let actual = harness.log().len();
    assert_eq!(
        actual, expected,
        "Expected {expected} logged events, got {actual}: {:?}",
        harness.payloads()
    );
}

/// Assert the world state holds exactly the named entities.
#[track_caller]
pub fn assert_world_entities(harness: &TestHarness, expected: &[&str]) {
    let actual: Vec<&str> = harness.world().names().collect();
    let mut expected = expected.to_vec();
    expected.sort_unstable();
    assert_eq!(actual, expected, "Unexpected world state entities");
}
