//! StreamIngestor - owns one streaming session end to end.
//!
//! A session runs from [`StreamIngestor::start_session`] until the stream
//! sends its `end` sentinel (`Completed`) or the transport fails
//! (`Disconnected`). Messages are handled one at a time through two entry
//! points, [`StreamIngestor::on_message`] and
//! [`StreamIngestor::on_transport_error`]; both are synchronous and do
//! nothing once the session has left `Running`.

use crate::config::FeedConfig;
use crate::engine::{EventLog, ReconciliationEngine};
use crate::event::{EventKind, NarrativeEvent};
use crate::fingerprint::FingerprintPolicy;
use crate::world::WorldState;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use story_stream::StoryStream;
use thiserror::Error;
use uuid::Uuid;

/// Errors from feed sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Stream error: {0}")]
    Stream(#[from] story_stream::Error),

    #[error("Malformed event: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionStatus {
    /// No session has been started yet.
    #[default]
    Idle,
    Running,
    /// The stream sent its end sentinel.
    Completed,
    /// The transport failed or was closed before the sentinel.
    Disconnected,
}

impl SessionStatus {
    /// Whether the session has ended, cleanly or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Disconnected)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Idle => "Idle",
            SessionStatus::Running => "Running...",
            SessionStatus::Completed => "Complete",
            SessionStatus::Disconnected => "Disconnected",
        };
        f.write_str(label)
    }
}

/// What happened to one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Appended to the log.
    Accepted,
    /// Suppressed by the fingerprint gate.
    Duplicate,
    /// Could not be parsed; dropped.
    Malformed,
    /// The end sentinel; the session is now `Completed`.
    Completed,
    /// The transport failed; the session is now `Disconnected`.
    Disconnected,
    /// Arrived while the session was not running.
    Ignored,
}

impl MessageOutcome {
    /// Whether the outcome changed anything a consumer renders.
    pub fn changes_state(&self) -> bool {
        matches!(
            self,
            MessageOutcome::Accepted | MessageOutcome::Completed | MessageOutcome::Disconnected
        )
    }
}

/// A stream of raw message payloads.
pub type RawMessageStream =
    Pin<Box<dyn Stream<Item = Result<String, story_stream::Error>> + Send>>;

/// Opens message streams for an endpoint.
pub trait Connector: Send + Sync {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<RawMessageStream, story_stream::Error>>;
}

impl Connector for StoryStream {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<RawMessageStream, story_stream::Error>> {
        Box::pin(async move {
            let messages = StoryStream::connect(self, endpoint).await?;
            let raw = messages.filter_map(|item| {
                futures::future::ready(match item {
                    Ok(message) if message.is_message() => Some(Ok(message.data)),
                    Ok(message) => {
                        tracing::trace!(event = ?message.event, "skipping named event");
                        None
                    }
                    Err(e) => Some(Err(e)),
                })
            });
            Ok(Box::pin(raw) as RawMessageStream)
        })
    }
}

impl<C: Connector + ?Sized> Connector for std::sync::Arc<C> {
    fn connect<'a>(
        &'a self,
        endpoint: &'a str,
    ) -> BoxFuture<'a, Result<RawMessageStream, story_stream::Error>> {
        (**self).connect(endpoint)
    }
}

/// Read-only copy of session state for presentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    pub session_id: Option<Uuid>,
    pub status: SessionStatus,
    pub log: EventLog,
    pub world: WorldState,
    /// Why the session disconnected, if it did.
    pub last_error: Option<String>,
}

/// Manages one streaming session at a time.
pub struct StreamIngestor<C = StoryStream> {
    connector: C,
    engine: ReconciliationEngine,
    status: SessionStatus,
    session_id: Option<Uuid>,
    endpoint: Option<String>,
    connection: Option<RawMessageStream>,
    last_error: Option<String>,
}

impl StreamIngestor<StoryStream> {
    /// Create an ingestor that connects over HTTP.
    pub fn from_config(config: &FeedConfig) -> Result<Self, SessionError> {
        let client = StoryStream::with_connect_timeout(config.connect_timeout)?;
        Ok(Self::new(client, config.fingerprint))
    }
}

impl<C: Connector> StreamIngestor<C> {
    pub fn new(connector: C, policy: FingerprintPolicy) -> Self {
        Self {
            connector,
            engine: ReconciliationEngine::with_policy(policy),
            status: SessionStatus::Idle,
            session_id: None,
            endpoint: None,
            connection: None,
            last_error: None,
        }
    }

    /// Reset all session state and open a stream to `endpoint`.
    ///
    /// If the stream cannot be opened the session is `Disconnected` and the
    /// error is returned; the reset has still happened.
    pub async fn start_session(&mut self, endpoint: &str) -> Result<Uuid, SessionError> {
        let session_id = self.reset_session(endpoint);
        self.open().await?;
        Ok(session_id)
    }

    /// Synchronous half of `start_session`: drop any previous connection and
    /// clear the log, world state, and fingerprints.
    pub(crate) fn reset_session(&mut self, endpoint: &str) -> Uuid {
        self.connection = None;
        self.engine.reset();
        self.last_error = None;

        let session_id = Uuid::new_v4();
        self.session_id = Some(session_id);
        self.endpoint = Some(endpoint.to_string());
        self.status = SessionStatus::Running;

        tracing::info!(%session_id, endpoint, "session started");
        session_id
    }

    /// Open the stream for the session prepared by `reset_session`.
    pub(crate) async fn open(&mut self) -> Result<(), SessionError> {
        if self.status != SessionStatus::Running || self.connection.is_some() {
            return Ok(());
        }
        let Some(endpoint) = self.endpoint.clone() else {
            return Ok(());
        };

        match self.connector.connect(&endpoint).await {
            Ok(stream) => {
                self.connection = Some(stream);
                Ok(())
            }
            Err(e) => {
                self.record_disconnect(e.to_string());
                Err(e.into())
            }
        }
    }

    /// Handle one raw inbound message.
    pub fn on_message(&mut self, raw: &str) -> MessageOutcome {
        if self.status != SessionStatus::Running {
            tracing::trace!("ignoring message for a closed session");
            return MessageOutcome::Ignored;
        }

        let event = match NarrativeEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(session_id = ?self.session_id, error = %e, "dropping malformed message");
                return MessageOutcome::Malformed;
            }
        };

        if event.is_sentinel() {
            self.connection = None;
            self.status = SessionStatus::Completed;
            tracing::info!(
                session_id = ?self.session_id,
                events = self.engine.log().len(),
                duplicates = self.engine.duplicates(),
                detail = event.message.as_deref().unwrap_or(""),
                "session completed"
            );
            return MessageOutcome::Completed;
        }

        if event.kind == EventKind::Error {
            tracing::warn!(
                session_id = ?self.session_id,
                detail = event.message.as_deref().unwrap_or(""),
                "backend reported an error"
            );
        }

        if self.engine.ingest(event).accepted {
            MessageOutcome::Accepted
        } else {
            MessageOutcome::Duplicate
        }
    }

    /// Handle a transport failure.
    pub fn on_transport_error(&mut self, error: story_stream::Error) -> MessageOutcome {
        if self.status != SessionStatus::Running {
            return MessageOutcome::Ignored;
        }
        self.record_disconnect(error.to_string());
        MessageOutcome::Disconnected
    }

    /// Close the connection. Idempotent.
    ///
    /// A session still running when closed ends as `Disconnected`.
    pub fn close(&mut self) {
        self.connection = None;
        if self.status == SessionStatus::Running {
            self.record_disconnect("session closed".to_string());
        }
    }

    /// Wait for the next transport item and dispatch it.
    ///
    /// Returns `None` when there is no open connection.
    pub async fn next_message(&mut self) -> Option<MessageOutcome> {
        let connection = self.connection.as_mut()?;
        let item = connection.next().await;
        let outcome = match item {
            Some(Ok(raw)) => self.on_message(&raw),
            Some(Err(e)) => self.on_transport_error(e),
            None => self.on_transport_error(story_stream::Error::Closed),
        };
        Some(outcome)
    }

    /// Process messages until the session ends.
    ///
    /// Opens the stream first if the running session has none yet.
    pub async fn run(&mut self) -> SessionStatus {
        if self.open().await.is_ok() {
            while self.next_message().await.is_some() {}
        }
        self.status
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// Whether a stream is currently open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn log(&self) -> &EventLog {
        self.engine.log()
    }

    pub fn world(&self) -> &WorldState {
        self.engine.world()
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Copy the consumer-facing state.
    pub fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            session_id: self.session_id,
            status: self.status,
            log: self.engine.log().clone(),
            world: self.engine.world().clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn record_disconnect(&mut self, reason: String) {
        self.connection = None;
        self.status = SessionStatus::Disconnected;
        tracing::warn!(session_id = ?self.session_id, %reason, "session disconnected");
        self.last_error = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedConnector, ScriptedItem};

    fn ingestor() -> StreamIngestor<ScriptedConnector> {
        StreamIngestor::new(ScriptedConnector::new(), FingerprintPolicy::default())
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(SessionStatus::Idle.to_string(), "Idle");
        assert_eq!(SessionStatus::Running.to_string(), "Running...");
        assert_eq!(SessionStatus::Completed.to_string(), "Complete");
        assert_eq!(SessionStatus::Disconnected.to_string(), "Disconnected");
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Completed.is_terminal());
    }

    #[test]
    fn test_messages_ignored_before_start() {
        let mut ingestor = ingestor();
        assert_eq!(ingestor.status(), SessionStatus::Idle);
        assert_eq!(
            ingestor.on_message(r#"{"turn": 1, "type": "action", "action": "x"}"#),
            MessageOutcome::Ignored
        );
        assert!(ingestor.log().is_empty());
    }

    #[test]
    fn test_on_message_dispatch() {
        let mut ingestor = ingestor();
        ingestor.reset_session("scripted://story");

        let action = r#"{"turn": 1, "type": "action", "action": "Alice opens the door"}"#;
        assert_eq!(ingestor.on_message(action), MessageOutcome::Accepted);
        assert_eq!(ingestor.on_message(action), MessageOutcome::Duplicate);
        assert_eq!(ingestor.on_message("{oops"), MessageOutcome::Malformed);
        assert_eq!(ingestor.status(), SessionStatus::Running);

        assert_eq!(ingestor.on_message(r#"{"type": "end"}"#), MessageOutcome::Completed);
        assert_eq!(ingestor.status(), SessionStatus::Completed);
        assert_eq!(ingestor.log().len(), 1);
    }

    #[test]
    fn test_late_messages_after_completion_are_ignored() {
        let mut ingestor = ingestor();
        ingestor.reset_session("scripted://story");
        ingestor.on_message(r#"{"type": "end"}"#);

        let late = r#"{"turn": 9, "type": "action", "action": "too late"}"#;
        assert_eq!(ingestor.on_message(late), MessageOutcome::Ignored);
        assert_eq!(ingestor.on_message(r#"{"type": "end"}"#), MessageOutcome::Ignored);
        assert_eq!(
            ingestor.on_transport_error(story_stream::Error::Closed),
            MessageOutcome::Ignored
        );
        assert_eq!(ingestor.status(), SessionStatus::Completed);
        assert!(ingestor.log().is_empty());
    }

    #[test]
    fn test_transport_error_disconnects() {
        let mut ingestor = ingestor();
        ingestor.reset_session("scripted://story");

        let outcome =
            ingestor.on_transport_error(story_stream::Error::Network("connection reset".into()));
        assert_eq!(outcome, MessageOutcome::Disconnected);
        assert_eq!(ingestor.status(), SessionStatus::Disconnected);
        assert!(ingestor.last_error().unwrap().contains("connection reset"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut ingestor = ingestor();
        ingestor.close();
        assert_eq!(ingestor.status(), SessionStatus::Idle);

        ingestor.reset_session("scripted://story");
        ingestor.close();
        ingestor.close();
        assert_eq!(ingestor.status(), SessionStatus::Disconnected);
        assert!(!ingestor.is_connected());
    }

    #[test]
    fn test_reset_starts_a_fresh_session() {
        let mut ingestor = ingestor();
        let first = ingestor.reset_session("scripted://story");
        ingestor.on_message(
            r#"{"turn": 1, "type": "action", "action": "pick up lantern",
                "entity_updates": {"items": {"lantern": {"owner": "Alice", "status": "carried"}}}}"#,
        );
        ingestor.on_message(r#"{"type": "end"}"#);

        let second = ingestor.reset_session("scripted://story");
        assert_ne!(first, second);
        assert_eq!(ingestor.status(), SessionStatus::Running);
        assert!(ingestor.log().is_empty());
        assert!(ingestor.world().is_empty());
        assert_eq!(ingestor.engine().fingerprint_count(), 0);
    }

    #[tokio::test]
    async fn test_run_until_sentinel() {
        let connector = ScriptedConnector::new().with_stream(vec![
            ScriptedItem::message(r#"{"turn": 1, "type": "dialogue", "speaker": "Bob", "content": "Hello?"}"#),
            ScriptedItem::message(r#"{"type": "end"}"#),
            ScriptedItem::message(r#"{"turn": 2, "type": "dialogue", "content": "after the end"}"#),
        ]);
        let mut ingestor = StreamIngestor::new(connector, FingerprintPolicy::default());

        ingestor.start_session("scripted://story").await.unwrap();
        assert_eq!(ingestor.run().await, SessionStatus::Completed);
        assert_eq!(ingestor.log().len(), 1);
        assert!(!ingestor.is_connected());
        assert_eq!(ingestor.next_message().await, None);
    }

    #[tokio::test]
    async fn test_run_opens_a_reset_session() {
        let connector = ScriptedConnector::new().with_stream(vec![
            ScriptedItem::message(r#"{"turn": 1, "type": "action", "action": "lights the lamp"}"#),
            ScriptedItem::message(r#"{"type": "end"}"#),
        ]);
        let mut ingestor = StreamIngestor::new(connector, FingerprintPolicy::default());

        ingestor.reset_session("scripted://story");
        assert!(!ingestor.is_connected());

        assert_eq!(ingestor.run().await, SessionStatus::Completed);
        assert_eq!(ingestor.log().len(), 1);
        assert_eq!(ingestor.connector().connection_count(), 1);
    }

    #[tokio::test]
    async fn test_run_before_start_returns_idle() {
        let mut ingestor = ingestor();
        assert_eq!(ingestor.run().await, SessionStatus::Idle);
        assert_eq!(ingestor.connector().connection_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_end_without_sentinel_disconnects() {
        let connector = ScriptedConnector::new().with_stream(vec![ScriptedItem::message(
            r#"{"turn": 1, "type": "action", "action": "walks away"}"#,
        )]);
        let mut ingestor = StreamIngestor::new(connector, FingerprintPolicy::default());

        ingestor.start_session("scripted://story").await.unwrap();
        assert_eq!(ingestor.run().await, SessionStatus::Disconnected);
        assert_eq!(ingestor.log().len(), 1);
        assert_eq!(ingestor.last_error(), Some("Stream closed by server"));
    }

    #[tokio::test]
    async fn test_refused_connection_disconnects() {
        let connector = ScriptedConnector::new().with_refusal(503);
        let mut ingestor = StreamIngestor::new(connector, FingerprintPolicy::default());

        let err = ingestor.start_session("scripted://story").await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Stream(story_stream::Error::Api { status: 503, .. })
        ));
        assert_eq!(ingestor.status(), SessionStatus::Disconnected);
        assert!(ingestor.session_id().is_some());
    }
}
