//! Narrative events as delivered by the story stream.
//!
//! The backend sends loosely-shaped JSON records. They are parsed once into
//! a [`NarrativeEvent`] with the performer and payload aliases already
//! resolved, so nothing downstream has to know that `speaker`/`character`
//! and `content`/`action` are interchangeable.

use crate::session::SessionError;
use crate::world::{EntityInfo, WorldState};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The `type` tag of a narrative event.
///
/// The tag set is open-ended; anything unrecognised is kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum EventKind {
    Dialogue,
    Action,
    DirectorNote,
    MysteryClue,
    /// Terminal sentinel, ends the session.
    End,
    /// Backend failure report.
    Error,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Dialogue => "dialogue",
            EventKind::Action => "action",
            EventKind::DirectorNote => "director_note",
            EventKind::MysteryClue => "mystery_clue",
            EventKind::End => "end",
            EventKind::Error => "error",
            EventKind::Other(tag) => tag,
        }
    }
}

impl From<String> for EventKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "dialogue" => EventKind::Dialogue,
            "action" => EventKind::Action,
            "director_note" => EventKind::DirectorNote,
            "mystery_clue" => EventKind::MysteryClue,
            "end" => EventKind::End,
            "error" => EventKind::Error,
            _ => EventKind::Other(tag),
        }
    }
}

impl From<&str> for EventKind {
    fn from(tag: &str) -> Self {
        EventKind::from(tag.to_string())
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed narrative event.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "WireEvent")]
pub struct NarrativeEvent {
    /// Story turn. Absent on sentinel and backend error records.
    pub turn: Option<i64>,
    pub kind: EventKind,
    /// `speaker`, falling back to `character`.
    pub performer: Option<String>,
    /// `content`, falling back to `action`.
    pub payload: Option<String>,
    /// Agent reasoning shown alongside the event. Never fingerprinted.
    pub thought: Option<String>,
    /// Backend status text carried by `end` and `error` records.
    pub message: Option<String>,
    /// Complete entity registry snapshot, if the event carried one.
    pub world_snapshot: Option<WorldState>,
}

impl NarrativeEvent {
    /// Create an event of the given kind with no other fields.
    pub fn new(kind: impl Into<EventKind>) -> Self {
        Self {
            turn: None,
            kind: kind.into(),
            performer: None,
            payload: None,
            thought: None,
            message: None,
            world_snapshot: None,
        }
    }

    /// Parse one raw stream message.
    ///
    /// A record tagged `end` is always the sentinel, whatever else it
    /// carries. Every other record must match the event shape.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let value: Value = serde_json::from_str(raw)?;
        if value.get("type").and_then(Value::as_str) == Some(EventKind::End.as_str()) {
            return Ok(Self::sentinel(&value));
        }
        Ok(serde_json::from_value(value)?)
    }

    fn sentinel(value: &Value) -> Self {
        let mut event = Self::new(EventKind::End);
        event.turn = value.get("turn").and_then(Value::as_i64);
        event.message = value
            .get("message")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
            .map(str::to_string);
        event
    }

    pub fn with_turn(mut self, turn: i64) -> Self {
        self.turn = Some(turn);
        self
    }

    pub fn with_performer(mut self, performer: impl Into<String>) -> Self {
        self.performer = Some(performer.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_thought(mut self, thought: impl Into<String>) -> Self {
        self.thought = Some(thought.into());
        self
    }

    pub fn with_world_snapshot(mut self, snapshot: WorldState) -> Self {
        self.world_snapshot = Some(snapshot);
        self
    }

    /// Whether this is the end-of-stream sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.kind == EventKind::End
    }

    /// The textual payload, or `""`.
    pub fn payload_text(&self) -> &str {
        self.payload.as_deref().unwrap_or("")
    }
}

// ============================================================================
// Wire format
// ============================================================================

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default)]
    turn: Option<i64>,
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(default)]
    speaker: Option<String>,
    #[serde(default)]
    character: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    agentic_reasoning: Option<WireReasoning>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    entity_updates: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireReasoning {
    #[serde(default)]
    thought: Option<String>,
}

impl From<WireEvent> for NarrativeEvent {
    fn from(wire: WireEvent) -> Self {
        Self {
            turn: wire.turn,
            kind: wire.kind,
            performer: first_present(wire.speaker, wire.character),
            payload: first_present(wire.content, wire.action),
            thought: wire
                .agentic_reasoning
                .and_then(|r| r.thought)
                .filter(|t| !t.is_empty()),
            message: wire.message.filter(|m| !m.is_empty()),
            world_snapshot: wire
                .entity_updates
                .and_then(|mut updates| updates.get_mut("items").map(Value::take))
                .filter(|items| !items.is_null())
                .and_then(world_from_items),
        }
    }
}

/// An unreadable snapshot is dropped on its own; the event still counts.
fn world_from_items(items: Value) -> Option<WorldState> {
    match serde_json::from_value::<BTreeMap<String, EntityInfo>>(items) {
        Ok(items) => Some(WorldState::from(items)),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable world snapshot");
            None
        }
    }
}

/// Empty strings count as absent.
fn first_present(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|s| !s.is_empty())
        .or_else(|| fallback.filter(|s| !s.is_empty()))
}
