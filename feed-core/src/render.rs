//! Plain-text projections of the feed and the world state.

use crate::engine::{EventLog, LogEntry};
use crate::event::{EventKind, NarrativeEvent};
use crate::world::{EntityInfo, WorldState};
use std::fmt::Write;

/// Owner shown for entities nobody holds.
pub const UNOWNED_LABEL: &str = "Common";

/// Who an event is attributed to.
///
/// Falls back to "Director" for director notes and to the type tag for
/// anything else without a performer.
pub fn performer_label(event: &NarrativeEvent) -> &str {
    match (&event.performer, &event.kind) {
        (Some(performer), _) => performer.as_str(),
        (None, EventKind::DirectorNote) => "Director",
        (None, kind) => kind.as_str(),
    }
}

/// Entity names use `_` for spaces; only the first is replaced.
pub fn entity_display_name(name: &str) -> String {
    name.replacen('_', " ", 1)
}

/// Render one feed entry, with its reasoning on an indented second line.
pub fn event_line(entry: &LogEntry) -> String {
    let event = &entry.event;
    let mut line = match event.turn {
        Some(turn) => format!("[{turn}] "),
        None => String::new(),
    };

    let _ = write!(
        line,
        "{}: {}",
        performer_label(event).to_uppercase(),
        event.payload_text()
    );
    if event.payload.is_none() {
        if let Some(message) = &event.message {
            line.push_str(message);
        }
    }
    if let Some(thought) = &event.thought {
        let _ = write!(line, "\n    thought: {thought}");
    }

    line
}

/// Render one world-state entry.
pub fn entity_line(name: &str, info: &EntityInfo) -> String {
    format!(
        "{}  owner: {}  status: {}",
        entity_display_name(name),
        info.owner.as_deref().unwrap_or(UNOWNED_LABEL),
        info.status.as_deref().unwrap_or("")
    )
}

/// Render the whole feed, one entry per line.
pub fn feed_text(log: &EventLog) -> String {
    log.iter().map(event_line).collect::<Vec<_>>().join("\n")
}

/// Render the world state, one entity per line.
pub fn world_text(world: &WorldState) -> String {
    world
        .iter()
        .map(|(name, info)| entity_line(name, info))
        .collect::<Vec<_>>()
        .join("\n")
}
