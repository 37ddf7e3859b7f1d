//! Reconciliation of the incoming event stream.
//!
//! The engine is the single writer of session state. For every event it:
//! 1. Computes the event's fingerprint
//! 2. Drops it if that fingerprint was already accepted this session
//! 3. Otherwise appends it to the log, in arrival order
//! 4. Replaces the world state if the event carried a snapshot

use crate::event::NarrativeEvent;
use crate::fingerprint::FingerprintPolicy;
use crate::world::WorldState;
use std::collections::HashSet;

/// One accepted event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Position in the log, starting at 0.
    pub sequence: usize,
    pub fingerprint: String,
    pub event: NarrativeEvent,
}

/// Append-only, ingestion-ordered log of accepted events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn get(&self, sequence: usize) -> Option<&LogEntry> {
        self.entries.get(sequence)
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// The logged events, without bookkeeping.
    pub fn events(&self) -> impl Iterator<Item = &NarrativeEvent> {
        self.entries.iter().map(|entry| &entry.event)
    }

    fn push(&mut self, fingerprint: String, event: NarrativeEvent) {
        self.entries.push(LogEntry {
            sequence: self.entries.len(),
            fingerprint,
            event,
        });
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Result of ingesting one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestResult {
    pub accepted: bool,
    /// Whether the event replaced the world state.
    pub world_replaced: bool,
}

impl IngestResult {
    fn rejected() -> Self {
        Self {
            accepted: false,
            world_replaced: false,
        }
    }
}

/// Deduplicates events and projects them into the log and world state.
#[derive(Debug, Default)]
pub struct ReconciliationEngine {
    policy: FingerprintPolicy,
    seen: HashSet<String>,
    log: EventLog,
    world: WorldState,
    duplicates: usize,
}

impl ReconciliationEngine {
    /// Create an engine using the default fingerprint policy.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: FingerprintPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Ingest one event.
    ///
    /// At most one log entry and one world-state replacement happen per
    /// distinct fingerprint per session. Sentinel events are never logged.
    pub fn ingest(&mut self, event: NarrativeEvent) -> IngestResult {
        if event.is_sentinel() {
            return IngestResult::rejected();
        }

        let fingerprint = self.policy.fingerprint(&event);
        if !self.seen.insert(fingerprint.clone()) {
            self.duplicates += 1;
            tracing::trace!(%fingerprint, "suppressed duplicate event");
            return IngestResult::rejected();
        }

        let world_replaced = event.world_snapshot.is_some();
        if let Some(snapshot) = &event.world_snapshot {
            self.world.replace(snapshot.clone());
        }

        tracing::debug!(
            sequence = self.log.len(),
            kind = %event.kind,
            world_replaced,
            "accepted event"
        );
        self.log.push(fingerprint, event);

        IngestResult {
            accepted: true,
            world_replaced,
        }
    }

    /// Clear the log, world state, and seen fingerprints.
    pub fn reset(&mut self) {
        self.seen.clear();
        self.log.clear();
        self.world.clear();
        self.duplicates = 0;
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn policy(&self) -> FingerprintPolicy {
        self.policy
    }

    /// Whether an event with this fingerprint was already accepted.
    pub fn has_seen(&self, event: &NarrativeEvent) -> bool {
        self.seen.contains(&self.policy.fingerprint(event))
    }

    /// Number of distinct fingerprints accepted this session.
    pub fn fingerprint_count(&self) -> usize {
        self.seen.len()
    }

    /// Number of events suppressed as duplicates this session.
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}
