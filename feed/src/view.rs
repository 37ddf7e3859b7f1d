//! Incremental terminal view of a feed.
//!
//! Snapshots arrive whole; the view remembers what it already printed and
//! only writes what changed.

use feed_core::render::{event_line, world_text};
use feed_core::{FeedSnapshot, SessionStatus, WorldState};
use std::io::{self, Write};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct FeedView {
    session_id: Option<Uuid>,
    printed: usize,
    world: WorldState,
    status: SessionStatus,
}

impl FeedView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write everything in `snapshot` not yet shown.
    pub fn apply(&mut self, snapshot: &FeedSnapshot, out: &mut impl Write) -> io::Result<()> {
        if snapshot.session_id != self.session_id {
            *self = Self {
                session_id: snapshot.session_id,
                ..Self::default()
            };
        }

        for entry in &snapshot.log.entries()[self.printed.min(snapshot.log.len())..] {
            writeln!(out, "{}", event_line(entry))?;
        }
        self.printed = snapshot.log.len();

        if snapshot.world != self.world {
            writeln!(out, "[WORLD]")?;
            if snapshot.world.is_empty() {
                writeln!(out, "  (empty)")?;
            }
            for line in world_text(&snapshot.world).lines() {
                writeln!(out, "  {line}")?;
            }
            self.world = snapshot.world.clone();
        }

        if snapshot.status != self.status {
            match &snapshot.last_error {
                Some(reason) if snapshot.status == SessionStatus::Disconnected => {
                    writeln!(out, "[STATUS] {} ({reason})", snapshot.status)?
                }
                _ => writeln!(out, "[STATUS] {}", snapshot.status)?,
            }
            self.status = snapshot.status;
        }

        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }
}
