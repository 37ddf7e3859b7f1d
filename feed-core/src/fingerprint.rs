//! Event fingerprints for duplicate suppression.
//!
//! A fingerprint is `"{turn}-{type}-{payload prefix}"`. Two events that agree
//! on turn and type and whose payloads share the same prefix collide and are
//! treated as the same event. That is a known limitation of the prefix
//! policy; [`FingerprintPolicy::FullPayload`] avoids it at the cost of
//! letting replays with a trailing edit through.

use crate::event::NarrativeEvent;

/// Characters of payload used by the default policy.
pub const DEFAULT_PREFIX_CHARS: usize = 30;

/// How much of the payload goes into a fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintPolicy {
    /// First `n` characters (Unicode scalar values) of the payload.
    Prefix(usize),
    /// The whole payload.
    FullPayload,
}

impl Default for FingerprintPolicy {
    fn default() -> Self {
        FingerprintPolicy::Prefix(DEFAULT_PREFIX_CHARS)
    }
}

impl FingerprintPolicy {
    /// Compute the fingerprint of `event` under this policy.
    pub fn fingerprint(&self, event: &NarrativeEvent) -> String {
        let payload = event.payload_text();
        let snippet = match *self {
            FingerprintPolicy::Prefix(chars) => truncate_chars(payload, chars),
            FingerprintPolicy::FullPayload => payload,
        };
        let turn = event.turn.map(|t| t.to_string()).unwrap_or_default();

        format!("{turn}-{}-{snippet}", event.kind)
    }
}

fn truncate_chars(s: &str, chars: usize) -> &str {
    match s.char_indices().nth(chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
