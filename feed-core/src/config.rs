//! Feed configuration.

use crate::fingerprint::FingerprintPolicy;
use crate::session::SessionError;
use std::time::Duration;

/// Stream endpoint used when nothing else is configured.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/stream-story";

/// Environment variable overriding the stream endpoint.
pub const ENDPOINT_VAR: &str = "NARRATIVE_STREAM_URL";

/// Environment variable overriding the fingerprint prefix length.
///
/// Accepts a character count, or `full` to fingerprint whole payloads.
pub const FINGERPRINT_VAR: &str = "NARRATIVE_FINGERPRINT_PREFIX";

/// Configuration for a narrative feed.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// The story stream endpoint.
    pub endpoint: String,

    /// How event fingerprints are computed.
    pub fingerprint: FingerprintPolicy,

    /// Timeout for establishing the stream connection.
    pub connect_timeout: Duration,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            fingerprint: FingerprintPolicy::default(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

impl FeedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from the process environment.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, SessionError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SessionError> {
        let mut config = Self::default();

        if let Some(endpoint) = lookup(ENDPOINT_VAR).filter(|v| !v.trim().is_empty()) {
            config.endpoint = endpoint.trim().to_string();
        }

        if let Some(value) = lookup(FINGERPRINT_VAR) {
            config.fingerprint = parse_policy(&value)?;
        }

        Ok(config)
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_fingerprint(mut self, policy: FingerprintPolicy) -> Self {
        self.fingerprint = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

fn parse_policy(value: &str) -> Result<FingerprintPolicy, SessionError> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("full") {
        return Ok(FingerprintPolicy::FullPayload);
    }

    value
        .parse::<usize>()
        .map(FingerprintPolicy::Prefix)
        .map_err(|_| {
            SessionError::Config(format!(
                "{FINGERPRINT_VAR} must be a character count or \"full\", got {value:?}"
            ))
        })
}
