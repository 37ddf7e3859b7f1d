//! World state: the live entity registry.
//!
//! Each snapshot the backend sends is complete, so the registry is replaced
//! wholesale rather than merged field by field.

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Current status of one tracked entity.
///
/// The backend may write any JSON value into `owner` or `status`; non-string
/// values are kept as their JSON text.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EntityInfo {
    #[serde(default, deserialize_with = "lenient_text")]
    pub owner: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub status: Option<String>,
    /// Any other attributes the backend attached (value, last_seen, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EntityInfo {
    pub fn new(owner: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
            status: Some(status.into()),
            extra: BTreeMap::new(),
        }
    }
}

/// Entity name to current info, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct WorldState {
    items: BTreeMap<String, EntityInfo>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for constructing snapshots in tests.
    pub fn with_entity(mut self, name: impl Into<String>, info: EntityInfo) -> Self {
        self.items.insert(name.into(), info);
        self
    }

    pub fn get(&self, name: &str) -> Option<&EntityInfo> {
        self.items.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &EntityInfo)> {
        self.items.iter().map(|(name, info)| (name.as_str(), info))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }

    /// Entities currently owned by `owner`.
    pub fn owned_by<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a str> {
        self.items
            .iter()
            .filter(move |(_, info)| info.owner.as_deref() == Some(owner))
            .map(|(name, _)| name.as_str())
    }

    /// Replace the whole registry with `snapshot`.
    pub(crate) fn replace(&mut self, snapshot: WorldState) {
        *self = snapshot;
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

impl From<BTreeMap<String, EntityInfo>> for WorldState {
    fn from(items: BTreeMap<String, EntityInfo>) -> Self {
        Self { items }
    }
}
