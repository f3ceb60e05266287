use std::collections::BTreeSet;

use super::KeyValueStore;
use crate::common::MessageId;
use crate::error::Result;

pub const DEFAULT_READ_STATE_KEY: &str = "read_ids";

/// Locally acknowledged message and notification ids, stored as one JSON array.
///
/// The key is shared by every account using the same store.
#[derive(Clone)]
pub struct ReadStateStore<S> {
    store: S,
    key: String,
}

impl<S: KeyValueStore> ReadStateStore<S> {
    pub fn new(store: S) -> Self {
        Self::with_key(store, DEFAULT_READ_STATE_KEY)
    }

    pub fn with_key(store: S, key: impl Into<String>) -> Self {
        Self { store, key: key.into() }
    }

    /// Missing, unreadable or malformed state reads as an empty set.
    pub fn read_ids(&self) -> BTreeSet<MessageId> {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return BTreeSet::new(),
            Err(err) => {
                log::warn!("Failed to read `{}` from store: {err}", self.key);
                return BTreeSet::new();
            }
        };

        match serde_json::from_str::<Vec<MessageId>>(&raw) {
            Ok(ids) => ids.into_iter().collect(),
            Err(err) => {
                log::warn!("Ignoring malformed read state under `{}`: {err}", self.key);
                BTreeSet::new()
            }
        }
    }

    pub fn is_read(&self, id: &MessageId) -> bool {
        self.read_ids().contains(id)
    }

    /// Union `ids` into the stored set. Returns how many were newly marked.
    pub fn mark_read<I>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = MessageId>,
    {
        let mut current = self.read_ids();
        let before = current.len();
        current.extend(ids);
        let added = current.len() - before;
        if added > 0 {
            self.write(&current)?;
        }
        Ok(added)
    }

    /// Returns whether `id` was previously marked.
    pub fn mark_unread(&self, id: &MessageId) -> Result<bool> {
        let mut current = self.read_ids();
        let removed = current.remove(id);
        if removed {
            self.write(&current)?;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(&self.key)
    }

    fn write(&self, ids: &BTreeSet<MessageId>) -> Result<()> {
        let payload = serde_json::to_string(ids)?;
        self.store.set(&self.key, &payload)
    }
}
