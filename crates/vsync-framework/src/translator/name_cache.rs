//! Insert-only concurrent cache of identity mappings.

use crate::error::SyncError;
use crate::object::ObjectKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::error;

/// Virtual key -> physical key, plus the reverse direction.
///
/// Readers never block each other. An entry is never overwritten with a different
/// value: identities are immutable for the lifetime of a pair, so a conflicting
/// insert is a logic error. Debug builds panic on it; release builds log and refuse.
#[derive(Debug, Default)]
pub struct NameCache {
    forward: DashMap<ObjectKey, ObjectKey>,
    reverse: DashMap<ObjectKey, ObjectKey>,
}

impl NameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Physical key recorded for a virtual key.
    pub fn find(&self, key: &ObjectKey) -> Option<ObjectKey> {
        self.forward.get(key).map(|entry| entry.value().clone())
    }

    /// Virtual key recorded for a physical key.
    pub fn find_reverse(&self, key: &ObjectKey) -> Option<ObjectKey> {
        self.reverse.get(key).map(|entry| entry.value().clone())
    }

    pub fn add(&self, key: ObjectKey, value: ObjectKey) -> Result<(), SyncError> {
        if let Some(owner) = self.find_reverse(&value) {
            if owner != key {
                return Err(conflict(value, owner, key));
            }
        }

        match self.forward.entry(key.clone()) {
            Entry::Occupied(entry) if *entry.get() == value => Ok(()),
            Entry::Occupied(entry) => Err(conflict(key, entry.get().clone(), value)),
            Entry::Vacant(entry) => {
                entry.insert(value.clone());
                self.reverse.insert(value, key);
                Ok(())
            }
        }
    }

    /// Drops the mapping of a pair that no longer exists on either side.
    pub fn remove(&self, key: &ObjectKey) -> Option<ObjectKey> {
        let (_, value) = self.forward.remove(key)?;
        self.reverse.remove_if(&value, |_, owner| owner == key);
        Some(value)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

fn conflict(key: ObjectKey, existing: ObjectKey, proposed: ObjectKey) -> SyncError {
    debug_assert!(
        false,
        "conflicting identity mapping for {key}: {existing} vs {proposed}"
    );
    error!(%key, %existing, %proposed, "Conflicting identity mapping");
    SyncError::MappingConflict {
        key,
        existing,
        proposed,
    }
}
