//! # Sync Errors
//!
//! Every failure a reconciliation pass can run into. Some variants are routing
//! signals rather than failures: [`SyncError::UnmappedIdentity`] means "not ours",
//! and the contention variants (see [`SyncError::is_contention`]) mean "try again on
//! the next trigger". The [`Reconciler`](crate::Reconciler) folds those into a
//! [`SyncOutcome`](crate::SyncOutcome) so they never escape a pass.

use crate::object::ObjectKey;
use std::time::Duration;

/// Errors that can occur while reconciling a pair of objects.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Store closed")]
    StoreClosed,

    #[error("Store dropped response channel")]
    StoreDropped,

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("{kind} {key} not found")]
    NotFound { kind: &'static str, key: ObjectKey },

    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: &'static str, key: ObjectKey },

    /// Optimistic concurrency failure: the caller wrote against a stale resource version.
    #[error("{kind} {key} was modified: expected resource version {expected}, found {actual}")]
    Conflict {
        kind: &'static str,
        key: ObjectKey,
        expected: String,
        actual: String,
    },

    #[error("invalid {kind} {key}: {reason}")]
    InvalidObject {
        kind: &'static str,
        key: ObjectKey,
        reason: String,
    },

    /// The physical object was never associated with a virtual counterpart.
    #[error("physical object {0} is not mapped to a virtual object")]
    UnmappedIdentity(ObjectKey),

    /// The parent of `child` has no counterpart in the target store yet.
    #[error("parent {parent_kind} {parent} of {child} is not synced yet")]
    ParentNotSynced {
        parent_kind: &'static str,
        parent: ObjectKey,
        child: ObjectKey,
    },

    #[error("identity mapping for {key} already points to {existing}, refusing {proposed}")]
    MappingConflict {
        key: ObjectKey,
        existing: ObjectKey,
        proposed: ObjectKey,
    },

    /// Adopting a physical object would overwrite an existing virtual object.
    #[error("cannot adopt {kind} {key}: a virtual object with that name already exists")]
    AdoptionConflict { kind: &'static str, key: ObjectKey },

    #[error("schema registration failed for {kind}: {reason}")]
    SchemaRegistration { kind: String, reason: String },
}

impl SyncError {
    #[must_use]
    pub fn not_found(kind: &'static str, key: ObjectKey) -> Self {
        Self::NotFound { kind, key }
    }

    #[must_use]
    pub fn already_exists(kind: &'static str, key: ObjectKey) -> Self {
        Self::AlreadyExists { kind, key }
    }

    #[must_use]
    pub fn conflict(
        kind: &'static str,
        key: ObjectKey,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind,
            key,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Optimistic-concurrency contention or an unmet ordering dependency.
    ///
    /// These are resolved by waiting for the next triggered pass, never by retrying
    /// the write with an overwrite.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists { .. } | Self::Conflict { .. } | Self::ParentNotSynced { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contention_classification() {
        let key = ObjectKey::new("default", "svc");
        assert!(SyncError::already_exists("Service", key.clone()).is_contention());
        assert!(SyncError::conflict("Service", key.clone(), "1", "2").is_contention());
        assert!(SyncError::ParentNotSynced {
            parent_kind: "Service",
            parent: key.clone(),
            child: key.clone(),
        }
        .is_contention());
        assert!(!SyncError::not_found("Service", key.clone()).is_contention());
        assert!(!SyncError::UnmappedIdentity(key).is_contention());
        assert!(!SyncError::StoreClosed.is_contention());
    }

    #[test]
    fn messages_carry_identity() {
        let err = SyncError::not_found("Revision", ObjectKey::new("team-a", "svc-00001"));
        assert_eq!(err.to_string(), "Revision team-a/svc-00001 not found");
    }
}
