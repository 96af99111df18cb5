//! Sink for user-facing warnings about objects that fail to sync.

use crate::object::ObjectKey;
use std::fmt;
use std::sync::Mutex;
use tracing::warn;

/// The object a warning is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub kind: &'static str,
    pub key: ObjectKey,
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

pub trait SyncObserver: Send + Sync {
    fn warning(&self, object: &ObjectRef, reason: &str, message: &str);
}

/// Emits warnings as `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn warning(&self, object: &ObjectRef, reason: &str, message: &str) {
        warn!(kind = object.kind, key = %object.key, reason, "{message}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub object: ObjectRef,
    pub reason: String,
    pub message: String,
}

/// Keeps every warning in memory.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl SyncObserver for RecordingObserver {
    fn warning(&self, object: &ObjectRef, reason: &str, message: &str) {
        if let Ok(mut events) = self.events.lock() {
            events.push(RecordedEvent {
                object: object.clone(),
                reason: reason.to_string(),
                message: message.to_string(),
            });
        }
    }
}
