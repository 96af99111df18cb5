//! # Schema Registration
//!
//! Before a kind can be synced, the virtual store must know its schema. The
//! reference [`CrdMirror`] copies the descriptor the physical store already has,
//! so the virtual store never serves a kind the physical side cannot back.

use crate::error::SyncError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KindDescriptor {
    pub api_version: String,
    pub kind: String,
    pub namespaced: bool,
}

impl KindDescriptor {
    pub fn namespaced(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            namespaced: true,
        }
    }
}

impl fmt::Display for KindDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

/// Makes a kind's schema available in the virtual store.
#[async_trait]
pub trait SchemaRegistrar: Send + Sync {
    async fn ensure(&self, descriptor: &KindDescriptor) -> Result<(), SyncError>;
}

/// The set of kinds a store serves. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct SchemaCatalog {
    kinds: Arc<DashMap<String, KindDescriptor>>,
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, descriptor: KindDescriptor) {
        self.kinds.insert(descriptor.to_string(), descriptor);
    }

    pub fn get(&self, descriptor: &KindDescriptor) -> Option<KindDescriptor> {
        self.kinds
            .get(&descriptor.to_string())
            .map(|entry| entry.value().clone())
    }

    pub fn contains(&self, descriptor: &KindDescriptor) -> bool {
        self.kinds.contains_key(&descriptor.to_string())
    }
}

/// Copies schemas from the physical catalog into the virtual one.
#[derive(Debug, Clone)]
pub struct CrdMirror {
    physical: SchemaCatalog,
    virtual_catalog: SchemaCatalog,
}

impl CrdMirror {
    pub fn new(physical: SchemaCatalog, virtual_catalog: SchemaCatalog) -> Self {
        Self {
            physical,
            virtual_catalog,
        }
    }
}

#[async_trait]
impl SchemaRegistrar for CrdMirror {
    async fn ensure(&self, descriptor: &KindDescriptor) -> Result<(), SyncError> {
        if self.virtual_catalog.contains(descriptor) {
            return Ok(());
        }

        let installed = self
            .physical
            .get(descriptor)
            .ok_or_else(|| SyncError::SchemaRegistration {
                kind: descriptor.to_string(),
                reason: "not installed in the physical store".into(),
            })?;
        info!(kind = %descriptor, "Mirroring schema into virtual store");
        self.virtual_catalog.install(installed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mirror_copies_physical_schema() {
        let physical = SchemaCatalog::new();
        let virtual_catalog = SchemaCatalog::new();
        let descriptor = KindDescriptor::namespaced("serving.knative.dev/v1", "Service");
        physical.install(descriptor.clone());

        let mirror = CrdMirror::new(physical, virtual_catalog.clone());
        mirror.ensure(&descriptor).await.unwrap();
        assert!(virtual_catalog.contains(&descriptor));
        mirror.ensure(&descriptor).await.unwrap();
    }

    #[tokio::test]
    async fn missing_physical_schema_fails() {
        let mirror = CrdMirror::new(SchemaCatalog::new(), SchemaCatalog::new());
        let err = mirror
            .ensure(&KindDescriptor::namespaced("serving.knative.dev/v1", "Route"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::SchemaRegistration { .. }));
    }
}
