//! # Objects
//!
//! The structural shape shared by every synced kind: metadata, a spec section and a
//! status section. The spec and status types come from the kind
//! (see [`ResourceKind`](crate::ResourceKind)); everything else is common.

use crate::kind::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;

/// Identity of an object within one store and kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Records which parent an object belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
    pub controller: Option<bool>,
    pub block_owner_deletion: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,
    /// Assigned by the store on every write; empty on objects that were never persisted.
    #[serde(default)]
    pub resource_version: String,
    /// Assigned by the store on create.
    #[serde(default)]
    pub uid: String,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(self.namespace.clone(), self.name.clone())
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Linear lookup of the owner stamp for `kind`. Owner lists hold a handful of entries.
    pub fn owner_of_kind(&self, kind: &str) -> Option<&OwnerReference> {
        self.owner_references.iter().find(|owner| owner.kind == kind)
    }
}

/// One persisted instance of a resource kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Object<K: ResourceKind> {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub spec: K::Spec,
    #[serde(default)]
    pub status: K::Status,
}

impl<K: ResourceKind> Object<K> {
    pub fn new(metadata: ObjectMeta, spec: K::Spec) -> Self {
        Self {
            metadata,
            spec,
            status: K::Status::default(),
        }
    }

    pub fn with_status(mut self, status: K::Status) -> Self {
        self.status = status;
        self
    }

    pub fn key(&self) -> ObjectKey {
        self.metadata.key()
    }

    pub fn owner_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: K::API_VERSION.to_string(),
            kind: K::KIND.to_string(),
            name: self.metadata.name.clone(),
            uid: self.metadata.uid.clone(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }
}
