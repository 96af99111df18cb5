//! # Resource Kinds
//!
//! [`ResourceKind`] names a schema (apiVersion + kind) and fixes its spec and status
//! types. [`SyncedKind`] adds everything the generic [`Reconciler`](crate::Reconciler)
//! needs to know to keep one kind in agreement across the two stores.
//!
//! # Provided Methods (Hooks)
//! Most of [`SyncedKind`] has default implementations that do the plain thing:
//! identity translation through [`IdentityTranslator::to_physical`], specs copied
//! unchanged, no owner references. A kind overrides a hook only when its objects
//! embed names that must be translated, or when its counterparts need an owner.

use crate::error::SyncError;
use crate::object::{Object, ObjectKey, ObjectMeta, OwnerReference};
use crate::policy::FieldMergePolicy;
use crate::schema::KindDescriptor;
use crate::translator::IdentityTranslator;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

/// A schema identifier with an associated spec/status shape.
///
/// Implementors are zero-sized markers; the data lives in [`Object<K>`].
pub trait ResourceKind: Clone + Debug + Default + PartialEq + Send + Sync + 'static {
    const API_VERSION: &'static str;
    const KIND: &'static str;

    type Spec: Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Status: Clone
        + Debug
        + Default
        + PartialEq
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    fn descriptor() -> KindDescriptor {
        KindDescriptor::namespaced(Self::API_VERSION, Self::KIND)
    }
}

/// Which store creates objects of a kind in the first place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Users create objects in the virtual store; the syncer creates the physical copy.
    Virtual,
    /// A physical-side controller creates objects; the syncer mirrors them up.
    Physical,
}

/// Contract a kind implements to be reconciled by [`Reconciler`](crate::Reconciler).
///
/// # Context
/// Like the parent stores a child kind needs to resolve owner references, the
/// `Context` is handed to the reconciler at construction and passed into every hook
/// that needs it. Use `()` when there are no dependencies.
#[async_trait]
pub trait SyncedKind: ResourceKind {
    const ORIGIN: Origin;

    type Context: Send + Sync;

    /// The field merge table for this kind.
    fn policy() -> FieldMergePolicy<Self>;

    /// Physical identity for a virtual object that has no cached mapping yet.
    fn physical_key(
        vkey: &ObjectKey,
        _vobj: Option<&Object<Self>>,
        translator: &IdentityTranslator,
    ) -> ObjectKey {
        translator.to_physical(vkey)
    }

    /// Rewrites names embedded in the spec from virtual to physical identities.
    fn translate_spec(
        spec: &Self::Spec,
        _vkey: &ObjectKey,
        _translator: &IdentityTranslator,
    ) -> Self::Spec {
        spec.clone()
    }

    /// Inverse of [`SyncedKind::translate_spec`].
    fn reverse_spec(
        spec: &Self::Spec,
        _vkey: &ObjectKey,
        _translator: &IdentityTranslator,
    ) -> Self::Spec {
        spec.clone()
    }

    /// Rewrites names embedded in a physical status into virtual identities.
    fn reverse_status(
        status: &Self::Status,
        _vkey: &ObjectKey,
        _translator: &IdentityTranslator,
    ) -> Self::Status {
        status.clone()
    }

    /// Rewrites names embedded in labels or annotations of a physical object that is
    /// about to be mirrored up. Runs before the syncer's own stamps are removed.
    fn reverse_metadata(
        _metadata: &mut ObjectMeta,
        _vkey: &ObjectKey,
        _translator: &IdentityTranslator,
    ) {
    }

    /// Owner references for the virtual mirror of an adopted physical object.
    ///
    /// Root kinds keep the default (no owner). Child kinds resolve their parent
    /// through an [`OwnerRefRewriter`](crate::OwnerRefRewriter) held in the context.
    async fn virtual_owner_references(
        _physical: &Object<Self>,
        _translator: &IdentityTranslator,
        _ctx: &Self::Context,
    ) -> Result<Vec<OwnerReference>, SyncError> {
        Ok(Vec::new())
    }
}
