//! # Virtual/Physical Sync Framework
//!
//! This crate keeps two independent object stores, a **virtual** one that users
//! write to and a **physical** one where the real workloads run, in eventual
//! agreement for a family of resource kinds. Neither store knows the other's
//! identity space: every physical object lives under a translated name in a single
//! target namespace.
//!
//! ## Architecture Overview
//!
//! 1. **Store Layer** ([`StoreActor`], [`StoreClient`]): an in-memory store per kind
//!    and side, driven by messages. Optimistic concurrency on resource versions,
//!    watch events on every write.
//! 2. **Translation Layer** ([`IdentityTranslator`], [`MetadataTranslator`]):
//!    virtual identity to physical identity and back, plus the labels and
//!    annotations every physical counterpart carries.
//! 3. **Merge Layer** ([`FieldMergePolicy`], [`PatchBuilder`]): per field, which
//!    side owns the value.
//! 4. **Reconciler** ([`Reconciler`]): one pass per trigger, at most one write per
//!    store, never a retry loop.
//!
//! ## Defining a Kind
//!
//! A kind is a zero-sized marker implementing [`ResourceKind`] (schema and data
//! shape) and [`SyncedKind`] (origin, merge policy and translation hooks):
//!
//! ```rust
//! use serde::{Deserialize, Serialize};
//! use vsync_framework::{FieldMergePolicy, Origin, ResourceKind, SyncedKind};
//!
//! #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
//! pub struct BucketSpec { pub size: u32 }
//!
//! #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
//! pub struct BucketStatus { pub ready: bool }
//! vsync_framework::impl_field_value!(BucketStatus);
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! pub struct Bucket;
//!
//! impl ResourceKind for Bucket {
//!     const API_VERSION: &'static str = "storage.example.dev/v1";
//!     const KIND: &'static str = "Bucket";
//!     type Spec = BucketSpec;
//!     type Status = BucketStatus;
//! }
//!
//! #[async_trait::async_trait]
//! impl SyncedKind for Bucket {
//!     const ORIGIN: Origin = Origin::Virtual;
//!     type Context = ();
//!
//!     fn policy() -> FieldMergePolicy<Self> {
//!         FieldMergePolicy::<Self>::builder()
//!             .down("spec.size", |o| o.spec.size, |o, v| o.spec.size = v)
//!             .status("status", |o| o.status.clone(), |o, v| o.status = v)
//!             .build()
//!     }
//! }
//! ```
//!
//! ## Running a Pass
//!
//! ```rust,ignore
//! let identity = Arc::new(IdentityTranslator::new("vsync", "vsync-host"));
//! let reconciler = Reconciler::<Bucket>::new(virtual_store, physical_store, identity, ());
//! match reconciler.reconcile(&ObjectKey::new("default", "logs")).await? {
//!     SyncOutcome::Deferred(reason) => debug!(%reason, "Retrying on next trigger"),
//!     outcome => info!(?outcome, "Done"),
//! }
//! ```

pub mod actor;
pub mod client;
pub mod error;
pub mod kind;
pub mod message;
pub mod mock;
pub mod object;
pub mod observer;
pub mod owner;
pub mod patch;
pub mod policy;
pub mod reconciler;
pub mod schema;
pub mod tracing;
pub mod translator;

#[cfg(test)]
mod test_support;

pub use actor::StoreActor;
pub use client::StoreClient;
pub use error::SyncError;
pub use kind::{Origin, ResourceKind, SyncedKind};
pub use message::{Response, StoreRequest, WatchEvent};
pub use object::{Object, ObjectKey, ObjectMeta, OwnerReference};
pub use observer::{ObjectRef, RecordedEvent, RecordingObserver, SyncObserver, TracingObserver};
pub use owner::OwnerRefRewriter;
pub use patch::{Patch, PatchBuilder};
pub use policy::{Direction, Equality, FieldMergePolicy, FieldRule, FieldValue, MergePlan};
pub use reconciler::{Reconciler, Side, SyncOutcome, WriteSet};
pub use schema::{CrdMirror, KindDescriptor, SchemaCatalog, SchemaRegistrar};
pub use translator::{IdentityTranslator, MetadataTranslator, NameCache};
