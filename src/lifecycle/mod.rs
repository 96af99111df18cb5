//! # System Lifecycle
//!
//! Wiring and lifetime of the running syncer.
//!
//! ## Startup
//!
//! [`SyncSystem::start`] follows a fixed order:
//!
//! 1. **Stores**: a virtual and a physical store actor per kind
//!    ([`ClusterStores`]). [`SyncSystem::start_on`] takes stores that are
//!    already running and may hold objects.
//! 2. **Reconcilers**: one per kind. Child kinds get an
//!    [`OwnerRefRewriter`](vsync_framework::OwnerRefRewriter) over their parent's
//!    virtual store as context, so adopted children can be owned by the virtual parent.
//! 3. **Schemas**: each kind's schema is mirrored from the physical catalog. A kind
//!    whose schema is missing stays disabled without affecting the others.
//! 4. **Workers**: per enabled kind, a task that turns watch events of both stores
//!    and a periodic resync into reconciliation passes. Subscriptions are taken
//!    before the task is spawned and the first resync runs immediately.
//! 5. **Serving controller**: generates configurations and revisions on the physical side.
//!
//! ## Shutdown
//!
//! [`SyncSystem::shutdown`] flips a shutdown signal, waits for workers (and their
//! in-flight passes) and the controller, then drops the store clients so the store
//! actors drain and exit. Every task is joined even if one failed.
//!
//! ## Configuration
//!
//! See [`SyncConfig`] for the recognised keys and environment overrides.

mod config;
mod error;
mod sync_system;

pub use config::*;
pub use error::*;
pub use sync_system::*;
