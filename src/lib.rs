//! # Knative vsync
//!
//! Keeps Knative serving objects of a virtual cluster in agreement with their
//! counterparts in the physical cluster that actually runs them.
//!
//! Users create [`Service`](model::Service)s in the virtual store. The syncer
//! creates a translated copy in the physical store, where the serving controller
//! generates a [`Configuration`](model::Configuration) and
//! [`Revision`](model::Revision)s. Those are mirrored back up, owned by the virtual
//! service, and their status keeps following the physical side.
//!
//! ## Core Components
//!
//! - **[model]**: data shapes of the serving kinds.
//! - **[ksvc]**, **[configuration]**, **[revision]**: the
//!   [`SyncedKind`](vsync_framework::SyncedKind) of each kind: origin, field merge
//!   table and name translation hooks. The generic engine lives in `vsync_framework`.
//! - **[controller]**: a physical-side stand-in for the serving controller.
//! - **[lifecycle]**: [`SyncSystem`](lifecycle::SyncSystem), which starts stores,
//!   reconcilers and workers, plus [`SyncConfig`](lifecycle::SyncConfig).
//!
//! ## Testing
//!
//! See [`vsync_framework::mock`] for a scripted store that asserts the exact writes
//! of a pass.

pub mod configuration;
pub mod controller;
pub mod ksvc;
pub mod lifecycle;
pub mod model;
pub mod naming;
pub mod revision;
