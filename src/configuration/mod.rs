//! # Configuration Syncer
//!
//! Configurations are generated by the serving controller on the physical side,
//! one per service and under the service's physical name. They are mirrored up
//! into the virtual store, owned by the virtual service, and from then on only
//! their status follows the physical object.

mod syncer;
