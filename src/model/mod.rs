//! Data shapes of the Knative serving kinds the syncer handles.
//!
//! Only the fields the syncer or the serving controller look at are modelled.

pub mod common;
pub mod configuration;
pub mod revision;
pub mod service;

pub use common::*;
pub use configuration::*;
pub use revision::*;
pub use service::*;

/// Api version shared by all serving kinds.
pub const SERVING_API_VERSION: &str = "serving.knative.dev/v1";

/// Label the serving controller puts on configurations and revisions.
pub const SERVICE_LABEL: &str = "serving.knative.dev/service";
/// Label the serving controller puts on revisions.
pub const CONFIGURATION_LABEL: &str = "serving.knative.dev/configuration";
