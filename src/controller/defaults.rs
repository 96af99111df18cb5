use crate::model::{RevisionSpec, ServiceSpec, TrafficTarget};

pub const DEFAULT_CONTAINER_NAME: &str = "user-container";
pub const DEFAULT_CONTAINER_CONCURRENCY: i64 = 0;
pub const DEFAULT_TIMEOUT_SECONDS: i64 = 300;

/// Fills in what the serving webhook would default on admission.
pub fn default_service_spec(spec: &ServiceSpec) -> ServiceSpec {
    let mut spec = spec.clone();
    default_revision_spec(&mut spec.template.spec);
    if spec.traffic.is_empty() {
        spec.traffic.push(TrafficTarget::latest(100));
    }
    spec
}

fn default_revision_spec(spec: &mut RevisionSpec) {
    let container = spec.container_mut();
    if container.name.is_empty() {
        container.name = DEFAULT_CONTAINER_NAME.to_string();
    }
    spec.container_concurrency
        .get_or_insert(DEFAULT_CONTAINER_CONCURRENCY);
    spec.timeout_seconds.get_or_insert(DEFAULT_TIMEOUT_SECONDS);
    spec.enable_service_links.get_or_insert(false);
}
