use super::{Condition, RevisionTemplate, TrafficTarget, SERVING_API_VERSION};
use serde::{Deserialize, Serialize};
use vsync_framework::ResourceKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub template: RevisionTemplate,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traffic: Vec<TrafficTarget>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest_created_revision_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest_ready_revision_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub traffic: Vec<TrafficTarget>,
}

vsync_framework::impl_field_value!(ServiceStatus);

impl ServiceStatus {
    pub fn is_ready(&self) -> bool {
        super::is_ready(&self.conditions)
    }
}

/// A Knative service (`ksvc`). Users create these in the virtual store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Service;

impl ResourceKind for Service {
    const API_VERSION: &'static str = SERVING_API_VERSION;
    const KIND: &'static str = "Service";
    type Spec = ServiceSpec;
    type Status = ServiceStatus;
}
