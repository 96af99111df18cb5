use super::{Condition, RevisionTemplate, SERVING_API_VERSION};
use serde::{Deserialize, Serialize};
use vsync_framework::ResourceKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationSpec {
    pub template: RevisionTemplate,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest_created_revision_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub latest_ready_revision_name: String,
}

vsync_framework::impl_field_value!(ConfigurationStatus);

/// Generated by the serving controller for every service, under the service's name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration;

impl ResourceKind for Configuration {
    const API_VERSION: &'static str = SERVING_API_VERSION;
    const KIND: &'static str = "Configuration";
    type Spec = ConfigurationSpec;
    type Status = ConfigurationStatus;
}
