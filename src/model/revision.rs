use super::{Condition, RevisionSpec, SERVING_API_VERSION};
use serde::{Deserialize, Serialize};
use vsync_framework::ResourceKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_digest: String,
}

vsync_framework::impl_field_value!(RevisionStatus);

impl RevisionStatus {
    pub fn is_ready(&self) -> bool {
        super::is_ready(&self.conditions)
    }
}

/// An immutable snapshot of a configuration's template, named `<configuration>-NNNNN`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Revision;

impl ResourceKind for Revision {
    const API_VERSION: &'static str = SERVING_API_VERSION;
    const KIND: &'static str = "Revision";
    type Spec = RevisionSpec;
    type Status = RevisionStatus;
}
