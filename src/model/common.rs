use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub image: String,
}

/// Runtime settings of one revision.
///
/// Optional fields are filled in with defaults by the serving controller when left
/// unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSpec {
    pub containers: Vec<Container>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_concurrency: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_start_timeout_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_service_links: Option<bool>,
}

impl RevisionSpec {
    pub fn with_image(image: impl Into<String>) -> Self {
        Self {
            containers: vec![Container {
                name: String::new(),
                image: image.into(),
            }],
            ..Default::default()
        }
    }

    /// The serving container, or an empty one when none is declared.
    pub fn container(&self) -> Container {
        self.containers.first().cloned().unwrap_or_default()
    }

    pub fn container_mut(&mut self) -> &mut Container {
        if self.containers.is_empty() {
            self.containers.push(Container::default());
        }
        &mut self.containers[0]
    }
}

/// Template from which revisions are stamped out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionTemplate {
    /// Name of the revision this template produces. Empty lets the controller choose.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub spec: RevisionSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficTarget {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub revision_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_revision: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<i64>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
}

impl TrafficTarget {
    pub fn latest(percent: i64) -> Self {
        Self {
            latest_revision: Some(true),
            percent: Some(percent),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: String,
}

impl Condition {
    pub fn ready(ready: bool) -> Self {
        Self {
            condition_type: "Ready".to_string(),
            status: if ready { "True" } else { "Unknown" }.to_string(),
        }
    }
}

pub fn is_ready(conditions: &[Condition]) -> bool {
    conditions
        .iter()
        .any(|condition| condition.condition_type == "Ready" && condition.status == "True")
}
