use crate::object::{ObjectKey, ObjectMeta};
use crate::translator::{
    IdentityTranslator, MANAGED_BY_LABEL, OBJECT_NAMESPACE_ANNOTATION, OBJECT_NAME_ANNOTATION,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Comma-separated list of the annotation keys the syncer copied onto a physical object.
pub const MANAGED_ANNOTATIONS_ANNOTATION: &str = "vsync.loft.sh/managed-annotations";
/// Comma-separated list of the label keys the syncer copied onto a physical object.
pub const MANAGED_LABELS_ANNOTATION: &str = "vsync.loft.sh/managed-labels";

const ENGINE_ANNOTATIONS: [&str; 4] = [
    OBJECT_NAME_ANNOTATION,
    OBJECT_NAMESPACE_ANNOTATION,
    MANAGED_ANNOTATIONS_ANNOTATION,
    MANAGED_LABELS_ANNOTATION,
];

/// Result of [`MetadataTranslator::translate_metadata_update`].
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataUpdate {
    pub changed: bool,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

/// Builds the common metadata of physical counterparts.
///
/// The syncer owns only the keys it copied from the virtual object. It records
/// those keys on the physical object so that a later update can tell its own keys
/// (which follow the virtual side, including removal) from keys physical-side
/// controllers added. Annotations of the latter kind belong to the physical side:
/// they are never overwritten from below and are copied up to the virtual object.
#[derive(Debug, Clone)]
pub struct MetadataTranslator {
    identity: Arc<IdentityTranslator>,
    excluded_annotations: BTreeSet<String>,
}

impl MetadataTranslator {
    pub fn new(identity: Arc<IdentityTranslator>) -> Self {
        Self {
            identity,
            excluded_annotations: BTreeSet::new(),
        }
    }

    /// Annotation keys that are never copied to the physical side.
    pub fn with_excluded_annotations<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_annotations
            .extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn identity(&self) -> &IdentityTranslator {
        &self.identity
    }

    /// Metadata skeleton for a new physical counterpart at `physical`.
    ///
    /// Owner references are never copied; the physical object is owned by nothing.
    pub fn translate_metadata(&self, virtual_meta: &ObjectMeta, physical: &ObjectKey) -> ObjectMeta {
        let mut meta = ObjectMeta::new(physical.namespace.clone(), physical.name.clone());
        meta.annotations = self.desired_annotations(virtual_meta);
        meta.labels = self.desired_labels(virtual_meta);
        meta
    }

    /// Recomputes the syncer-owned labels and annotations of an existing counterpart.
    pub fn translate_metadata_update(
        &self,
        virtual_meta: &ObjectMeta,
        physical_meta: &ObjectMeta,
    ) -> MetadataUpdate {
        let previous_annotations =
            managed_keys(&physical_meta.annotations, MANAGED_ANNOTATIONS_ANNOTATION);
        let previous_labels = managed_keys(&physical_meta.annotations, MANAGED_LABELS_ANNOTATION);

        let mut annotations: BTreeMap<String, String> = physical_meta
            .annotations
            .iter()
            .filter(|(key, _)| {
                !previous_annotations.contains(key.as_str())
                    && !ENGINE_ANNOTATIONS.contains(&key.as_str())
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let physical_owned: BTreeSet<String> = annotations.keys().cloned().collect();
        annotations.extend(self.owned_annotations(virtual_meta, &physical_owned));

        let mut labels: BTreeMap<String, String> = physical_meta
            .labels
            .iter()
            .filter(|(key, _)| {
                !previous_labels.contains(key.as_str()) && key.as_str() != MANAGED_BY_LABEL
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        labels.extend(self.desired_labels(virtual_meta));

        MetadataUpdate {
            changed: annotations != physical_meta.annotations || labels != physical_meta.labels,
            annotations,
            labels,
        }
    }

    /// Virtual annotations with physical-side annotations merged in, or `None` when
    /// the virtual object already carries all of them.
    ///
    /// Keys the syncer copied down, its own stamps and excluded keys never flow up.
    pub fn translate_annotations_backwards(
        &self,
        virtual_meta: &ObjectMeta,
        physical_meta: &ObjectMeta,
    ) -> Option<BTreeMap<String, String>> {
        let copied_down = managed_keys(&physical_meta.annotations, MANAGED_ANNOTATIONS_ANNOTATION);
        let mut annotations = virtual_meta.annotations.clone();
        for (key, value) in &physical_meta.annotations {
            if copied_down.contains(key.as_str())
                || ENGINE_ANNOTATIONS.contains(&key.as_str())
                || self.excluded_annotations.contains(key)
            {
                continue;
            }
            annotations.insert(key.clone(), value.clone());
        }
        (annotations != virtual_meta.annotations).then_some(annotations)
    }

    fn desired_annotations(&self, virtual_meta: &ObjectMeta) -> BTreeMap<String, String> {
        self.owned_annotations(virtual_meta, &BTreeSet::new())
    }

    /// Annotations the syncer writes down, skipping keys the physical side owns.
    fn owned_annotations(
        &self,
        virtual_meta: &ObjectMeta,
        physical_owned: &BTreeSet<String>,
    ) -> BTreeMap<String, String> {
        let mut annotations: BTreeMap<String, String> = virtual_meta
            .annotations
            .iter()
            .filter(|(key, _)| {
                !self.excluded_annotations.contains(key.as_str())
                    && !ENGINE_ANNOTATIONS.contains(&key.as_str())
                    && !physical_owned.contains(key.as_str())
            })
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        let copied = join_keys(annotations.keys());
        if !copied.is_empty() {
            annotations.insert(MANAGED_ANNOTATIONS_ANNOTATION.to_string(), copied);
        }
        let copied_labels = join_keys(
            virtual_meta
                .labels
                .keys()
                .filter(|key| key.as_str() != MANAGED_BY_LABEL),
        );
        if !copied_labels.is_empty() {
            annotations.insert(MANAGED_LABELS_ANNOTATION.to_string(), copied_labels);
        }

        annotations.insert(
            OBJECT_NAME_ANNOTATION.to_string(),
            virtual_meta.name.clone(),
        );
        annotations.insert(
            OBJECT_NAMESPACE_ANNOTATION.to_string(),
            virtual_meta.namespace.clone(),
        );
        annotations
    }

    fn desired_labels(&self, virtual_meta: &ObjectMeta) -> BTreeMap<String, String> {
        let mut labels: BTreeMap<String, String> = virtual_meta
            .labels
            .iter()
            .filter(|(key, _)| key.as_str() != MANAGED_BY_LABEL)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        labels.insert(
            MANAGED_BY_LABEL.to_string(),
            self.identity.suffix().to_string(),
        );
        labels
    }
}

/// Removes every syncer stamp from metadata read on the physical side.
///
/// Used when mirroring a physical object up: the stamps it inherited from its
/// physical parent mean nothing in the virtual store.
pub fn strip_engine_metadata(meta: &mut ObjectMeta) {
    for key in ENGINE_ANNOTATIONS {
        meta.annotations.remove(key);
    }
    meta.labels.remove(MANAGED_BY_LABEL);
}

fn managed_keys<'a>(annotations: &'a BTreeMap<String, String>, list: &str) -> BTreeSet<&'a str> {
    annotations
        .get(list)
        .map(|keys| keys.split(',').filter(|key| !key.is_empty()).collect())
        .unwrap_or_default()
}

fn join_keys<'a>(keys: impl Iterator<Item = &'a String>) -> String {
    keys.map(String::as_str).collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> MetadataTranslator {
        MetadataTranslator::new(Arc::new(IdentityTranslator::new("vsync", "vsync-host")))
            .with_excluded_annotations(["kubectl.kubernetes.io/last-applied-configuration"])
    }

    fn virtual_meta() -> ObjectMeta {
        ObjectMeta::new("default", "hello")
            .with_label("app", "hello")
            .with_annotation("team", "a")
            .with_annotation("kubectl.kubernetes.io/last-applied-configuration", "{}")
    }

    #[test]
    fn skeleton_carries_stamps_and_copied_keys() {
        let t = translator();
        let pkey = ObjectKey::new("vsync-host", "hello-x-default-x-vsync");
        let meta = t.translate_metadata(&virtual_meta(), &pkey);

        assert_eq!(meta.key(), pkey);
        assert_eq!(meta.labels.get(MANAGED_BY_LABEL).map(String::as_str), Some("vsync"));
        assert_eq!(meta.labels.get("app").map(String::as_str), Some("hello"));
        assert_eq!(meta.annotations.get("team").map(String::as_str), Some("a"));
        assert_eq!(
            meta.annotations.get(OBJECT_NAME_ANNOTATION).map(String::as_str),
            Some("hello")
        );
        assert_eq!(
            meta.annotations.get(MANAGED_ANNOTATIONS_ANNOTATION).map(String::as_str),
            Some("team")
        );
        assert!(!meta
            .annotations
            .contains_key("kubectl.kubernetes.io/last-applied-configuration"));
        assert!(meta.owner_references.is_empty());
        assert!(meta.uid.is_empty());
    }

    #[test]
    fn unchanged_metadata_reports_no_change() {
        let t = translator();
        let pkey = ObjectKey::new("vsync-host", "hello-x-default-x-vsync");
        let physical = t.translate_metadata(&virtual_meta(), &pkey);

        let update = t.translate_metadata_update(&virtual_meta(), &physical);
        assert!(!update.changed);
        assert_eq!(update.annotations, physical.annotations);
        assert_eq!(update.labels, physical.labels);
    }

    #[test]
    fn physical_keys_survive_and_dropped_virtual_keys_go() {
        let t = translator();
        let pkey = ObjectKey::new("vsync-host", "hello-x-default-x-vsync");
        let mut physical = t.translate_metadata(&virtual_meta(), &pkey);
        physical
            .annotations
            .insert("serving.knative.dev/creator".into(), "controller".into());
        physical.labels.insert("node".into(), "a".into());

        let mut edited = virtual_meta();
        edited.annotations.remove("team");
        edited.labels.insert("tier".into(), "web".into());

        let update = t.translate_metadata_update(&edited, &physical);
        assert!(update.changed);
        assert!(!update.annotations.contains_key("team"));
        assert!(!update.annotations.contains_key(MANAGED_ANNOTATIONS_ANNOTATION));
        assert_eq!(
            update.annotations.get("serving.knative.dev/creator").map(String::as_str),
            Some("controller")
        );
        assert_eq!(update.labels.get("node").map(String::as_str), Some("a"));
        assert_eq!(update.labels.get("tier").map(String::as_str), Some("web"));
        assert_eq!(
            update.annotations.get(MANAGED_LABELS_ANNOTATION).map(String::as_str),
            Some("app,tier")
        );
    }

    #[test]
    fn physical_annotations_flow_up_and_stay_physical() {
        let t = translator();
        let pkey = ObjectKey::new("vsync-host", "hello-x-default-x-vsync");
        let mut physical = t.translate_metadata(&virtual_meta(), &pkey);
        physical
            .annotations
            .insert("serving.knative.dev/creator".into(), "admin".into());

        let up = t
            .translate_annotations_backwards(&virtual_meta(), &physical)
            .unwrap();
        assert_eq!(up.get("serving.knative.dev/creator").map(String::as_str), Some("admin"));
        assert_eq!(up.get("team").map(String::as_str), Some("a"));
        assert!(up.keys().all(|key| !key.starts_with("vsync.loft.sh/")));

        // Once mirrored, the key is still the physical side's: no write down, and
        // a new physical value flows up again.
        let mut mirrored = virtual_meta();
        mirrored.annotations = up;
        assert!(!t.translate_metadata_update(&mirrored, &physical).changed);
        assert!(t.translate_annotations_backwards(&mirrored, &physical).is_none());

        physical
            .annotations
            .insert("serving.knative.dev/creator".into(), "ci".into());
        assert!(!t.translate_metadata_update(&mirrored, &physical).changed);
        let up = t
            .translate_annotations_backwards(&mirrored, &physical)
            .unwrap();
        assert_eq!(up.get("serving.knative.dev/creator").map(String::as_str), Some("ci"));
    }

    #[test]
    fn copied_down_keys_never_flow_back() {
        let t = translator();
        let pkey = ObjectKey::new("vsync-host", "hello-x-default-x-vsync");
        let physical = t.translate_metadata(&virtual_meta(), &pkey);

        let mut edited = virtual_meta();
        edited.annotations.remove("team");
        assert!(t.translate_annotations_backwards(&edited, &physical).is_none());
    }

    #[test]
    fn strip_removes_every_stamp() {
        let t = translator();
        let mut meta = t.translate_metadata(
            &virtual_meta(),
            &ObjectKey::new("vsync-host", "hello-x-default-x-vsync"),
        );
        strip_engine_metadata(&mut meta);
        assert!(!meta.labels.contains_key(MANAGED_BY_LABEL));
        assert!(meta.annotations.keys().all(|key| !key.starts_with("vsync.loft.sh/")));
        assert_eq!(meta.annotations.get("team").map(String::as_str), Some("a"));
    }
}
