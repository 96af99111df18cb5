use crate::model::{Configuration, ConfigurationSpec, ConfigurationStatus, Service, SERVICE_LABEL};
use crate::naming::virtual_revision_name;
use async_trait::async_trait;
use vsync_framework::{
    FieldMergePolicy, IdentityTranslator, Object, ObjectKey, ObjectMeta, Origin, OwnerRefRewriter,
    OwnerReference, SyncError, SyncedKind,
};

#[async_trait]
impl SyncedKind for Configuration {
    const ORIGIN: Origin = Origin::Physical;
    type Context = OwnerRefRewriter<Service>;

    fn policy() -> FieldMergePolicy<Self> {
        FieldMergePolicy::<Self>::builder()
            .status("status", |o| o.status.clone(), |o, v| o.status = v)
            .build()
    }

    fn reverse_spec(
        spec: &ConfigurationSpec,
        vkey: &ObjectKey,
        translator: &IdentityTranslator,
    ) -> ConfigurationSpec {
        let mut spec = spec.clone();
        spec.template.name = virtual_revision_name(&spec.template.name, vkey, translator);
        spec
    }

    fn reverse_status(
        status: &ConfigurationStatus,
        vkey: &ObjectKey,
        translator: &IdentityTranslator,
    ) -> ConfigurationStatus {
        let mut status = status.clone();
        status.latest_created_revision_name =
            virtual_revision_name(&status.latest_created_revision_name, vkey, translator);
        status.latest_ready_revision_name =
            virtual_revision_name(&status.latest_ready_revision_name, vkey, translator);
        status
    }

    // A configuration shares its name with its service.
    fn reverse_metadata(metadata: &mut ObjectMeta, vkey: &ObjectKey, translator: &IdentityTranslator) {
        if let Some(service) = metadata.labels.get_mut(SERVICE_LABEL) {
            *service = translator.virtual_child_name(vkey, service);
        }
    }

    async fn virtual_owner_references(
        physical: &Object<Self>,
        _translator: &IdentityTranslator,
        ctx: &Self::Context,
    ) -> Result<Vec<OwnerReference>, SyncError> {
        ctx.rewrite(&physical.metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RevisionSpec, RevisionTemplate};

    #[test]
    fn service_label_points_at_the_virtual_service() {
        let t = IdentityTranslator::new("vsync", "vsync-host");
        let vkey = ObjectKey::new("default", "hello");
        let mut meta = ObjectMeta::new("vsync-host", "hello-x-default-x-vsync")
            .with_label(SERVICE_LABEL, "hello-x-default-x-vsync")
            .with_label("app", "web");

        Configuration::reverse_metadata(&mut meta, &vkey, &t);
        assert_eq!(meta.labels[SERVICE_LABEL], "hello");
        assert_eq!(meta.labels["app"], "web");
    }

    #[test]
    fn revision_names_are_reversed() {
        let t = IdentityTranslator::new("vsync", "vsync-host");
        let vkey = ObjectKey::new("default", "hello");
        let spec = ConfigurationSpec {
            template: RevisionTemplate {
                name: "hello-x-default-x-vsync-v1".into(),
                spec: RevisionSpec::with_image("img"),
            },
        };
        let status = ConfigurationStatus {
            latest_created_revision_name: "hello-x-default-x-vsync-00002".into(),
            latest_ready_revision_name: "hello-x-default-x-vsync-00001".into(),
            ..Default::default()
        };

        assert_eq!(Configuration::reverse_spec(&spec, &vkey, &t).template.name, "hello-v1");
        let status = Configuration::reverse_status(&status, &vkey, &t);
        assert_eq!(status.latest_created_revision_name, "hello-00002");
        assert_eq!(status.latest_ready_revision_name, "hello-00001");
    }

    #[test]
    fn only_status_is_merged() {
        let rules = Configuration::policy();
        assert_eq!(rules.rules().len(), 1);
        assert_eq!(rules.rules()[0].path(), "status");
    }
}
