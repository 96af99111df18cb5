use crate::model::{Configuration, Revision, CONFIGURATION_LABEL, SERVICE_LABEL};
use async_trait::async_trait;
use vsync_framework::translator::{OBJECT_NAMESPACE_ANNOTATION, OBJECT_NAME_ANNOTATION};
use vsync_framework::{
    FieldMergePolicy, IdentityTranslator, Object, ObjectKey, ObjectMeta, Origin, OwnerRefRewriter,
    OwnerReference, SyncError, SyncedKind,
};

#[async_trait]
impl SyncedKind for Revision {
    const ORIGIN: Origin = Origin::Physical;
    type Context = OwnerRefRewriter<Configuration>;

    fn policy() -> FieldMergePolicy<Self> {
        FieldMergePolicy::<Self>::builder()
            .status("status", |o| o.status.clone(), |o, v| o.status = v)
            .build()
    }

    /// Mirrors carry the configuration label, which names the parent the revision
    /// was derived from.
    fn physical_key(
        vkey: &ObjectKey,
        vobj: Option<&Object<Self>>,
        translator: &IdentityTranslator,
    ) -> ObjectKey {
        match vobj.and_then(|object| object.metadata.labels.get(CONFIGURATION_LABEL)) {
            Some(configuration) => translator.to_physical_child(
                &ObjectKey::new(vkey.namespace.clone(), configuration.clone()),
                &vkey.name,
            ),
            None => translator.to_physical(vkey),
        }
    }

    fn reverse_metadata(metadata: &mut ObjectMeta, vkey: &ObjectKey, translator: &IdentityTranslator) {
        let Some(parent) = metadata.annotations.get(OBJECT_NAME_ANNOTATION) else {
            return;
        };
        let namespace = metadata
            .annotations
            .get(OBJECT_NAMESPACE_ANNOTATION)
            .unwrap_or(&vkey.namespace);
        let parent = ObjectKey::new(namespace.clone(), parent.clone());

        for label in [SERVICE_LABEL, CONFIGURATION_LABEL] {
            if let Some(value) = metadata.labels.get_mut(label) {
                *value = translator.virtual_child_name(&parent, value);
            }
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
