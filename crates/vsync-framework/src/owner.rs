//! # Owner-Reference Rewriting
//!
//! Children mirrored up from the physical store must be owned by the virtual
//! counterpart of their physical parent. The physical owner stamp names a physical
//! object; [`OwnerRefRewriter`] swaps in the identity of the parent's virtual mirror
//! and keeps the stamp's flags.

use crate::client::StoreClient;
use crate::error::SyncError;
use crate::kind::ResourceKind;
use crate::object::{ObjectKey, ObjectMeta, OwnerReference};
use crate::translator::IdentityTranslator;
use std::sync::Arc;
use tracing::debug;

/// Resolves owner stamps of parent kind `P` against the virtual store.
pub struct OwnerRefRewriter<P: ResourceKind> {
    target: StoreClient<P>,
    parent_identity: Arc<IdentityTranslator>,
}

impl<P: ResourceKind> Clone for OwnerRefRewriter<P> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            parent_identity: self.parent_identity.clone(),
        }
    }
}

impl<P: ResourceKind> OwnerRefRewriter<P> {
    /// `target` is the virtual store of the parent kind; `parent_identity` the
    /// translator the parent kind's reconciler uses.
    pub fn new(target: StoreClient<P>, parent_identity: Arc<IdentityTranslator>) -> Self {
        Self {
            target,
            parent_identity,
        }
    }

    /// Owner references for the virtual mirror of the physical child `child`.
    ///
    /// Returns an empty list when `child` has no owner of kind `P`, and
    /// [`SyncError::ParentNotSynced`] when the parent has no virtual mirror yet.
    pub async fn rewrite(&self, child: &ObjectMeta) -> Result<Vec<OwnerReference>, SyncError> {
        let Some(stamp) = child.owner_of_kind(P::KIND) else {
            return Ok(Vec::new());
        };

        let parent_pkey = ObjectKey::new(child.namespace.clone(), stamp.name.clone());
        let parent_vkey = match self.parent_identity.cache().find_reverse(&parent_pkey) {
            Some(vkey) => vkey,
            None => self.parent_identity.derive_virtual_key(&parent_pkey, child)?,
        };

        let Some(parent) = self.target.get(parent_vkey.clone()).await? else {
            debug!(child = %child.key(), parent = %parent_vkey, "Parent has no virtual mirror");
            return Err(SyncError::ParentNotSynced {
                parent_kind: P::KIND,
                parent: parent_vkey,
                child: child.key(),
            });
        };

        Ok(vec![OwnerReference {
            api_version: P::API_VERSION.to_string(),
            kind: P::KIND.to_string(),
            name: parent.metadata.name,
            uid: parent.metadata.uid,
            controller: stamp.controller,
            block_owner_deletion: stamp.block_owner_deletion,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::StoreActor;
    use crate::object::Object;
    use crate::test_support::{Widget, WidgetSpec};
    use crate::translator::{OBJECT_NAMESPACE_ANNOTATION, OBJECT_NAME_ANNOTATION};

    fn physical_child(owners: Vec<OwnerReference>) -> ObjectMeta {
        let mut meta = ObjectMeta::new("vsync-host", "box-x-default-x-vsync-00001")
            .with_annotation(OBJECT_NAME_ANNOTATION, "box")
            .with_annotation(OBJECT_NAMESPACE_ANNOTATION, "default");
        meta.owner_references = owners;
        meta
    }

    fn physical_stamp() -> OwnerReference {
        OwnerReference {
            api_version: "test.vsync.dev/v1".into(),
            kind: "Widget".into(),
            name: "box-x-default-x-vsync".into(),
            uid: "physical-uid".into(),
            controller: Some(true),
            block_owner_deletion: None,
        }
    }

    fn rewriter() -> (OwnerRefRewriter<Widget>, StoreClient<Widget>) {
        let (actor, client) = StoreActor::<Widget>::new("virtual", 8);
        tokio::spawn(actor.run());
        let identity = Arc::new(IdentityTranslator::new("vsync", "vsync-host"));
        (OwnerRefRewriter::new(client.clone(), identity), client)
    }

    #[tokio::test]
    async fn stamp_points_at_virtual_parent_with_flags_preserved() {
        let (rewriter, virtual_store) = rewriter();
        let parent = virtual_store
            .create(Object::new(ObjectMeta::new("default", "box"), WidgetSpec::default()))
            .await
            .unwrap();

        let unrelated = OwnerReference {
            kind: "Route".into(),
            name: "box".into(),
            ..Default::default()
        };
        let refs = rewriter
            .rewrite(&physical_child(vec![unrelated, physical_stamp()]))
            .await
            .unwrap();

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].name, "box");
        assert_eq!(refs[0].uid, parent.metadata.uid);
        assert_eq!(refs[0].controller, Some(true));
        assert_eq!(refs[0].block_owner_deletion, None);
    }

    #[tokio::test]
    async fn missing_parent_defers() {
        let (rewriter, _) = rewriter();
        let err = rewriter
            .rewrite(&physical_child(vec![physical_stamp()]))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ParentNotSynced { .. }));
        assert!(err.is_contention());
    }

    #[tokio::test]
    async fn no_stamp_means_no_owner() {
        let (rewriter, _) = rewriter();
        assert!(rewriter.rewrite(&physical_child(Vec::new())).await.unwrap().is_empty());
    }
}
