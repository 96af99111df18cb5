//! Kinds used by the unit tests of this crate.

use crate::kind::{Origin, ResourceKind, SyncedKind};
use crate::object::{Object, OwnerReference};
use crate::owner::OwnerRefRewriter;
use crate::policy::FieldMergePolicy;
use crate::translator::IdentityTranslator;
use crate::SyncError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetSpec {
    pub size: u32,
    pub color: String,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetStatus {
    pub ready: bool,
}

crate::impl_field_value!(WidgetStatus);

/// Created by users in the virtual store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Widget;

impl ResourceKind for Widget {
    const API_VERSION: &'static str = "test.vsync.dev/v1";
    const KIND: &'static str = "Widget";
    type Spec = WidgetSpec;
    type Status = WidgetStatus;
}

#[async_trait]
impl SyncedKind for Widget {
    const ORIGIN: Origin = Origin::Virtual;
    type Context = ();

    fn policy() -> FieldMergePolicy<Self> {
        FieldMergePolicy::<Self>::builder()
            .down("spec.size", |o| o.spec.size, |o, v| o.spec.size = v)
            .bidirectional("spec.color", |o| o.spec.color.clone(), |o, v| o.spec.color = v)
            .up("spec.zone", |o| o.spec.zone.clone(), |o, v| o.spec.zone = v)
            .status("status", |o| o.status.clone(), |o, v| o.status = v)
            .build()
    }
}

/// Generated by a physical controller for a [`Widget`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gadget;

impl ResourceKind for Gadget {
    const API_VERSION: &'static str = "test.vsync.dev/v1";
    const KIND: &'static str = "Gadget";
    type Spec = WidgetSpec;
    type Status = WidgetStatus;
}

#[async_trait]
impl SyncedKind for Gadget {
    const ORIGIN: Origin = Origin::Physical;
    type Context = OwnerRefRewriter<Widget>;

    fn policy() -> FieldMergePolicy<Self> {
        FieldMergePolicy::<Self>::builder()
            .status("status", |o| o.status.clone(), |o, v| o.status = v)
            .build()
    }

    async fn virtual_owner_references(
        physical: &Object<Self>,
        _translator: &IdentityTranslator,
        ctx: &Self::Context,
    ) -> Result<Vec<OwnerReference>, SyncError> {
        ctx.rewrite(&physical.metadata).await
    }
}
