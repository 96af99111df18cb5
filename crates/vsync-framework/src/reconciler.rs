//! # Reconciler
//!
//! One `Reconciler<K>` keeps every pair of kind `K` in agreement. A pass is
//! triggered for a virtual key; both sides are read, and the combination of what
//! exists decides the action:
//!
//! | virtual | physical            | action                                                   |
//! |---------|---------------------|----------------------------------------------------------|
//! | yes     | no                  | origin virtual: create down. origin physical: delete the virtual mirror |
//! | yes     | yes                 | merge fields through the kind's policy                   |
//! | no      | yes, unmanaged      | origin physical: adopt up. origin virtual: not ours, skip |
//! | no      | yes, managed        | delete the physical object                               |
//! | no      | no                  | nothing                                                  |
//!
//! A pass writes each store at most once and never retries. Optimistic concurrency
//! failures, unmet ordering dependencies and objects deleted mid-pass end the pass
//! as [`SyncOutcome::Deferred`]; the next trigger for the pair picks it up again.
//! Every other store failure, reads included, is reported to the observer.
//! Passes for the same pair are serialized, passes for different pairs are not.

use crate::client::StoreClient;
use crate::error::SyncError;
use crate::kind::{Origin, SyncedKind};
use crate::object::{Object, ObjectKey};
use crate::observer::{ObjectRef, SyncObserver, TracingObserver};
use crate::patch::PatchBuilder;
use crate::policy::FieldMergePolicy;
use crate::translator::{strip_engine_metadata, IdentityTranslator, MetadataTranslator};
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Virtual,
    Physical,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Virtual => f.write_str("virtual"),
            Side::Physical => f.write_str("physical"),
        }
    }
}

/// Which writes a merge pass issued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSet {
    pub physical: bool,
    pub virtual_spec: bool,
    pub virtual_status: bool,
}

impl WriteSet {
    pub fn count(&self) -> usize {
        [self.physical, self.virtual_spec, self.virtual_status]
            .into_iter()
            .filter(|written| *written)
            .count()
    }
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Neither side exists.
    NoOp,
    /// Both sides exist and agree.
    InSync,
    /// The physical counterpart was created.
    Created,
    /// A physical object was mirrored into the virtual store.
    Adopted,
    Updated(WriteSet),
    Deleted(Side),
    /// Contention or a missing dependency; the next trigger retries.
    Deferred(String),
    /// The pair is not handled by this syncer.
    Skipped(String),
}

impl SyncOutcome {
    /// Number of store writes the pass issued.
    pub fn writes(&self) -> usize {
        match self {
            SyncOutcome::Created | SyncOutcome::Adopted | SyncOutcome::Deleted(_) => 1,
            SyncOutcome::Updated(writes) => writes.count(),
            _ => 0,
        }
    }
}

pub struct Reconciler<K: SyncedKind> {
    virtual_store: StoreClient<K>,
    physical_store: StoreClient<K>,
    identity: Arc<IdentityTranslator>,
    metadata: MetadataTranslator,
    policy: FieldMergePolicy<K>,
    observer: Arc<dyn SyncObserver>,
    context: K::Context,
    locks: DashMap<ObjectKey, Arc<Mutex<()>>>,
}

impl<K: SyncedKind> Reconciler<K> {
    pub fn new(
        virtual_store: StoreClient<K>,
        physical_store: StoreClient<K>,
        identity: Arc<IdentityTranslator>,
        context: K::Context,
    ) -> Self {
        Self {
            virtual_store,
            physical_store,
            metadata: MetadataTranslator::new(identity.clone()),
            identity,
            policy: K::policy(),
            observer: Arc::new(TracingObserver),
            context,
            locks: DashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: MetadataTranslator) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn identity(&self) -> &Arc<IdentityTranslator> {
        &self.identity
    }

    pub fn virtual_store(&self) -> &StoreClient<K> {
        &self.virtual_store
    }

    pub fn physical_store(&self) -> &StoreClient<K> {
        &self.physical_store
    }

    /// Pairs with a pass running or waiting.
    pub fn in_flight(&self) -> usize {
        self.locks.len()
    }

    /// Runs one pass for the pair identified by `vkey`.
    ///
    /// Returns `Err` only for failures that a later pass cannot be expected to
    /// resolve on its own; those are reported to the observer first.
    #[instrument(skip(self, vkey), fields(kind = K::KIND, key = %vkey))]
    pub async fn reconcile(&self, vkey: &ObjectKey) -> Result<SyncOutcome, SyncError> {
        let lock = self
            .locks
            .entry(vkey.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.pass(vkey).await
        };

        drop(lock);
        self.locks.remove_if(vkey, |_, lock| Arc::strong_count(lock) == 1);

        match result {
            Ok(outcome) => {
                info!(?outcome, "Reconciled");
                Ok(outcome)
            }
            Err(SyncError::UnmappedIdentity(key)) => {
                debug!(%key, "Not mapped to a virtual object");
                Ok(SyncOutcome::Skipped(format!("{key} is not mapped")))
            }
            Err(err) if defers(&err) => {
                info!(%err, "Deferred");
                Ok(SyncOutcome::Deferred(err.to_string()))
            }
            Err(err) => Err(err),
        }
    }

    async fn pass(&self, vkey: &ObjectKey) -> Result<SyncOutcome, SyncError> {
        let virtual_obj = self
            .virtual_store
            .get(vkey.clone())
            .await
            .map_err(|err| self.report(vkey, Side::Virtual, err))?;
        let pkey = match self.identity.cache().find(vkey) {
            Some(pkey) => pkey,
            None => K::physical_key(vkey, virtual_obj.as_ref(), &self.identity),
        };
        let physical_obj = self
            .physical_store
            .get(pkey.clone())
            .await
            .map_err(|err| self.report(vkey, Side::Physical, err))?;

        match (virtual_obj, physical_obj) {
            (Some(virtual_obj), None) => match K::ORIGIN {
                Origin::Virtual => self.create_physical(virtual_obj, pkey).await,
                Origin::Physical => self.delete_virtual(virtual_obj).await,
            },
            (Some(virtual_obj), Some(physical_obj)) => self.sync(virtual_obj, physical_obj).await,
            (None, Some(physical_obj)) => match K::ORIGIN {
                Origin::Physical => self.adopt(vkey, physical_obj).await,
                Origin::Virtual if self.identity.is_managed(&physical_obj.metadata) => {
                    self.delete_physical(vkey, physical_obj).await
                }
                Origin::Virtual => Ok(SyncOutcome::Skipped(format!(
                    "physical {pkey} is not managed by this syncer"
                ))),
            },
            (None, None) => {
                self.identity.forget(vkey);
                Ok(SyncOutcome::NoOp)
            }
        }
    }

    async fn create_physical(
        &self,
        virtual_obj: Object<K>,
        pkey: ObjectKey,
    ) -> Result<SyncOutcome, SyncError> {
        let vkey = virtual_obj.key();
        let physical = Object::<K>::new(
            self.metadata.translate_metadata(&virtual_obj.metadata, &pkey),
            K::translate_spec(&virtual_obj.spec, &vkey, &self.identity),
        );

        info!(%pkey, "Creating physical object");
        let created = self
            .physical_store
            .create(physical)
            .await
            .map_err(|err| self.report(&vkey, Side::Physical, err))?;
        self.identity.remember(vkey, created.key())?;
        Ok(SyncOutcome::Created)
    }

    async fn delete_virtual(&self, virtual_obj: Object<K>) -> Result<SyncOutcome, SyncError> {
        let vkey = virtual_obj.key();
        info!("Physical source is gone, deleting virtual mirror");
        match self.virtual_store.delete(vkey.clone()).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(self.report(&vkey, Side::Virtual, err)),
        }
        self.identity.forget(&vkey);
        Ok(SyncOutcome::Deleted(Side::Virtual))
    }

    async fn delete_physical(
        &self,
        vkey: &ObjectKey,
        physical_obj: Object<K>,
    ) -> Result<SyncOutcome, SyncError> {
        let pkey = physical_obj.key();
        info!(%pkey, "Virtual object is gone, deleting physical object");
        match self.physical_store.delete(pkey).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(self.report(vkey, Side::Physical, err)),
        }
        self.identity.forget(vkey);
        Ok(SyncOutcome::Deleted(Side::Physical))
    }

    async fn sync(
        &self,
        virtual_obj: Object<K>,
        physical_obj: Object<K>,
    ) -> Result<SyncOutcome, SyncError> {
        let vkey = virtual_obj.key();
        if K::ORIGIN == Origin::Virtual && !self.identity.is_managed(&physical_obj.metadata) {
            return Ok(SyncOutcome::Skipped(format!(
                "physical {} is not managed by this syncer",
                physical_obj.key()
            )));
        }
        self.identity.remember(vkey.clone(), physical_obj.key())?;

        // Compare in virtual coordinates so name translation never reads as drift.
        let physical_view = Object::<K> {
            metadata: physical_obj.metadata.clone(),
            spec: K::reverse_spec(&physical_obj.spec, &vkey, &self.identity),
            status: K::reverse_status(&physical_obj.status, &vkey, &self.identity),
        };

        let mut down = PatchBuilder::new(&physical_view);
        let mut up = PatchBuilder::new(&virtual_obj);
        let mut up_status = PatchBuilder::new(&virtual_obj);

        // Objects that originate physically carry the physical controller's metadata.
        if K::ORIGIN == Origin::Virtual {
            let update = self
                .metadata
                .translate_metadata_update(&virtual_obj.metadata, &physical_obj.metadata);
            if update.changed {
                down.stage("metadata", |object| {
                    object.metadata.annotations = update.annotations;
                    object.metadata.labels = update.labels;
                });
            }
            if let Some(annotations) = self
                .metadata
                .translate_annotations_backwards(&virtual_obj.metadata, &physical_obj.metadata)
            {
                up.stage("metadata.annotations", |object| {
                    object.metadata.annotations = annotations;
                });
            }
        }
        self.policy
            .stage(&virtual_obj, &physical_view, &mut down, &mut up, &mut up_status);

        let mut writes = WriteSet::default();

        if let Some(patch) = down.build() {
            info!(fields = ?patch.fields, "Updating physical object");
            let mut object = patch.object;
            object.spec = K::translate_spec(&object.spec, &vkey, &self.identity);
            self.physical_store
                .update(object)
                .await
                .map_err(|err| self.report(&vkey, Side::Physical, err))?;
            writes.physical = true;
        }

        let status_pending = !up_status.is_empty();
        if let Some(patch) = up.build() {
            info!(fields = ?patch.fields, "Updating virtual object");
            self.virtual_store
                .update(patch.object)
                .await
                .map_err(|err| self.report(&vkey, Side::Virtual, err))?;
            writes.virtual_spec = true;
            if status_pending {
                debug!("Virtual status update waits for the next pass");
            }
        } else if let Some(patch) = up_status.build() {
            info!(fields = ?patch.fields, "Updating virtual status");
            self.virtual_store
                .update_status(patch.object)
                .await
                .map_err(|err| self.report(&vkey, Side::Virtual, err))?;
            writes.virtual_status = true;
        }

        if writes.count() == 0 {
            Ok(SyncOutcome::InSync)
        } else {
            Ok(SyncOutcome::Updated(writes))
        }
    }

    async fn adopt(
        &self,
        vkey: &ObjectKey,
        physical_obj: Object<K>,
    ) -> Result<SyncOutcome, SyncError> {
        let mapped = self.identity.to_virtual(&physical_obj.metadata)?;
        if mapped != *vkey {
            return Ok(SyncOutcome::Skipped(format!(
                "physical {} belongs to {mapped}",
                physical_obj.key()
            )));
        }

        let owners = K::virtual_owner_references(&physical_obj, &self.identity, &self.context)
            .await
            .map_err(|err| self.report(vkey, Side::Virtual, err))?;

        let mut metadata = physical_obj.metadata.clone();
        metadata.namespace = vkey.namespace.clone();
        metadata.name = vkey.name.clone();
        metadata.resource_version.clear();
        metadata.uid.clear();
        metadata.owner_references = owners;
        K::reverse_metadata(&mut metadata, vkey, &self.identity);
        strip_engine_metadata(&mut metadata);

        let mirror = Object::<K> {
            metadata,
            spec: K::reverse_spec(&physical_obj.spec, vkey, &self.identity),
            status: K::reverse_status(&physical_obj.status, vkey, &self.identity),
        };

        info!(pkey = %physical_obj.key(), "Adopting physical object");
        match self.virtual_store.create(mirror).await {
            Ok(_) => Ok(SyncOutcome::Adopted),
            Err(SyncError::AlreadyExists { .. }) => {
                let err = SyncError::AdoptionConflict {
                    kind: K::KIND,
                    key: vkey.clone(),
                };
                Err(self.report(vkey, Side::Virtual, err))
            }
            Err(err) => Err(self.report(vkey, Side::Virtual, err)),
        }
    }

    /// Surfaces a failed store call to the observer, unless the next pass resolves
    /// it or the object is not ours.
    fn report(&self, vkey: &ObjectKey, side: Side, err: SyncError) -> SyncError {
        if !defers(&err) && !matches!(err, SyncError::UnmappedIdentity(_)) {
            let object = ObjectRef {
                kind: K::KIND,
                key: vkey.clone(),
            };
            self.observer.warning(
                &object,
                "SyncError",
                &format!("Error syncing to {side} cluster: {err}"),
            );
        }
        err
    }
}

/// Failures the next pass re-derives from fresh reads. A `NotFound` on a write
/// means the object was deleted after this pass read it.
fn defers(err: &SyncError) -> bool {
    err.is_contention() || err.is_not_found()
}
