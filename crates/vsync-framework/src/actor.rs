//! # In-Memory Store Actor
//!
//! `StoreActor` is the reference implementation of the store contract both sides of
//! the syncer talk to. It owns the objects of one kind in one store and processes
//! [`StoreRequest`]s sequentially, so the map needs no locking.
//!
//! Semantics follow an API server with optimistic concurrency:
//!
//! * **Create** fails with [`SyncError::AlreadyExists`] for a taken key and rejects
//!   objects that still carry a resource version or uid. The store assigns both.
//! * **Update** / **UpdateStatus** fail with [`SyncError::Conflict`] when the supplied
//!   resource version is stale. A write that changes nothing is acknowledged without
//!   bumping the version or publishing an event.
//! * **Delete** fails with [`SyncError::NotFound`] for a missing key.
//!
//! Every effective write publishes a [`WatchEvent`] to subscribers of
//! [`StoreClient::watch`].

use crate::client::StoreClient;
use crate::error::SyncError;
use crate::kind::ResourceKind;
use crate::message::{StoreRequest, WatchEvent};
use crate::object::{Object, ObjectKey};
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

const WATCH_CAPACITY: usize = 256;

/// The actor that owns the objects of kind `K` in one store.
pub struct StoreActor<K: ResourceKind> {
    store_name: &'static str,
    receiver: mpsc::Receiver<StoreRequest<K>>,
    events: broadcast::Sender<WatchEvent<K>>,
    objects: HashMap<ObjectKey, Object<K>>,
    next_version: u64,
}

impl<K: ResourceKind> StoreActor<K> {
    /// Creates a new `StoreActor` and its associated `StoreClient`.
    ///
    /// `store_name` only labels log lines ("virtual", "physical").
    pub fn new(store_name: &'static str, buffer_size: usize) -> (Self, StoreClient<K>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        let actor = Self {
            store_name,
            receiver,
            events: events.clone(),
            objects: HashMap::new(),
            next_version: 1,
        };
        (actor, StoreClient::new(sender, events))
    }

    /// Runs the request loop until every client has been dropped.
    pub async fn run(mut self) {
        let store = self.store_name;
        let kind = K::KIND;
        info!(store, kind, "Store started");

        while let Some(request) = self.receiver.recv().await {
            match request {
                StoreRequest::Get { key, respond_to } => {
                    let object = self.objects.get(&key).cloned();
                    debug!(store, kind, %key, found = object.is_some(), "Get");
                    let _ = respond_to.send(Ok(object));
                }
                StoreRequest::List { respond_to } => {
                    let mut objects: Vec<_> = self.objects.values().cloned().collect();
                    objects.sort_by(|a, b| a.key().cmp(&b.key()));
                    let _ = respond_to.send(Ok(objects));
                }
                StoreRequest::Create { object, respond_to } => {
                    let result = self.create(object);
                    let _ = respond_to.send(result);
                }
                StoreRequest::Update { object, respond_to } => {
                    let result = self.write(object, |stored, incoming| {
                        stored.metadata.labels = incoming.metadata.labels;
                        stored.metadata.annotations = incoming.metadata.annotations;
                        stored.metadata.owner_references = incoming.metadata.owner_references;
                        stored.spec = incoming.spec;
                    });
                    let _ = respond_to.send(result);
                }
                StoreRequest::UpdateStatus { object, respond_to } => {
                    let result = self.write(object, |stored, incoming| {
                        stored.status = incoming.status;
                    });
                    let _ = respond_to.send(result);
                }
                StoreRequest::Delete { key, respond_to } => {
                    let result = match self.objects.remove(&key) {
                        Some(object) => {
                            info!(store, kind, %key, size = self.objects.len(), "Deleted");
                            let _ = self.events.send(WatchEvent::Deleted(object));
                            Ok(())
                        }
                        None => {
                            debug!(store, kind, %key, "Delete of missing object");
                            Err(SyncError::not_found(K::KIND, key))
                        }
                    };
                    let _ = respond_to.send(result);
                }
            }
        }

        info!(store, kind, size = self.objects.len(), "Shutdown");
    }

    fn bump_version(&mut self) -> String {
        let version = self.next_version;
        self.next_version += 1;
        version.to_string()
    }

    fn create(&mut self, mut object: Object<K>) -> Result<Object<K>, SyncError> {
        let key = object.key();
        if object.metadata.name.is_empty() {
            return Err(SyncError::InvalidObject {
                kind: K::KIND,
                key,
                reason: "name is required".into(),
            });
        }
        if !object.metadata.resource_version.is_empty() || !object.metadata.uid.is_empty() {
            warn!(store = self.store_name, kind = K::KIND, %key, "Create with server-assigned fields");
            return Err(SyncError::InvalidObject {
                kind: K::KIND,
                key,
                reason: "resourceVersion and uid must not be set on create".into(),
            });
        }
        if self.objects.contains_key(&key) {
            return Err(SyncError::already_exists(K::KIND, key));
        }

        object.metadata.uid = Uuid::new_v4().to_string();
        object.metadata.resource_version = self.bump_version();
        self.objects.insert(key.clone(), object.clone());
        info!(store = self.store_name, kind = K::KIND, %key, size = self.objects.len(), "Created");
        let _ = self.events.send(WatchEvent::Applied(object.clone()));
        Ok(object)
    }

    fn write(
        &mut self,
        incoming: Object<K>,
        apply: impl FnOnce(&mut Object<K>, Object<K>),
    ) -> Result<Object<K>, SyncError> {
        let key = incoming.key();
        let Some(current) = self.objects.get(&key) else {
            return Err(SyncError::not_found(K::KIND, key));
        };

        let expected = &incoming.metadata.resource_version;
        if !expected.is_empty() && *expected != current.metadata.resource_version {
            return Err(SyncError::conflict(
                K::KIND,
                key,
                expected.clone(),
                current.metadata.resource_version.clone(),
            ));
        }

        let mut updated = current.clone();
        apply(&mut updated, incoming);
        if updated == *current {
            debug!(store = self.store_name, kind = K::KIND, %key, "Write without changes");
            return Ok(updated);
        }

        updated.metadata.resource_version = self.bump_version();
        self.objects.insert(key.clone(), updated.clone());
        info!(
            store = self.store_name,
            kind = K::KIND,
            %key,
            resource_version = %updated.metadata.resource_version,
            "Updated"
        );
        let _ = self.events.send(WatchEvent::Applied(updated.clone()));
        Ok(updated)
    }
}
