//! # Store Client
//!
//! This module defines the generic client for talking to a store actor.

use crate::error::SyncError;
use crate::kind::ResourceKind;
use crate::message::{Response, StoreRequest, WatchEvent};
use crate::object::{Object, ObjectKey};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};

/// A type-safe client for one kind in one store.
///
/// The client is cheap to clone (a channel sender plus a broadcast handle) and can be
/// shared across tasks. Every call is a single atomic store operation; with
/// [`StoreClient::with_timeout`] set, a call that takes longer fails with
/// [`SyncError::Timeout`] and has no effect on the caller's side.
pub struct StoreClient<K: ResourceKind> {
    sender: mpsc::Sender<StoreRequest<K>>,
    events: broadcast::Sender<WatchEvent<K>>,
    call_timeout: Option<Duration>,
}

impl<K: ResourceKind> Clone for StoreClient<K> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            events: self.events.clone(),
            call_timeout: self.call_timeout,
        }
    }
}

impl<K: ResourceKind> StoreClient<K> {
    pub fn new(
        sender: mpsc::Sender<StoreRequest<K>>,
        events: broadcast::Sender<WatchEvent<K>>,
    ) -> Self {
        Self {
            sender,
            events,
            call_timeout: None,
        }
    }

    /// Returns a copy of this client whose calls abort after `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Subscribes to the change notifications of the underlying store.
    pub fn watch(&self) -> broadcast::Receiver<WatchEvent<K>> {
        self.events.subscribe()
    }

    async fn call<T>(
        &self,
        op: &'static str,
        request: impl FnOnce(Response<T>) -> StoreRequest<K>,
    ) -> Result<T, SyncError> {
        let (respond_to, response) = oneshot::channel();
        let exchange = async {
            self.sender
                .send(request(respond_to))
                .await
                .map_err(|_| SyncError::StoreClosed)?;
            response.await.map_err(|_| SyncError::StoreDropped)?
        };

        match self.call_timeout {
            Some(after) => tokio::time::timeout(after, exchange)
                .await
                .map_err(|_| SyncError::Timeout { op, after })?,
            None => exchange.await,
        }
    }

    pub async fn get(&self, key: ObjectKey) -> Result<Option<Object<K>>, SyncError> {
        self.call("get", |respond_to| StoreRequest::Get { key, respond_to })
            .await
    }

    pub async fn list(&self) -> Result<Vec<Object<K>>, SyncError> {
        self.call("list", |respond_to| StoreRequest::List { respond_to })
            .await
    }

    pub async fn create(&self, object: Object<K>) -> Result<Object<K>, SyncError> {
        self.call("create", |respond_to| StoreRequest::Create { object, respond_to })
            .await
    }

    pub async fn update(&self, object: Object<K>) -> Result<Object<K>, SyncError> {
        self.call("update", |respond_to| StoreRequest::Update { object, respond_to })
            .await
    }

    pub async fn update_status(&self, object: Object<K>) -> Result<Object<K>, SyncError> {
        self.call("update_status", |respond_to| StoreRequest::UpdateStatus {
            object,
            respond_to,
        })
        .await
    }

    pub async fn delete(&self, key: ObjectKey) -> Result<(), SyncError> {
        self.call("delete", |respond_to| StoreRequest::Delete { key, respond_to })
            .await
    }
}
