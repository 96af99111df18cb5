//! # Store Messages
//!
//! The request type sent from a [`StoreClient`](crate::StoreClient) to a
//! [`StoreActor`](crate::StoreActor), and the watch events the actor publishes after
//! every successful write.

use crate::error::SyncError;
use crate::kind::ResourceKind;
use crate::object::{Object, ObjectKey};
use tokio::sync::oneshot;

/// One-shot response channel used by the store actor.
pub type Response<T> = oneshot::Sender<Result<T, SyncError>>;

/// Requests understood by a store.
///
/// Status writes are a separate request from spec writes: `Update` replaces
/// metadata and spec and leaves status alone, `UpdateStatus` does the opposite.
#[derive(Debug)]
pub enum StoreRequest<K: ResourceKind> {
    Get {
        key: ObjectKey,
        respond_to: Response<Option<Object<K>>>,
    },
    List {
        respond_to: Response<Vec<Object<K>>>,
    },
    Create {
        object: Object<K>,
        respond_to: Response<Object<K>>,
    },
    Update {
        object: Object<K>,
        respond_to: Response<Object<K>>,
    },
    UpdateStatus {
        object: Object<K>,
        respond_to: Response<Object<K>>,
    },
    Delete {
        key: ObjectKey,
        respond_to: Response<()>,
    },
}

/// Change notification published by a store.
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K: ResourceKind> {
    Applied(Object<K>),
    Deleted(Object<K>),
}

impl<K: ResourceKind> WatchEvent<K> {
    pub fn object(&self) -> &Object<K> {
        match self {
            WatchEvent::Applied(object) | WatchEvent::Deleted(object) => object,
        }
    }
}
