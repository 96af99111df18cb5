//! # Mock Store & Testing Guide
//!
//! `MockStore<K>` hands out a real [`StoreClient<K>`], but answers its requests from
//! a queue of expectations instead of a [`StoreActor`](crate::StoreActor). Use it to
//! pin down exactly which reads and writes a reconciliation pass issues, and to
//! inject store failures that are hard to provoke against a real store.
//!
//! ## When to use Mocks vs Real Stores
//!
//! | Feature | MockStore | StoreActor |
//! |---------|-----------|------------|
//! | **Write assertions** | Exact, in order | Inspect state afterwards |
//! | **Error injection** | `return_err` | Requires racing writers |
//! | **State** | None (expectations) | Real optimistic concurrency |
//! | **Use Case** | One pass, precise | Multi-pass scenarios |
//!
//! ## Example
//!
//! ```ignore
//! let physical = MockStore::<Service>::new();
//! physical.expect_get(pkey.clone()).return_ok(None);
//! physical.expect_create().echo();
//!
//! let reconciler = Reconciler::new(virtual_store, physical.client(), identity, ());
//! reconciler.reconcile(&vkey).await?;
//!
//! physical.verify(); // every expectation consumed, no unexpected request
//! assert_eq!(physical.writes().len(), 1);
//! ```

use crate::client::StoreClient;
use crate::error::SyncError;
use crate::kind::ResourceKind;
use crate::message::StoreRequest;
use crate::object::{Object, ObjectKey};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};

enum Reply<T> {
    /// Answer a write with the written object, as a store would.
    Echo,
    Value(Result<T, SyncError>),
}

enum Expectation<K: ResourceKind> {
    Get {
        key: ObjectKey,
        response: Result<Option<Object<K>>, SyncError>,
    },
    List {
        response: Result<Vec<Object<K>>, SyncError>,
    },
    Create {
        response: Reply<Object<K>>,
    },
    Update {
        response: Reply<Object<K>>,
    },
    UpdateStatus {
        response: Reply<Object<K>>,
    },
    Delete {
        key: ObjectKey,
        response: Result<(), SyncError>,
    },
}

impl<K: ResourceKind> Expectation<K> {
    fn name(&self) -> &'static str {
        match self {
            Expectation::Get { .. } => "get",
            Expectation::List { .. } => "list",
            Expectation::Create { .. } => "create",
            Expectation::Update { .. } => "update",
            Expectation::UpdateStatus { .. } => "update_status",
            Expectation::Delete { .. } => "delete",
        }
    }
}

/// A write the mock received.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedWrite<K: ResourceKind> {
    Create(Object<K>),
    Update(Object<K>),
    UpdateStatus(Object<K>),
    Delete(ObjectKey),
}

struct State<K: ResourceKind> {
    expectations: VecDeque<Expectation<K>>,
    writes: Vec<RecordedWrite<K>>,
    mismatches: Vec<String>,
}

type Shared<K> = Arc<Mutex<State<K>>>;

fn lock<K: ResourceKind>(state: &Shared<K>) -> MutexGuard<'_, State<K>> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A store double with an ordered expectation queue.
pub struct MockStore<K: ResourceKind> {
    client: StoreClient<K>,
    state: Shared<K>,
    _handle: tokio::task::JoinHandle<()>,
}

impl<K: ResourceKind> MockStore<K> {
    /// Creates a mock with no expectations. Must be called inside a tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<StoreRequest<K>>(100);
        let (events, _) = broadcast::channel(16);
        let state: Shared<K> = Arc::new(Mutex::new(State {
            expectations: VecDeque::new(),
            writes: Vec::new(),
            mismatches: Vec::new(),
        }));
        let task_state = state.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let mut state = lock(&task_state);
                let expectation = state.expectations.pop_front();
                answer(&mut state, request, expectation);
            }
        });

        Self {
            client: StoreClient::new(sender, events),
            state,
            _handle: handle,
        }
    }

    pub fn client(&self) -> StoreClient<K> {
        self.client.clone()
    }

    pub fn expect_get(&self, key: ObjectKey) -> GetExpectationBuilder<K> {
        GetExpectationBuilder {
            key,
            state: self.state.clone(),
        }
    }

    pub fn expect_list(&self) -> ListExpectationBuilder<K> {
        ListExpectationBuilder {
            state: self.state.clone(),
        }
    }

    pub fn expect_create(&self) -> WriteExpectationBuilder<K> {
        self.write_expectation(WriteKind::Create)
    }

    pub fn expect_update(&self) -> WriteExpectationBuilder<K> {
        self.write_expectation(WriteKind::Update)
    }

    pub fn expect_update_status(&self) -> WriteExpectationBuilder<K> {
        self.write_expectation(WriteKind::UpdateStatus)
    }

    pub fn expect_delete(&self, key: ObjectKey) -> DeleteExpectationBuilder<K> {
        DeleteExpectationBuilder {
            key,
            state: self.state.clone(),
        }
    }

    fn write_expectation(&self, kind: WriteKind) -> WriteExpectationBuilder<K> {
        WriteExpectationBuilder {
            kind,
            state: self.state.clone(),
        }
    }

    /// Writes received so far, in order.
    pub fn writes(&self) -> Vec<RecordedWrite<K>> {
        lock(&self.state).writes.clone()
    }

    /// Panics if an expectation is left over or a request did not match.
    pub fn verify(&self) {
        let state = lock(&self.state);
        if !state.mismatches.is_empty() {
            panic!("Unexpected requests: {}", state.mismatches.join("; "));
        }
        if !state.expectations.is_empty() {
            let remaining: Vec<_> = state.expectations.iter().map(Expectation::name).collect();
            panic!(
                "Not all expectations were met. {} remaining: {}",
                remaining.len(),
                remaining.join(", ")
            );
        }
    }
}

impl<K: ResourceKind> Default for MockStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn echo<K: ResourceKind>(reply: Reply<Object<K>>, mut written: Object<K>) -> Result<Object<K>, SyncError> {
    match reply {
        Reply::Echo => {
            let next = written
                .metadata
                .resource_version
                .parse::<u64>()
                .map(|version| version + 1)
                .unwrap_or(1);
            written.metadata.resource_version = next.to_string();
            if written.metadata.uid.is_empty() {
                written.metadata.uid = uuid::Uuid::new_v4().to_string();
            }
            Ok(written)
        }
        Reply::Value(result) => result,
    }
}

fn answer<K: ResourceKind>(
    state: &mut State<K>,
    request: StoreRequest<K>,
    expectation: Option<Expectation<K>>,
) {
    match (request, expectation) {
        (StoreRequest::Get { key, respond_to }, Some(Expectation::Get { key: expected, response })) => {
            if key != expected {
                state.mismatches.push(format!("get {key}, expected get {expected}"));
            }
            let _ = respond_to.send(response);
        }
        (StoreRequest::List { respond_to }, Some(Expectation::List { response })) => {
            let _ = respond_to.send(response);
        }
        (StoreRequest::Create { object, respond_to }, Some(Expectation::Create { response })) => {
            state.writes.push(RecordedWrite::Create(object.clone()));
            let _ = respond_to.send(echo(response, object));
        }
        (StoreRequest::Update { object, respond_to }, Some(Expectation::Update { response })) => {
            state.writes.push(RecordedWrite::Update(object.clone()));
            let _ = respond_to.send(echo(response, object));
        }
        (
            StoreRequest::UpdateStatus { object, respond_to },
            Some(Expectation::UpdateStatus { response }),
        ) => {
            state.writes.push(RecordedWrite::UpdateStatus(object.clone()));
            let _ = respond_to.send(echo(response, object));
        }
        (StoreRequest::Delete { key, respond_to }, Some(Expectation::Delete { key: expected, response })) => {
            if key != expected {
                state.mismatches.push(format!("delete {key}, expected delete {expected}"));
            }
            state.writes.push(RecordedWrite::Delete(key));
            let _ = respond_to.send(response);
        }
        (request, expectation) => {
            let expected = expectation.as_ref().map(Expectation::name).unwrap_or("nothing");
            state
                .mismatches
                .push(format!("{} while expecting {expected}", request_name(&request)));
            // Dropping the responder fails the call with `StoreDropped`.
        }
    }
}

fn request_name<K: ResourceKind>(request: &StoreRequest<K>) -> String {
    match request {
        StoreRequest::Get { key, .. } => format!("get {key}"),
        StoreRequest::List { .. } => "list".to_string(),
        StoreRequest::Create { object, .. } => format!("create {}", object.key()),
        StoreRequest::Update { object, .. } => format!("update {}", object.key()),
        StoreRequest::UpdateStatus { object, .. } => format!("update_status {}", object.key()),
        StoreRequest::Delete { key, .. } => format!("delete {key}"),
    }
}

pub struct GetExpectationBuilder<K: ResourceKind> {
    key: ObjectKey,
    state: Shared<K>,
}

impl<K: ResourceKind> GetExpectationBuilder<K> {
    pub fn return_ok(self, value: Option<Object<K>>) {
        lock(&self.state).expectations.push_back(Expectation::Get {
            key: self.key,
            response: Ok(value),
        });
    }

    pub fn return_err(self, error: SyncError) {
        lock(&self.state).expectations.push_back(Expectation::Get {
            key: self.key,
            response: Err(error),
        });
    }
}

pub struct ListExpectationBuilder<K: ResourceKind> {
    state: Shared<K>,
}

impl<K: ResourceKind> ListExpectationBuilder<K> {
    pub fn return_ok(self, objects: Vec<Object<K>>) {
        lock(&self.state)
            .expectations
            .push_back(Expectation::List { response: Ok(objects) });
    }
}

enum WriteKind {
    Create,
    Update,
    UpdateStatus,
}

/// Builder for `create`, `update` and `update_status` expectations.
pub struct WriteExpectationBuilder<K: ResourceKind> {
    kind: WriteKind,
    state: Shared<K>,
}

impl<K: ResourceKind> WriteExpectationBuilder<K> {
    /// Succeeds with the written object and a bumped resource version.
    pub fn echo(self) {
        self.push(Reply::Echo);
    }

    pub fn return_ok(self, object: Object<K>) {
        self.push(Reply::Value(Ok(object)));
    }

    pub fn return_err(self, error: SyncError) {
        self.push(Reply::Value(Err(error)));
    }

    fn push(self, response: Reply<Object<K>>) {
        let expectation = match self.kind {
            WriteKind::Create => Expectation::Create { response },
            WriteKind::Update => Expectation::Update { response },
            WriteKind::UpdateStatus => Expectation::UpdateStatus { response },
        };
        lock(&self.state).expectations.push_back(expectation);
    }
}

pub struct DeleteExpectationBuilder<K: ResourceKind> {
    key: ObjectKey,
    state: Shared<K>,
}

impl<K: ResourceKind> DeleteExpectationBuilder<K> {
    pub fn return_ok(self) {
        lock(&self.state).expectations.push_back(Expectation::Delete {
            key: self.key,
            response: Ok(()),
        });
    }

    pub fn return_err(self, error: SyncError) {
        lock(&self.state).expectations.push_back(Expectation::Delete {
            key: self.key,
            response: Err(error),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectMeta;
    use crate::test_support::{Widget, WidgetSpec};

    #[tokio::test]
    async fn answers_in_order_and_records_writes() {
        let mock = MockStore::<Widget>::new();
        let key = ObjectKey::new("default", "a");
        mock.expect_get(key.clone()).return_ok(None);
        mock.expect_create().echo();

        let client = mock.client();
        assert!(client.get(key.clone()).await.unwrap().is_none());
        let created = client
            .create(Object::new(ObjectMeta::new("default", "a"), WidgetSpec::default()))
            .await
            .unwrap();
        assert_eq!(created.metadata.resource_version, "1");

        mock.verify();
        assert_eq!(mock.writes().len(), 1);
    }

    #[tokio::test]
    async fn injected_errors_reach_the_caller() {
        let mock = MockStore::<Widget>::new();
        let key = ObjectKey::new("default", "a");
        mock.expect_delete(key.clone())
            .return_err(SyncError::not_found("Widget", key.clone()));

        let err = mock.client().delete(key).await.unwrap_err();
        assert!(err.is_not_found());
        mock.verify();
    }

    #[tokio::test]
    #[should_panic(expected = "Unexpected requests")]
    async fn unexpected_request_fails_verification() {
        let mock = MockStore::<Widget>::new();
        let err = mock.client().list().await.unwrap_err();
        assert!(matches!(err, SyncError::StoreDropped));
        mock.verify();
    }

    #[tokio::test]
    #[should_panic(expected = "Not all expectations were met")]
    async fn leftover_expectation_fails_verification() {
        let mock = MockStore::<Widget>::new();
        mock.expect_update().echo();
        mock.verify();
    }
}
