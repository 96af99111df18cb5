use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use vsync_framework::mock::{MockStore, RecordedWrite};
use vsync_framework::translator::{MANAGED_BY_LABEL, OBJECT_NAMESPACE_ANNOTATION, OBJECT_NAME_ANNOTATION};
use vsync_framework::{
    FieldMergePolicy, IdentityTranslator, MetadataTranslator, Object, ObjectKey, ObjectMeta,
    Origin, RecordingObserver, Reconciler, ResourceKind, Side, SyncError, SyncOutcome,
    SyncedKind, WriteSet,
};

// --- Test Kinds ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct NoteSpec {
    text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct NoteStatus {
    seen: bool,
}

vsync_framework::impl_field_value!(NoteStatus);

#[derive(Debug, Clone, Default, PartialEq)]
struct Note;

impl ResourceKind for Note {
    const API_VERSION: &'static str = "notes.vsync.dev/v1";
    const KIND: &'static str = "Note";
    type Spec = NoteSpec;
    type Status = NoteStatus;
}

#[async_trait]
impl SyncedKind for Note {
    const ORIGIN: Origin = Origin::Virtual;
    type Context = ();

    fn policy() -> FieldMergePolicy<Self> {
        FieldMergePolicy::<Self>::builder()
            .down("spec.text", |o| o.spec.text.clone(), |o, v| o.spec.text = v)
            .status("status", |o| o.status.clone(), |o, v| o.status = v)
            .build()
    }
}

/// Same shape, but created on the physical side.
#[derive(Debug, Clone, Default, PartialEq)]
struct Receipt;

impl ResourceKind for Receipt {
    const API_VERSION: &'static str = "notes.vsync.dev/v1";
    const KIND: &'static str = "Receipt";
    type Spec = NoteSpec;
    type Status = NoteStatus;
}

#[async_trait]
impl SyncedKind for Receipt {
    const ORIGIN: Origin = Origin::Physical;
    type Context = ();

    fn policy() -> FieldMergePolicy<Self> {
        FieldMergePolicy::<Self>::builder()
            .status("status", |o| o.status.clone(), |o, v| o.status = v)
            .build()
    }
}

// --- Helpers ---

fn identity() -> Arc<IdentityTranslator> {
    Arc::new(IdentityTranslator::new("vsync", "vsync-host"))
}

fn vkey() -> ObjectKey {
    ObjectKey::new("default", "memo")
}

fn pkey() -> ObjectKey {
    ObjectKey::new("vsync-host", "memo-x-default-x-vsync")
}

fn stored<K: ResourceKind>(meta: ObjectMeta, spec: K::Spec, version: &str) -> Object<K> {
    let mut object = Object::new(meta, spec);
    object.metadata.resource_version = version.to_string();
    object.metadata.uid = format!("uid-{version}");
    object
}

fn virtual_note(text: &str) -> Object<Note> {
    stored(
        ObjectMeta::new("default", "memo"),
        NoteSpec { text: text.into() },
        "1",
    )
}

fn physical_note(text: &str) -> Object<Note> {
    let metadata = MetadataTranslator::new(identity())
        .translate_metadata(&ObjectMeta::new("default", "memo"), &pkey());
    stored(metadata, NoteSpec { text: text.into() }, "4")
}

// --- Tests ---

#[tokio::test]
async fn pass_without_drift_only_reads() {
    let virtual_store = MockStore::<Note>::new();
    let physical_store = MockStore::<Note>::new();
    virtual_store.expect_get(vkey()).return_ok(Some(virtual_note("hi")));
    physical_store.expect_get(pkey()).return_ok(Some(physical_note("hi")));

    let reconciler = Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ());
    let outcome = reconciler.reconcile(&vkey()).await.unwrap();

    assert_eq!(outcome, SyncOutcome::InSync);
    virtual_store.verify();
    physical_store.verify();
    assert!(physical_store.writes().is_empty());
}

#[tokio::test]
async fn changed_text_is_a_single_physical_update() {
    let virtual_store = MockStore::<Note>::new();
    let physical_store = MockStore::<Note>::new();
    virtual_store.expect_get(vkey()).return_ok(Some(virtual_note("v2")));
    physical_store.expect_get(pkey()).return_ok(Some(physical_note("v1")));
    physical_store.expect_update().echo();

    let reconciler = Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ());
    let outcome = reconciler.reconcile(&vkey()).await.unwrap();

    assert_eq!(
        outcome,
        SyncOutcome::Updated(WriteSet {
            physical: true,
            ..Default::default()
        })
    );
    physical_store.verify();
    match physical_store.writes().as_slice() {
        [RecordedWrite::Update(object)] => {
            assert_eq!(object.spec.text, "v2");
            assert_eq!(object.metadata.resource_version, "4");
        }
        other => panic!("unexpected writes {other:?}"),
    }
    assert!(virtual_store.writes().is_empty());
}

#[tokio::test]
async fn create_race_is_deferred_without_a_warning() {
    let virtual_store = MockStore::<Note>::new();
    let physical_store = MockStore::<Note>::new();
    let observer = Arc::new(RecordingObserver::new());
    virtual_store.expect_get(vkey()).return_ok(Some(virtual_note("hi")));
    physical_store.expect_get(pkey()).return_ok(None);
    physical_store
        .expect_create()
        .return_err(SyncError::already_exists("Note", pkey()));

    let reconciler = Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ())
        .with_observer(observer.clone());
    let outcome = reconciler.reconcile(&vkey()).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Deferred(_)));
    assert!(observer.events().is_empty());
    assert!(reconciler.identity().cache().is_empty());
    physical_store.verify();
}

#[tokio::test]
async fn stale_physical_update_is_deferred() {
    let virtual_store = MockStore::<Note>::new();
    let physical_store = MockStore::<Note>::new();
    virtual_store.expect_get(vkey()).return_ok(Some(virtual_note("v2")));
    physical_store.expect_get(pkey()).return_ok(Some(physical_note("v1")));
    physical_store
        .expect_update()
        .return_err(SyncError::conflict("Note", pkey(), "4", "5"));

    let reconciler = Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ());
    let outcome = reconciler.reconcile(&vkey()).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Deferred(_)));
    physical_store.verify();
}

#[tokio::test]
async fn physical_write_failure_is_reported() {
    let virtual_store = MockStore::<Note>::new();
    let physical_store = MockStore::<Note>::new();
    let observer = Arc::new(RecordingObserver::new());
    virtual_store.expect_get(vkey()).return_ok(Some(virtual_note("v2")));
    physical_store.expect_get(pkey()).return_ok(Some(physical_note("v1")));
    physical_store.expect_update().return_err(SyncError::Timeout {
        op: "update",
        after: Duration::from_millis(5),
    });

    let reconciler = Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ())
        .with_observer(observer.clone());
    let err = reconciler.reconcile(&vkey()).await.unwrap_err();

    assert!(matches!(err, SyncError::Timeout { .. }));
    let events = observer.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].reason, "SyncError");
    assert_eq!(events[0].object.key, vkey());
    assert_eq!(
        events[0].message,
        "Error syncing to physical cluster: update timed out after 5ms"
    );
}

#[tokio::test]
async fn failed_read_is_reported() {
    let virtual_store = MockStore::<Note>::new();
    let physical_store = MockStore::<Note>::new();
    let observer = Arc::new(RecordingObserver::new());
    virtual_store.expect_get(vkey()).return_err(SyncError::Timeout {
        op: "get",
        after: Duration::from_millis(5),
    });

    let reconciler = Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ())
        .with_observer(observer.clone());
    let err = reconciler.reconcile(&vkey()).await.unwrap_err();

    assert!(matches!(err, SyncError::Timeout { .. }));
    virtual_store.verify();
    physical_store.verify();
    let events = observer.events();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].message,
        "Error syncing to virtual cluster: get timed out after 5ms"
    );
}

#[tokio::test]
async fn physical_deleted_before_update_is_deferred() {
    let virtual_store = MockStore::<Note>::new();
    let physical_store = MockStore::<Note>::new();
    let observer = Arc::new(RecordingObserver::new());
    virtual_store.expect_get(vkey()).return_ok(Some(virtual_note("v2")));
    physical_store.expect_get(pkey()).return_ok(Some(physical_note("v1")));
    physical_store
        .expect_update()
        .return_err(SyncError::not_found("Note", pkey()));

    let reconciler = Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ())
        .with_observer(observer.clone());
    let outcome = reconciler.reconcile(&vkey()).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Deferred(_)));
    assert!(observer.events().is_empty());
    physical_store.verify();
}

#[tokio::test]
async fn already_deleted_physical_counts_as_deleted() {
    let virtual_store = MockStore::<Note>::new();
    let physical_store = MockStore::<Note>::new();
    virtual_store.expect_get(vkey()).return_ok(None);
    physical_store.expect_get(pkey()).return_ok(Some(physical_note("hi")));
    physical_store
        .expect_delete(pkey())
        .return_err(SyncError::not_found("Note", pkey()));

    let reconciler = Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ());
    let outcome = reconciler.reconcile(&vkey()).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Deleted(Side::Physical));
    physical_store.verify();
}

fn physical_receipt() -> Object<Receipt> {
    let meta = ObjectMeta::new("vsync-host", "memo-x-default-x-vsync")
        .with_label(MANAGED_BY_LABEL, "vsync")
        .with_annotation(OBJECT_NAME_ANNOTATION, "memo")
        .with_annotation(OBJECT_NAMESPACE_ANNOTATION, "default");
    stored::<Receipt>(meta, NoteSpec { text: "paid".into() }, "9").with_status(NoteStatus { seen: true })
}

#[tokio::test]
async fn adoption_strips_server_fields() {
    let virtual_store = MockStore::<Receipt>::new();
    let physical_store = MockStore::<Receipt>::new();
    virtual_store.expect_get(vkey()).return_ok(None);
    physical_store.expect_get(pkey()).return_ok(Some(physical_receipt()));
    virtual_store.expect_create().echo();

    let reconciler =
        Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ());
    let outcome = reconciler.reconcile(&vkey()).await.unwrap();

    assert_eq!(outcome, SyncOutcome::Adopted);
    virtual_store.verify();
    match virtual_store.writes().as_slice() {
        [RecordedWrite::Create(object)] => {
            assert_eq!(object.key(), vkey());
            assert!(object.metadata.resource_version.is_empty());
            assert!(object.metadata.uid.is_empty());
            assert!(object.metadata.owner_references.is_empty());
            assert!(object.metadata.labels.is_empty());
            assert!(object.metadata.annotations.is_empty());
            assert_eq!(object.spec.text, "paid");
            assert!(object.status.seen);
        }
        other => panic!("unexpected writes {other:?}"),
    }
    assert_eq!(reconciler.identity().cache().find(&vkey()), Some(pkey()));
}

#[tokio::test]
async fn adoption_onto_an_existing_name_is_an_error() {
    let virtual_store = MockStore::<Receipt>::new();
    let physical_store = MockStore::<Receipt>::new();
    let observer = Arc::new(RecordingObserver::new());
    virtual_store.expect_get(vkey()).return_ok(None);
    physical_store.expect_get(pkey()).return_ok(Some(physical_receipt()));
    virtual_store
        .expect_create()
        .return_err(SyncError::already_exists("Receipt", vkey()));

    let reconciler =
        Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ())
            .with_observer(observer.clone());
    let err = reconciler.reconcile(&vkey()).await.unwrap_err();

    assert!(matches!(err, SyncError::AdoptionConflict { .. }));
    let events = observer.events();
    assert_eq!(events.len(), 1);
    assert!(events[0]
        .message
        .starts_with("Error syncing to virtual cluster: cannot adopt Receipt default/memo"));
}

#[tokio::test]
async fn unrelated_physical_object_is_skipped() {
    let virtual_store = MockStore::<Receipt>::new();
    let physical_store = MockStore::<Receipt>::new();
    let mut foreign = physical_receipt();
    foreign.metadata.annotations.clear();
    virtual_store.expect_get(vkey()).return_ok(None);
    physical_store.expect_get(pkey()).return_ok(Some(foreign));

    let reconciler =
        Reconciler::new(virtual_store.client(), physical_store.client(), identity(), ());
    let outcome = reconciler.reconcile(&vkey()).await.unwrap();

    assert!(matches!(outcome, SyncOutcome::Skipped(_)));
    assert!(virtual_store.writes().is_empty());
}
