use super::config::SyncConfig;
use super::error::SystemError;
use crate::controller::ServingController;
use crate::model::{Configuration, Revision, Service};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};
use vsync_framework::{
    CrdMirror, IdentityTranslator, MetadataTranslator, ObjectKey, OwnerRefRewriter, Reconciler,
    ResourceKind, SchemaCatalog, SchemaRegistrar, StoreActor, StoreClient, SyncObserver,
    SyncedKind, TracingObserver, WatchEvent,
};

/// Runs the syncer for services, configurations and revisions.
///
/// `SyncSystem` owns:
/// - **Stores**: one in-memory store actor per kind and side.
/// - **Reconcilers**: one per kind, each with its own identity cache.
/// - **Workers**: one task per kind that turns watch events and periodic resyncs
///   into reconciliation passes.
/// - **Serving controller**: the physical-side controller that generates
///   configurations and revisions.
///
/// # Example
///
/// ```ignore
/// let system = SyncSystem::start(SyncConfig::default()).await?;
///
/// system.virtual_services.create(service).await?;
/// // ... the physical service, its configuration and revision appear ...
///
/// system.shutdown().await?;
/// ```
pub struct SyncSystem {
    pub virtual_services: StoreClient<Service>,
    pub virtual_configurations: StoreClient<Configuration>,
    pub virtual_revisions: StoreClient<Revision>,

    pub physical_services: StoreClient<Service>,
    pub physical_configurations: StoreClient<Configuration>,
    pub physical_revisions: StoreClient<Revision>,

    pub virtual_schemas: SchemaCatalog,

    config: SyncConfig,
    enabled: Vec<&'static str>,
    shutdown: watch::Sender<bool>,
    /// Workers and the controller; they stop on the shutdown signal.
    tasks: Vec<JoinHandle<()>>,
    /// Store actors; they stop once every client is gone.
    stores: Vec<JoinHandle<()>>,
}

/// The store actors of every kind on both sides, started ahead of the syncer.
///
/// Objects written here before [`SyncSystem::start_on`] model a cluster that
/// already has state when the syncer comes up.
pub struct ClusterStores {
    pub virtual_services: StoreClient<Service>,
    pub virtual_configurations: StoreClient<Configuration>,
    pub virtual_revisions: StoreClient<Revision>,

    pub physical_services: StoreClient<Service>,
    pub physical_configurations: StoreClient<Configuration>,
    pub physical_revisions: StoreClient<Revision>,

    handles: Vec<JoinHandle<()>>,
}

impl ClusterStores {
    pub fn spawn(config: &SyncConfig) -> Result<Self, SystemError> {
        config.validate()?;
        let mut handles = Vec::new();
        let (virtual_services, physical_services) = spawn_pair(config, &mut handles);
        let (virtual_configurations, physical_configurations) = spawn_pair(config, &mut handles);
        let (virtual_revisions, physical_revisions) = spawn_pair(config, &mut handles);
        Ok(Self {
            virtual_services,
            virtual_configurations,
            virtual_revisions,
            physical_services,
            physical_configurations,
            physical_revisions,
            handles,
        })
    }
}

fn spawn_pair<K: ResourceKind>(
    config: &SyncConfig,
    handles: &mut Vec<JoinHandle<()>>,
) -> (StoreClient<K>, StoreClient<K>) {
    let (virtual_actor, virtual_store) = StoreActor::<K>::new("virtual", config.channel_buffer);
    let (physical_actor, physical_store) = StoreActor::<K>::new("physical", config.channel_buffer);
    handles.push(tokio::spawn(virtual_actor.run()));
    handles.push(tokio::spawn(physical_actor.run()));
    (
        virtual_store.with_timeout(config.call_timeout()),
        physical_store.with_timeout(config.call_timeout()),
    )
}

impl SyncSystem {
    /// Starts against a physical store that has every serving kind installed.
    pub async fn start(config: SyncConfig) -> Result<Self, SystemError> {
        let physical_schemas = SchemaCatalog::new();
        physical_schemas.install(Service::descriptor());
        physical_schemas.install(Configuration::descriptor());
        physical_schemas.install(Revision::descriptor());
        Self::start_with(config, physical_schemas, Arc::new(TracingObserver)).await
    }

    /// Starts on fresh, empty stores.
    pub async fn start_with(
        config: SyncConfig,
        physical_schemas: SchemaCatalog,
        observer: Arc<dyn SyncObserver>,
    ) -> Result<Self, SystemError> {
        let stores = ClusterStores::spawn(&config)?;
        Self::start_on(config, stores, physical_schemas, observer).await
    }

    /// Starts the controller and a worker for every kind whose schema can be
    /// mirrored from `physical_schemas`, on top of running `stores`.
    ///
    /// A kind whose schema is missing is left disabled; the others run normally.
    pub async fn start_on(
        config: SyncConfig,
        stores: ClusterStores,
        physical_schemas: SchemaCatalog,
        observer: Arc<dyn SyncObserver>,
    ) -> Result<Self, SystemError> {
        config.validate()?;
        info!(suffix = %config.suffix, target_namespace = %config.target_namespace, "Starting sync system");

        let ClusterStores {
            virtual_services,
            virtual_configurations,
            virtual_revisions,
            physical_services,
            physical_configurations,
            physical_revisions,
            handles: store_handles,
        } = stores;

        // 1. Reconcilers, children wired to their parent's virtual store
        let identity = || {
            Arc::new(IdentityTranslator::new(
                config.suffix.clone(),
                config.target_namespace.clone(),
            ))
        };
        let service_identity = identity();
        let configuration_identity = identity();
        let revision_identity = identity();

        let service_reconciler = Reconciler::<Service>::new(
            virtual_services.clone(),
            physical_services.clone(),
            service_identity.clone(),
            (),
        )
        .with_metadata(
            MetadataTranslator::new(service_identity.clone())
                .with_excluded_annotations(config.excluded_annotations.iter().cloned()),
        )
        .with_observer(observer.clone());

        let configuration_reconciler = Reconciler::<Configuration>::new(
            virtual_configurations.clone(),
            physical_configurations.clone(),
            configuration_identity.clone(),
            OwnerRefRewriter::new(virtual_services.clone(), service_identity),
        )
        .with_observer(observer.clone());

        let revision_reconciler = Reconciler::<Revision>::new(
            virtual_revisions.clone(),
            physical_revisions.clone(),
            revision_identity,
            OwnerRefRewriter::new(virtual_configurations.clone(), configuration_identity),
        )
        .with_observer(observer);

        // 2. Schemas, then one worker per registered kind
        let virtual_schemas = SchemaCatalog::new();
        let registrar = CrdMirror::new(physical_schemas, virtual_schemas.clone());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let resync = config.resync_interval();
        let mut tasks = Vec::new();
        let mut enabled = Vec::new();

        if register::<Service>(&registrar).await {
            tasks.push(spawn_worker(Arc::new(service_reconciler), resync, shutdown_rx.clone()));
            enabled.push(Service::KIND);
        }
        if register::<Configuration>(&registrar).await {
            tasks.push(spawn_worker(
                Arc::new(configuration_reconciler),
                resync,
                shutdown_rx.clone(),
            ));
            enabled.push(Configuration::KIND);
        }
        if register::<Revision>(&registrar).await {
            tasks.push(spawn_worker(Arc::new(revision_reconciler), resync, shutdown_rx.clone()));
            enabled.push(Revision::KIND);
        }

        if enabled.is_empty() {
            return Err(SystemError::NoKindsEnabled);
        }

        // 3. The physical serving controller
        let controller = ServingController::new(
            physical_services.clone(),
            physical_configurations.clone(),
            physical_revisions.clone(),
        );
        tasks.push(controller.spawn(resync, shutdown_rx));

        info!(kinds = ?enabled, "Sync system started");
        Ok(Self {
            virtual_services,
            virtual_configurations,
            virtual_revisions,
            physical_services,
            physical_configurations,
            physical_revisions,
            virtual_schemas,
            config,
            enabled,
            shutdown,
            tasks,
            stores: store_handles,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Kinds whose schema was registered and which are being synced.
    pub fn enabled_kinds(&self) -> &[&'static str] {
        &self.enabled
    }

    /// Stops workers and the controller, then the stores.
    ///
    /// In-flight passes are awaited. Clones of the public store clients held
    /// elsewhere keep their store running, so drop them first.
    pub async fn shutdown(self) -> Result<(), SystemError> {
        info!("Shutting down sync system...");
        let Self {
            virtual_services,
            virtual_configurations,
            virtual_revisions,
            physical_services,
            physical_configurations,
            physical_revisions,
            shutdown,
            tasks,
            stores,
            ..
        } = self;

        let _ = shutdown.send(true);
        let task_error = join_all(tasks, "Sync task failed").await;

        drop(virtual_services);
        drop(virtual_configurations);
        drop(virtual_revisions);
        drop(physical_services);
        drop(physical_configurations);
        drop(physical_revisions);

        let store_error = join_all(stores, "Store task failed").await;

        if let Some(err) = task_error.or(store_error) {
            return Err(err.into());
        }
        info!("Sync system shutdown complete.");
        Ok(())
    }
}

/// Awaits every handle, even after a failure, and returns the first error.
async fn join_all(handles: Vec<JoinHandle<()>>, failure: &'static str) -> Option<JoinError> {
    let mut first = None;
    for handle in handles {
        if let Err(err) = handle.await {
            error!(%err, "{}", failure);
            first.get_or_insert(err);
        }
    }
    first
}

async fn register<K: ResourceKind>(registrar: &dyn SchemaRegistrar) -> bool {
    match registrar.ensure(&K::descriptor()).await {
        Ok(()) => true,
        Err(err) => {
            error!(kind = K::KIND, %err, "Schema registration failed, kind disabled");
            false
        }
    }
}

/// Subscribes to both stores before the worker task starts, so no write after
/// startup goes unseen.
fn spawn_worker<K>(
    reconciler: Arc<Reconciler<K>>,
    resync: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    K: SyncedKind,
    K::Context: 'static,
{
    let virtual_events = reconciler.virtual_store().watch();
    let physical_events = reconciler.physical_store().watch();
    tokio::spawn(run_worker(
        reconciler,
        virtual_events,
        physical_events,
        resync,
        shutdown,
    ))
}

/// Event loop of one kind.
///
/// Virtual events name their pair directly; physical events are mapped back
/// through the identity translator and dropped when they are not ours. A lagged
/// subscription or the resync tick reconciles everything either store knows. The
/// first tick fires immediately and picks up what existed before startup.
async fn run_worker<K>(
    reconciler: Arc<Reconciler<K>>,
    mut virtual_events: broadcast::Receiver<WatchEvent<K>>,
    mut physical_events: broadcast::Receiver<WatchEvent<K>>,
    resync: Duration,
    mut shutdown: watch::Receiver<bool>,
) where
    K: SyncedKind,
    K::Context: 'static,
{
    let kind = K::KIND;
    let mut ticker = tokio::time::interval(resync);
    let mut passes = JoinSet::new();
    info!(kind, "Worker started");

    loop {
        tokio::select! {
            event = virtual_events.recv() => match event {
                Ok(event) => spawn_pass(&mut passes, &reconciler, event.object().key()),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(kind, missed, "Virtual events lagged");
                    resync_all(&mut passes, &reconciler).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            event = physical_events.recv() => match event {
                Ok(event) => {
                    if let Some(vkey) = map_physical(&reconciler, &event) {
                        spawn_pass(&mut passes, &reconciler, vkey);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(kind, missed, "Physical events lagged");
                    resync_all(&mut passes, &reconciler).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ticker.tick() => resync_all(&mut passes, &reconciler).await,
            Some(finished) = passes.join_next() => {
                if let Err(err) = finished {
                    error!(kind, %err, "Pass panicked");
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    while let Some(finished) = passes.join_next().await {
        if let Err(err) = finished {
            error!(kind, %err, "Pass panicked");
        }
    }
    info!(kind, in_flight = reconciler.in_flight(), "Worker stopped");
}

fn map_physical<K: SyncedKind>(
    reconciler: &Reconciler<K>,
    event: &WatchEvent<K>,
) -> Option<ObjectKey> {
    let object = event.object();
    match reconciler.identity().to_virtual(&object.metadata) {
        Ok(vkey) => Some(vkey),
        Err(err) => {
            debug!(kind = K::KIND, pkey = %object.key(), %err, "Ignoring physical event");
            None
        }
    }
}

fn spawn_pass<K>(passes: &mut JoinSet<()>, reconciler: &Arc<Reconciler<K>>, vkey: ObjectKey)
where
    K: SyncedKind,
    K::Context: 'static,
{
    let reconciler = reconciler.clone();
    passes.spawn(async move {
        if let Err(err) = reconciler.reconcile(&vkey).await {
            warn!(kind = K::KIND, key = %vkey, %err, "Sync failed");
        }
    });
}

async fn resync_all<K>(passes: &mut JoinSet<()>, reconciler: &Arc<Reconciler<K>>)
where
    K: SyncedKind,
    K::Context: 'static,
{
    let mut keys = BTreeSet::new();
    match reconciler.virtual_store().list().await {
        Ok(objects) => keys.extend(objects.iter().map(|object| object.key())),
        Err(err) => warn!(kind = K::KIND, %err, "Failed to list virtual objects"),
    }
    match reconciler.physical_store().list().await {
        Ok(objects) => keys.extend(objects.iter().filter_map(|object| {
            reconciler.identity().to_virtual(&object.metadata).ok()
        })),
        Err(err) => warn!(kind = K::KIND, %err, "Failed to list physical objects"),
    }

    debug!(kind = K::KIND, pairs = keys.len(), "Resync");
    for vkey in keys {
        spawn_pass(passes, reconciler, vkey);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn a_failed_task_does_not_stop_the_others_from_being_joined() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let handles = vec![
            tokio::spawn(async { panic!("worker crashed") }),
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
            }),
        ];

        let err = join_all(handles, "Task failed").await;

        assert!(err.is_some_and(|err| err.is_panic()));
        assert!(finished.load(Ordering::SeqCst));
    }
}
