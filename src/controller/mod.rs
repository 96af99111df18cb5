//! # Physical Serving Controller
//!
//! A small stand-in for the Knative serving controller that runs against the
//! physical store. For every service it:
//!
//! 1. applies admission defaults to the service spec,
//! 2. creates or updates a configuration under the service's name,
//! 3. stamps out a revision for the current template,
//! 4. reports readiness on the configuration and the service.
//!
//! Deleting a service deletes its configuration and revisions. Once the physical
//! state has converged a further pass writes nothing, so the watch events of its
//! own writes settle down.

mod defaults;

pub use defaults::*;

use crate::model::{
    Condition, Configuration, ConfigurationSpec, ConfigurationStatus, Revision, RevisionStatus,
    Service, ServiceStatus, TrafficTarget, CONFIGURATION_LABEL, SERVICE_LABEL,
};
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vsync_framework::translator::child_name;
use vsync_framework::{Object, ObjectKey, ObjectMeta, StoreClient, SyncError, WatchEvent};

/// Drives services in the physical store to a ready state.
#[derive(Clone)]
pub struct ServingController {
    services: StoreClient<Service>,
    configurations: StoreClient<Configuration>,
    revisions: StoreClient<Revision>,
    domain: String,
}

impl ServingController {
    pub fn new(
        services: StoreClient<Service>,
        configurations: StoreClient<Configuration>,
        revisions: StoreClient<Revision>,
    ) -> Self {
        Self {
            services,
            configurations,
            revisions,
            domain: "example.com".to_string(),
        }
    }

    /// Subscribes to service events, then runs the controller on its own task.
    ///
    /// Services written after this returns are seen as events. Services that
    /// already exist are picked up by the first resync, which runs right away.
    pub fn spawn(self, resync: Duration, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let events = self.services.watch();
        tokio::spawn(self.run(events, resync, shutdown))
    }

    async fn run(
        self,
        mut events: broadcast::Receiver<WatchEvent<Service>>,
        resync: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(resync);
        info!("Serving controller started");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(WatchEvent::Applied(service)) => self.handle(&service.key()).await,
                    Ok(WatchEvent::Deleted(service)) => {
                        if let Err(err) = self.cascade_delete(&service.key()).await {
                            warn!(key = %service.key(), %err, "Cascade delete failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Service events lagged, resyncing");
                        self.resync().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = ticker.tick() => self.resync().await,
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Serving controller stopped");
    }

    async fn handle(&self, key: &ObjectKey) {
        match self.reconcile_service(key).await {
            Ok(()) => {}
            Err(err) if err.is_contention() || err.is_not_found() => {
                debug!(%key, %err, "Service changed underneath, waiting for next event");
            }
            Err(err) => warn!(%key, %err, "Failed to reconcile service"),
        }
    }

    async fn resync(&self) {
        match self.services.list().await {
            Ok(services) => {
                for service in services {
                    self.handle(&service.key()).await;
                }
            }
            Err(err) => warn!(%err, "Failed to list services"),
        }
    }

    /// Brings the configuration, revision and statuses of one service up to date.
    pub async fn reconcile_service(&self, key: &ObjectKey) -> Result<(), SyncError> {
        let Some(mut service) = self.services.get(key.clone()).await? else {
            return Ok(());
        };

        let defaulted = default_service_spec(&service.spec);
        if defaulted != service.spec {
            info!(%key, "Defaulting service spec");
            service.spec = defaulted;
            service = self.services.update(service).await?;
        }

        let configuration = self.ensure_configuration(&service).await?;
        let revision = self.ensure_revision(&configuration).await?;
        let revision_name = revision.metadata.name.clone();
        let ready = revision.status.is_ready();

        let config_status = ConfigurationStatus {
            conditions: vec![Condition::ready(ready)],
            latest_created_revision_name: revision_name.clone(),
            latest_ready_revision_name: if ready { revision_name.clone() } else { String::new() },
        };
        if configuration.status != config_status {
            let mut configuration = configuration;
            configuration.status = config_status.clone();
            self.configurations.update_status(configuration).await?;
        }

        let service_status = ServiceStatus {
            conditions: vec![Condition::ready(ready)],
            url: format!("http://{}.{}.{}", key.name, key.namespace, self.domain),
            latest_created_revision_name: config_status.latest_created_revision_name,
            latest_ready_revision_name: config_status.latest_ready_revision_name.clone(),
            traffic: resolve_traffic(&service.spec.traffic, &config_status.latest_ready_revision_name),
        };
        if service.status != service_status {
            info!(%key, revision = %revision_name, ready, "Updating service status");
            service.status = service_status;
            self.services.update_status(service).await?;
        }
        Ok(())
    }

    async fn ensure_configuration(
        &self,
        service: &Object<Service>,
    ) -> Result<Object<Configuration>, SyncError> {
        let key = service.key();
        let mut metadata = ObjectMeta::new(key.namespace.clone(), key.name.clone());
        metadata.labels = service.metadata.labels.clone();
        metadata
            .labels
            .insert(SERVICE_LABEL.to_string(), key.name.clone());
        metadata.annotations = service.metadata.annotations.clone();
        metadata.owner_references = vec![service.owner_reference()];
        let spec = ConfigurationSpec {
            template: service.spec.template.clone(),
        };

        match self.configurations.get(key.clone()).await? {
            None => {
                info!(%key, "Creating configuration");
                self.configurations
                    .create(Object::new(metadata, spec))
                    .await
            }
            Some(mut existing) => {
                if existing.spec == spec
                    && existing.metadata.labels == metadata.labels
                    && existing.metadata.annotations == metadata.annotations
                    && existing.metadata.owner_references == metadata.owner_references
                {
                    return Ok(existing);
                }
                info!(%key, "Updating configuration");
                existing.metadata.labels = metadata.labels;
                existing.metadata.annotations = metadata.annotations;
                existing.metadata.owner_references = metadata.owner_references;
                existing.spec = spec;
                self.configurations.update(existing).await
            }
        }
    }

    async fn ensure_revision(
        &self,
        configuration: &Object<Configuration>,
    ) -> Result<Object<Revision>, SyncError> {
        let config_name = &configuration.metadata.name;
        let template = &configuration.spec.template;
        let owned: Vec<Object<Revision>> = self
            .revisions
            .list()
            .await?
            .into_iter()
            .filter(|revision| {
                revision.metadata.namespace == configuration.metadata.namespace
                    && revision.metadata.labels.get(CONFIGURATION_LABEL) == Some(config_name)
            })
            .collect();

        let name = if template.name.is_empty() {
            if let Some(current) = owned.iter().rev().find(|revision| revision.spec == template.spec) {
                return Ok(current.clone());
            }
            child_name(config_name, &format!("-{:05}", owned.len() + 1))
        } else {
            if let Some(named) = owned.iter().find(|revision| revision.metadata.name == template.name) {
                if named.spec != template.spec {
                    warn!(revision = %named.key(), "Revision names are immutable, template changed under the same name");
                }
                return Ok(named.clone());
            }
            template.name.clone()
        };

        let mut metadata = ObjectMeta::new(configuration.metadata.namespace.clone(), name);
        metadata.labels = configuration.metadata.labels.clone();
        metadata
            .labels
            .insert(CONFIGURATION_LABEL.to_string(), config_name.clone());
        metadata.annotations = configuration.metadata.annotations.clone();
        metadata.owner_references = vec![configuration.owner_reference()];

        let status = RevisionStatus {
            conditions: vec![Condition::ready(true)],
            image_digest: image_digest(&template.spec.container().image),
        };
        info!(revision = %metadata.key(), "Creating revision");
        self.revisions
            .create(Object::new(metadata, template.spec.clone()).with_status(status))
            .await
    }

    /// Deletes what the serving controller generated for a service.
    pub async fn cascade_delete(&self, key: &ObjectKey) -> Result<(), SyncError> {
        match self.configurations.delete(key.clone()).await {
            Ok(()) => info!(%key, "Deleted configuration"),
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err),
        }

        for revision in self.revisions.list().await? {
            let owned = revision.metadata.namespace == key.namespace
                && revision.metadata.labels.get(SERVICE_LABEL) == Some(&key.name);
            if !owned {
                continue;
            }
            match self.revisions.delete(revision.key()).await {
                Ok(()) => info!(revision = %revision.key(), "Deleted revision"),
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}

/// Pins `latestRevision` targets to the revision that currently serves them.
fn resolve_traffic(spec: &[TrafficTarget], latest_ready: &str) -> Vec<TrafficTarget> {
    spec.iter()
        .map(|target| match target.latest_revision {
            Some(true) => TrafficTarget {
                revision_name: latest_ready.to_string(),
                ..target.clone()
            },
            _ => target.clone(),
        })
        .collect()
}

fn image_digest(image: &str) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(image.as_bytes())))
}
