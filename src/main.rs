use knative_vsync::lifecycle::{SyncConfig, SyncSystem};
use knative_vsync::model::{RevisionSpec, RevisionTemplate, Service, ServiceSpec};
use std::time::Duration;
use tracing::{info, Instrument};
use vsync_framework::tracing::setup_tracing;
use vsync_framework::{Object, ObjectKey, ObjectMeta};

const CONFIG_ENV: &str = "VSYNC_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    setup_tracing();

    let config = match std::env::var(CONFIG_ENV) {
        Ok(path) => SyncConfig::from_file(path)?,
        Err(_) => {
            let mut config = SyncConfig::default();
            config.apply_env_overrides(|key| std::env::var(key).ok());
            config.validate()?;
            config
        }
    };
    info!(?config, "Starting application");

    let system = SyncSystem::start(config).await?;
    let key = ObjectKey::new("default", "hello");

    let span = tracing::info_span!("create_service");
    async {
        info!("Creating virtual service");
        let service = Object::<Service>::new(
            ObjectMeta::new("default", "hello").with_label("app", "hello"),
            ServiceSpec {
                template: RevisionTemplate {
                    name: String::new(),
                    spec: RevisionSpec::with_image("ghcr.io/knative/helloworld-go:v1"),
                },
                traffic: Vec::new(),
            },
        );
        system.virtual_services.create(service).await
    }
    .instrument(span)
    .await?;

    tokio::time::sleep(Duration::from_millis(500)).await;
    print_state(&system, &key).await?;

    let span = tracing::info_span!("update_image");
    async {
        info!("Rolling out a new image");
        let Some(mut service) = system.virtual_services.get(key.clone()).await? else {
            return Ok(());
        };
        service.spec.template.spec.container_mut().image =
            "ghcr.io/knative/helloworld-go:v2".to_string();
        system.virtual_services.update(service).await.map(|_| ())
    }
    .instrument(span)
    .await?;

    tokio::time::sleep(Duration::from_millis(500)).await;
    print_state(&system, &key).await?;

    info!("Deleting virtual service");
    system.virtual_services.delete(key.clone()).await?;
    tokio::time::sleep(Duration::from_millis(500)).await;
    info!(
        physical_services = system.physical_services.list().await?.len(),
        "Service deleted"
    );

    system.shutdown().await?;
    Ok(())
}

async fn print_state(
    system: &SyncSystem,
    key: &ObjectKey,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(service) = system.virtual_services.get(key.clone()).await? {
        println!("{}", serde_json::to_string_pretty(&service)?);
    }
    for revision in system.virtual_revisions.list().await? {
        info!(
            revision = %revision.key(),
            ready = revision.status.is_ready(),
            "Virtual revision"
        );
    }
    Ok(())
}
