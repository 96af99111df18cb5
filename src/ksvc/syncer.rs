use crate::model::{Service, ServiceSpec, ServiceStatus, TrafficTarget};
use crate::naming::{physical_revision_name, virtual_revision_name};
use async_trait::async_trait;
use vsync_framework::{FieldMergePolicy, IdentityTranslator, ObjectKey, Origin, SyncedKind};

#[async_trait]
impl SyncedKind for Service {
    const ORIGIN: Origin = Origin::Virtual;
    type Context = ();

    fn policy() -> FieldMergePolicy<Self> {
        FieldMergePolicy::<Self>::builder()
            .down(
                "spec.template.name",
                |o| o.spec.template.name.clone(),
                |o, v| o.spec.template.name = v,
            )
            .down(
                "spec.template.spec.containers[0].image",
                |o| o.spec.template.spec.container().image,
                |o, v| o.spec.template.spec.container_mut().image = v,
            )
            .bidirectional(
                "spec.template.spec.containers[0].name",
                |o| o.spec.template.spec.container().name,
                |o, v| o.spec.template.spec.container_mut().name = v,
            )
            .bidirectional(
                "spec.template.spec.containerConcurrency",
                |o| o.spec.template.spec.container_concurrency,
                |o, v| o.spec.template.spec.container_concurrency = v,
            )
            .bidirectional(
                "spec.template.spec.timeoutSeconds",
                |o| o.spec.template.spec.timeout_seconds,
                |o, v| o.spec.template.spec.timeout_seconds = v,
            )
            .bidirectional(
                "spec.template.spec.responseStartTimeoutSeconds",
                |o| o.spec.template.spec.response_start_timeout_seconds,
                |o, v| o.spec.template.spec.response_start_timeout_seconds = v,
            )
            .bidirectional(
                "spec.template.spec.idleTimeoutSeconds",
                |o| o.spec.template.spec.idle_timeout_seconds,
                |o, v| o.spec.template.spec.idle_timeout_seconds = v,
            )
            .bidirectional(
                "spec.template.spec.enableServiceLinks",
                |o| o.spec.template.spec.enable_service_links,
                |o, v| o.spec.template.spec.enable_service_links = v,
            )
            .bidirectional(
                "spec.traffic",
                |o| o.spec.traffic.clone(),
                |o, v| o.spec.traffic = v,
            )
            .status("status", |o| o.status.clone(), |o, v| o.status = v)
            .build()
    }

    fn translate_spec(spec: &ServiceSpec, vkey: &ObjectKey, translator: &IdentityTranslator) -> ServiceSpec {
        let mut spec = spec.clone();
        spec.template.name = physical_revision_name(&spec.template.name, vkey, translator);
        rename_traffic(&mut spec.traffic, |name| {
            physical_revision_name(name, vkey, translator)
        });
        spec
    }

    fn reverse_spec(spec: &ServiceSpec, vkey: &ObjectKey, translator: &IdentityTranslator) -> ServiceSpec {
        let mut spec = spec.clone();
        spec.template.name = virtual_revision_name(&spec.template.name, vkey, translator);
        rename_traffic(&mut spec.traffic, |name| {
            virtual_revision_name(name, vkey, translator)
        });
        spec
    }

    fn reverse_status(
        status: &ServiceStatus,
        vkey: &ObjectKey,
        translator: &IdentityTranslator,
    ) -> ServiceStatus {
        let mut status = status.clone();
        status.latest_created_revision_name =
            virtual_revision_name(&status.latest_created_revision_name, vkey, translator);
        status.latest_ready_revision_name =
            virtual_revision_name(&status.latest_ready_revision_name, vkey, translator);
        rename_traffic(&mut status.traffic, |name| {
            virtual_revision_name(name, vkey, translator)
        });
        status
    }
}

fn rename_traffic(traffic: &mut [TrafficTarget], rename: impl Fn(&str) -> String) {
    for target in traffic {
        target.revision_name = rename(&target.revision_name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RevisionSpec, RevisionTemplate};
    use vsync_framework::{Object, ObjectMeta};

    fn translator() -> IdentityTranslator {
        IdentityTranslator::new("vsync", "vsync-host")
    }

    fn service(spec: ServiceSpec) -> Object<Service> {
        Object::new(ObjectMeta::new("default", "hello"), spec)
    }

    fn pinned_spec() -> ServiceSpec {
        ServiceSpec {
            template: RevisionTemplate {
                name: "hello-v1".into(),
                spec: RevisionSpec::with_image("ghcr.io/acme/hello:v1"),
            },
            traffic: vec![TrafficTarget {
                revision_name: "hello-v1".into(),
                percent: Some(100),
                ..Default::default()
            }],
        }
    }

    #[test]
    fn embedded_revision_names_are_translated_both_ways() {
        let t = translator();
        let vkey = ObjectKey::new("default", "hello");

        let physical = Service::translate_spec(&pinned_spec(), &vkey, &t);
        assert_eq!(physical.template.name, "hello-x-default-x-vsync-v1");
        assert_eq!(physical.traffic[0].revision_name, "hello-x-default-x-vsync-v1");
        assert_eq!(Service::reverse_spec(&physical, &vkey, &t), pinned_spec());
    }

    #[test]
    fn status_revision_names_come_back_virtual() {
        let t = translator();
        let vkey = ObjectKey::new("default", "hello");
        let physical = ServiceStatus {
            latest_ready_revision_name: "hello-x-default-x-vsync-00002".into(),
            traffic: vec![TrafficTarget {
                revision_name: "hello-x-default-x-vsync-00002".into(),
                latest_revision: Some(true),
                percent: Some(100),
                ..Default::default()
            }],
            ..Default::default()
        };

        let status = Service::reverse_status(&physical, &vkey, &t);
        assert_eq!(status.latest_ready_revision_name, "hello-00002");
        assert_eq!(status.traffic[0].revision_name, "hello-00002");
    }

    #[test]
    fn image_goes_down_and_defaults_come_up() {
        let policy = Service::policy();
        let virtual_obj = service(ServiceSpec {
            template: RevisionTemplate {
                name: String::new(),
                spec: RevisionSpec::with_image("ghcr.io/acme/hello:v2"),
            },
            traffic: Vec::new(),
        });
        let mut defaulted = RevisionSpec::with_image("ghcr.io/acme/hello:v1");
        defaulted.container_mut().name = "user-container".into();
        defaulted.timeout_seconds = Some(300);
        let physical = service(ServiceSpec {
            template: RevisionTemplate {
                name: String::new(),
                spec: defaulted,
            },
            traffic: vec![TrafficTarget::latest(100)],
        });

        let plan = policy.diff(&virtual_obj, &physical);
        let down = plan.physical.unwrap();
        assert_eq!(down.fields, vec!["spec.template.spec.containers[0].image"]);
        assert_eq!(down.object.spec.template.spec.container().image, "ghcr.io/acme/hello:v2");

        let up = plan.virtual_spec.unwrap();
        assert_eq!(
            up.fields,
            vec![
                "spec.template.spec.containers[0].name",
                "spec.template.spec.timeoutSeconds",
                "spec.traffic",
            ]
        );
        assert_eq!(up.object.spec.template.spec.container().image, "ghcr.io/acme/hello:v2");
        assert_eq!(up.object.spec.template.spec.timeout_seconds, Some(300));
        assert_eq!(up.object.spec.traffic, vec![TrafficTarget::latest(100)]);
    }

    #[test]
    fn user_settings_win_over_physical_values() {
        let policy = Service::policy();
        let mut user_spec = RevisionSpec::with_image("img");
        user_spec.container_concurrency = Some(10);
        let virtual_obj = service(ServiceSpec {
            template: RevisionTemplate {
                name: String::new(),
                spec: user_spec,
            },
            traffic: vec![TrafficTarget::latest(100)],
        });
        let mut physical_spec = RevisionSpec::with_image("img");
        physical_spec.container_concurrency = Some(0);
        let physical = service(ServiceSpec {
            template: RevisionTemplate {
                name: String::new(),
                spec: physical_spec,
            },
            traffic: vec![TrafficTarget {
                revision_name: "hello-00001".into(),
                percent: Some(100),
                ..Default::default()
            }],
        });

        let plan = policy.diff(&virtual_obj, &physical);
        assert!(plan.virtual_spec.is_none());
        let down = plan.physical.unwrap();
        assert_eq!(down.object.spec.template.spec.container_concurrency, Some(10));
        assert_eq!(down.object.spec.traffic, vec![TrafficTarget::latest(100)]);
    }
}
