//! Workload controller builder (spec.md §4.3.2): a single-replica
//! Deployment for standalone mode, or a replicated, ordered `StatefulSet`
//! with a per-replica home claim template for distributed mode.
use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec},
        core::v1::{
            Container, ContainerPort, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec,
            PodTemplateSpec, ResourceRequirements, Volume, VolumeMount,
        },
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::LabelSelector, apis::meta::v1::ObjectMeta},
};

use crate::controller::owner;
use crate::resource::{DevServer, DevServerFlavor, DistributedBackend};

use super::{hostkeys, volumeclaim};

const CONTAINER_NAME: &str = "devserver";
const HOME_MOUNT: &str = "/home/dev";
const SHARED_MOUNT: &str = "/shared";
const MASTER_PORT: i32 = 29500;

pub fn deployment_name(devserver: &str) -> String {
    devserver.to_owned()
}

pub fn build_deployment(ds: &DevServer, ds_name: &str, namespace: &str, flavor: &DevServerFlavor) -> Deployment {
    let labels = owner::common_labels("devserver", ds_name);
    let selector = owner::devserver_selector(ds_name);
    Deployment {
        metadata: ObjectMeta {
            name: Some(deployment_name(ds_name)),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner::owner_reference(ds)]),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: pod_template(ds, ds_name, &selector, &labels, flavor, None),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn build_stateful_set(
    ds: &DevServer,
    ds_name: &str,
    namespace: &str,
    flavor: &DevServerFlavor,
    world_size: u32,
    peers_service_name: &str,
) -> StatefulSet {
    let labels = owner::common_labels("devserver", ds_name);
    let selector = owner::devserver_selector(ds_name);
    StatefulSet {
        metadata: ObjectMeta {
            name: Some(deployment_name(ds_name)),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner::owner_reference(ds)]),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(StatefulSetSpec {
            replicas: Some(world_size as i32),
            service_name: Some(peers_service_name.to_owned()),
            selector: LabelSelector {
                match_labels: Some(selector.clone()),
                ..Default::default()
            },
            template: pod_template(ds, ds_name, &selector, &labels, flavor, Some(peers_service_name)),
            volume_claim_templates: Some(vec![volumeclaim::template(&ds.spec.persistent_home_size)]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_template(
    ds: &DevServer,
    ds_name: &str,
    selector: &BTreeMap<String, String>,
    labels: &BTreeMap<String, String>,
    flavor: &DevServerFlavor,
    peers_service_name: Option<&str>,
) -> PodTemplateSpec {
    let mut env = vec![
        EnvVar {
            name: "DEVSERVER_OWNER".to_owned(),
            value: Some(ds.spec.owner.clone()),
            ..Default::default()
        },
        EnvVar {
            name: "DEVSERVER_MODE".to_owned(),
            value: Some(if peers_service_name.is_some() { "distributed".to_owned() } else { "standalone".to_owned() }),
            ..Default::default()
        },
    ];

    if let (Some(dist), Some(svc)) = (ds.spec.distributed.as_ref(), peers_service_name) {
        env.push(env_var("WORLD_SIZE", &dist.world_size.to_string()));
        env.push(env_var("MASTER_ADDR", &format!("{ds_name}-0.{svc}")));
        env.push(env_var("MASTER_PORT", &MASTER_PORT.to_string()));
        // RANK is derived from the pod's ordinal suffix, not known at build
        // time; sourced via the downward API field ref instead of a literal.
        env.push(EnvVar {
            name: "RANK".to_owned(),
            value_from: Some(k8s_openapi::api::core::v1::EnvVarSource {
                field_ref: Some(k8s_openapi::api::core::v1::ObjectFieldSelector {
                    field_path: "metadata.name".to_owned(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        });
        if matches!(dist.backend, DistributedBackend::Nccl) {
            for (k, v) in &dist.nccl_settings {
                env.push(env_var(k, v));
            }
        }
    }

    let mut volume_mounts = vec![VolumeMount {
        name: "home".to_owned(),
        mount_path: HOME_MOUNT.to_owned(),
        ..Default::default()
    }];
    let mut volumes = Vec::new();
    if peers_service_name.is_none() {
        // Standalone: the home claim already exists (built separately);
        // distributed mode gets "home" from `volumeClaimTemplates` instead.
        volumes.push(Volume {
            name: "home".to_owned(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: volumeclaim::name(ds_name),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    if let Some(claim) = &ds.spec.shared_volume_claim_name {
        volume_mounts.push(VolumeMount {
            name: "shared".to_owned(),
            mount_path: SHARED_MOUNT.to_owned(),
            ..Default::default()
        });
        volumes.push(Volume {
            name: "shared".to_owned(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: claim.clone(),
                read_only: Some(false),
            }),
            ..Default::default()
        });
    }

    if ds.spec.enable_ssh {
        volume_mounts.push(VolumeMount {
            name: "hostkeys".to_owned(),
            mount_path: "/etc/ssh/devserver-hostkeys".to_owned(),
            read_only: Some(true),
            ..Default::default()
        });
        volumes.push(Volume {
            name: "hostkeys".to_owned(),
            secret: Some(k8s_openapi::api::core::v1::SecretVolumeSource {
                secret_name: Some(hostkeys::name(ds_name)),
                ..Default::default()
            }),
            ..Default::default()
        });
    }

    PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.iter().chain(selector).map(|(k, v)| (k.clone(), v.clone())).collect()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            containers: vec![Container {
                name: CONTAINER_NAME.to_owned(),
                image: Some(ds.spec.image.clone()),
                command: Some(vec!["sleep".to_owned(), "infinity".to_owned()]),
                env: Some(env),
                ports: if ds.spec.enable_ssh {
                    Some(vec![ContainerPort { container_port: 22, name: Some("ssh".to_owned()), ..Default::default() }])
                } else {
                    None
                },
                resources: Some(resource_requirements(flavor)),
                volume_mounts: Some(volume_mounts),
                ..Default::default()
            }],
            node_selector: if flavor.spec.node_selector.is_empty() { None } else { Some(flavor.spec.node_selector.clone()) },
            tolerations: to_k8s_tolerations(flavor),
            restart_policy: Some("Always".to_owned()),
            enable_service_links: Some(false),
            volumes: if volumes.is_empty() { None } else { Some(volumes) },
            ..Default::default()
        }),
    }
}

fn env_var(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value: Some(value.to_owned()),
        ..Default::default()
    }
}

fn resource_requirements(flavor: &DevServerFlavor) -> ResourceRequirements {
    ResourceRequirements {
        requests: opt_map(&flavor.spec.resources.requests),
        limits: opt_map(&flavor.spec.resources.limits),
        ..Default::default()
    }
}

fn opt_map(m: &BTreeMap<String, Quantity>) -> Option<BTreeMap<String, Quantity>> {
    if m.is_empty() {
        None
    } else {
        Some(m.clone())
    }
}

fn to_k8s_tolerations(flavor: &DevServerFlavor) -> Option<Vec<k8s_openapi::api::core::v1::Toleration>> {
    if flavor.spec.tolerations.is_empty() {
        return None;
    }
    Some(
        flavor
            .spec
            .tolerations
            .iter()
            .map(|t| k8s_openapi::api::core::v1::Toleration {
                key: Some(t.key.clone()),
                operator: Some(t.operator.clone()),
                value: t.value.clone(),
                effect: Some(t.effect.clone()),
                toleration_seconds: None,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;

    fn sample_ds(distributed: bool) -> DevServer {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "devserver.io/v1",
            "kind": "DevServer",
            "metadata": {"name": "demo", "namespace": "dev-alice", "uid": "11111111-1111-1111-1111-111111111111"},
            "spec": {
                "owner": "alice@x",
                "flavor": "cpu-small",
                "mode": if distributed { "distributed" } else { "standalone" },
                "distributed": distributed.then(|| serde_json::json!({"worldSize": 2, "nprocsPerNode": 1, "backend": "gloo"})),
            },
        }))
        .unwrap()
    }

    fn sample_flavor() -> DevServerFlavor {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "devserver.io/v1",
            "kind": "DevServerFlavor",
            "metadata": {"name": "cpu-small"},
            "spec": {},
        }))
        .unwrap()
    }

    /// `MASTER_ADDR` must resolve to `<statefulset-name>-0.<peers-service>`,
    /// matching `StatefulSet` pod DNS, not the peers service's own name.
    #[test]
    fn master_addr_uses_statefulset_name_not_peers_service_name() {
        let ds = sample_ds(true);
        let sts = build_stateful_set(&ds, "demo", "dev-alice", &sample_flavor(), 2, "demo-peers");
        let env = sts.spec.unwrap().template.spec.unwrap().containers[0].env.clone().unwrap();
        let master_addr = env.iter().find(|e| e.name == "MASTER_ADDR").unwrap();
        assert_json_include!(
            actual: serde_json::to_value(master_addr).unwrap(),
            expected: serde_json::json!({"name": "MASTER_ADDR", "value": "demo-0.demo-peers"}),
        );
    }

    #[test]
    fn deployment_has_no_distributed_env() {
        let ds = sample_ds(false);
        let deploy = build_deployment(&ds, "demo", "dev-alice", &sample_flavor());
        let env = deploy.spec.unwrap().template.spec.unwrap().containers[0].env.clone().unwrap();
        assert!(!env.iter().any(|e| e.name == "MASTER_ADDR"));
    }
}
