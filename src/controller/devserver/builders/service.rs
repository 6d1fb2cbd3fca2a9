//! SSH and headless peer-discovery services (spec.md §4.3.3, §6.2).
use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString},
};

use crate::controller::owner;
use crate::resource::DevServer;

pub fn ssh_name(devserver: &str) -> String {
    format!("{devserver}-ssh")
}

pub fn peers_name(devserver: &str) -> String {
    format!("{devserver}-peers")
}

pub fn build_ssh(ds: &DevServer, ds_name: &str, namespace: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(ssh_name(ds_name)),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner::owner_reference(ds)]),
            labels: Some(owner::common_labels("devserver", ds_name)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_owned()),
            selector: Some(owner::devserver_selector(ds_name)),
            ports: Some(vec![ServicePort {
                name: Some("ssh".to_owned()),
                port: 22,
                target_port: Some(IntOrString::Int(22)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Headless service for distributed-mode peer discovery: no cluster IP, so
/// DNS resolves `<peers_name>-<ordinal>.<peers_name>` to individual pods.
pub fn build_peers(ds: &DevServer, ds_name: &str, namespace: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(peers_name(ds_name)),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner::owner_reference(ds)]),
            labels: Some(owner::common_labels("devserver", ds_name)),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            cluster_ip: Some("None".to_owned()),
            selector: Some(owner::devserver_selector(ds_name)),
            ports: Some(vec![ServicePort {
                name: Some("ssh".to_owned()),
                port: 22,
                target_port: Some(IntOrString::Int(22)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DevServer {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "devserver.io/v1",
            "kind": "DevServer",
            "metadata": {"name": "demo", "namespace": "dev-alice", "uid": "11111111-1111-1111-1111-111111111111"},
            "spec": {"owner": "alice@x", "flavor": "cpu-small"},
        }))
        .unwrap()
    }

    #[test]
    fn ssh_service_is_cluster_ip() {
        let svc = build_ssh(&sample(), "demo", "dev-alice");
        assert_eq!(svc.spec.unwrap().type_.as_deref(), Some("ClusterIP"));
    }

    #[test]
    fn peers_service_is_headless() {
        let svc = build_peers(&sample(), "demo", "dev-alice");
        assert_eq!(svc.spec.unwrap().cluster_ip.as_deref(), Some("None"));
    }

    #[test]
    fn builders_are_deterministic() {
        let ds = sample();
        assert_eq!(
            serde_json::to_value(build_ssh(&ds, "demo", "dev-alice")).unwrap(),
            serde_json::to_value(build_ssh(&ds, "demo", "dev-alice")).unwrap()
        );
    }
}
