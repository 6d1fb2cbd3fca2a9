//! Home-directory volume claim (spec.md §4.3.1). Created once; never
//! re-patched after that (storage size is not a patchable field on a PVC).
use k8s_openapi::{
    api::core::v1::{PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements},
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
};

use crate::controller::owner;
use crate::resource::DevServer;

pub fn name(devserver: &str) -> String {
    format!("{devserver}-home")
}

pub fn build(ds: &DevServer, ds_name: &str, namespace: &str) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name(ds_name)),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner::owner_reference(ds)]),
            labels: Some(owner::common_labels("devserver", ds_name)),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(
                    [("storage".to_owned(), ds.spec.persistent_home_size.clone())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Template used as `volumeClaimTemplates[0]` for distributed mode, where
/// each replica gets its own home volume claim (spec.md §4.3.2).
pub fn template(size: &Quantity) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some("home".to_owned()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_owned()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some([("storage".to_owned(), size.clone())].into_iter().collect()),
                ..Default::default()
            }),
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
    fn is_deterministic() {
        let ds = sample();
        let a = build(&ds, "demo", "dev-alice");
        let b = build(&ds, "demo", "dev-alice");
        assert_eq!(serde_json::to_value(&a).unwrap(), serde_json::to_value(&b).unwrap());
    }

    #[test]
    fn requests_spec_storage_size() {
        let ds = sample();
        let pvc = build(&ds, "demo", "dev-alice");
        let req = pvc.spec.unwrap().resources.unwrap().requests.unwrap();
        assert_eq!(req.get("storage"), Some(&Quantity("100Gi".to_owned())));
    }
}
