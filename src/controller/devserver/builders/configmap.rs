//! Peer-discovery config map for distributed mode (spec.md §4.2 step 6,
//! §6.2). Holds hints peers can read instead of re-deriving them, even
//! though `MASTER_ADDR`/`WORLD_SIZE` are already injected as environment
//! variables.
use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::ConfigMap, apimachinery::pkg::apis::meta::v1::ObjectMeta};

use crate::controller::owner;
use crate::resource::{DevServer, DistributedSpec};

pub fn name(devserver: &str) -> String {
    format!("{devserver}-config")
}

pub fn build(ds: &DevServer, ds_name: &str, namespace: &str, dist: &DistributedSpec, peers_service_name: &str) -> ConfigMap {
    let mut data = BTreeMap::new();
    data.insert("world_size".to_owned(), dist.world_size.to_string());
    data.insert("nprocs_per_node".to_owned(), dist.nprocs_per_node.to_string());
    data.insert("backend".to_owned(), format!("{:?}", dist.backend).to_lowercase());
    data.insert("master_addr".to_owned(), format!("{ds_name}-0.{peers_service_name}"));
    data.insert("master_port".to_owned(), "29500".to_owned());

    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name(ds_name)),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner::owner_reference(ds)]),
            labels: Some(owner::common_labels("devserver", ds_name)),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}
