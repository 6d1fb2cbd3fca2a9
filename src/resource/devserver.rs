// From `CustomResource`
#![allow(clippy::default_trait_access)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::schemas;

#[derive(CustomResource, Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "devserver.io",
    version = "v1",
    kind = "DevServer",
    plural = "devservers",
    shortname = "ds",
    namespaced,
    status = "DevServerStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DevServerSpec {
    /// Opaque identifier of the human who owns this environment, e.g. an email address.
    pub owner: String,
    /// Name of the `DevServerFlavor` to resolve resource requests/limits from.
    pub flavor: String,
    #[serde(default = "default_image")]
    pub image: String,
    #[serde(default)]
    pub mode: DevServerMode,
    /// Present only when `mode = distributed`.
    pub distributed: Option<DistributedSpec>,
    #[serde(default = "default_persistent_home_size")]
    pub persistent_home_size: Quantity,
    /// Name of a pre-existing `ReadWriteMany` claim to mount at `/shared`.
    pub shared_volume_claim_name: Option<String>,
    #[serde(default = "default_true")]
    pub enable_ssh: bool,
    pub ssh: Option<SshSpec>,
    #[serde(default)]
    pub lifecycle: Option<LifecycleSpec>,
}

fn default_image() -> String {
    "ubuntu:22.04".to_owned()
}

fn default_persistent_home_size() -> Quantity {
    Quantity("100Gi".to_owned())
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, Copy, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum DevServerMode {
    #[default]
    Standalone,
    Distributed,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DistributedSpec {
    pub world_size: u32,
    #[serde(default = "default_nprocs_per_node")]
    pub nprocs_per_node: u32,
    #[serde(default)]
    pub backend: DistributedBackend,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nccl_settings: BTreeMap<String, String>,
}

fn default_nprocs_per_node() -> u32 {
    1
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, Copy, Default, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DistributedBackend {
    #[default]
    Nccl,
    Gloo,
    Mpi,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SshSpec {
    pub public_key: String,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleSpec {
    pub idle_timeout: Option<i64>,
    pub auto_shutdown: Option<bool>,
    #[schemars(schema_with = "schemas::date_time")]
    pub expiration_time: Option<DateTime<Utc>>,
    /// Human-readable duration such as `"30m"`, `"2h30m"`, `"1d"`. Materialized into
    /// `expirationTime` by the reconciler the first time it is observed (see
    /// [`crate::controller::devserver::duration`]).
    pub time_to_live: Option<String>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevServerStatus {
    #[serde(default)]
    pub phase: DevServerPhase,
    #[serde(default)]
    pub ready: bool,
    pub ssh_endpoint: Option<String>,
    #[schemars(schema_with = "schemas::date_time")]
    pub start_time: Option<DateTime<Utc>>,
    #[schemars(schema_with = "schemas::date_time")]
    pub last_idle_time: Option<DateTime<Utc>>,
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pod_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "schemas::conditions")]
    pub conditions: Vec<Condition>,
    #[schemars(schema_with = "schemas::observed_generation")]
    pub observed_generation: Option<i64>,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Eq, Clone, Copy, Default, JsonSchema)]
pub enum DevServerPhase {
    #[default]
    Pending,
    Running,
    Terminating,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let spec: DevServerSpec = serde_json::from_value(serde_json::json!({
            "owner": "alice@example.com",
            "flavor": "cpu-small",
        }))
        .unwrap();
        assert_eq!(spec.image, "ubuntu:22.04");
        assert_eq!(spec.mode, DevServerMode::Standalone);
        assert_eq!(spec.persistent_home_size, Quantity("100Gi".to_owned()));
        assert!(spec.enable_ssh);
        assert!(spec.distributed.is_none());
    }
}
