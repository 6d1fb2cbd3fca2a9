#![allow(clippy::default_trait_access)]

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::schemas;

/// Cluster-scoped template of resource requests/limits, node selectors and
/// tolerations. Read-only from the engine's perspective; its lifecycle is
/// managed externally (spec.md §3.2).
#[derive(CustomResource, Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "devserver.io",
    version = "v1",
    kind = "DevServerFlavor",
    plural = "devserverflavors",
    shortname = "dsf",
    status = "DevServerFlavorStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DevServerFlavorSpec {
    #[serde(default)]
    pub resources: FlavorResources,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FlavorResources {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,
}

#[derive(Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    pub key: String,
    pub operator: String,
    #[serde(default)]
    pub value: Option<String>,
    pub effect: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevServerFlavorStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "schemas::conditions")]
    pub conditions: Vec<Condition>,
    #[schemars(schema_with = "schemas::observed_generation")]
    pub observed_generation: Option<i64>,
}
