#![allow(clippy::default_trait_access)]

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::condition::Condition;
use super::schemas;

/// Binds a human identity to a cluster namespace and permissions
/// (spec.md §3.3).
#[derive(CustomResource, Deserialize, Serialize, Debug, PartialEq, Clone, JsonSchema)]
#[kube(
    group = "devserver.io",
    version = "v1",
    kind = "DevServerUser",
    plural = "devserverusers",
    shortname = "dsu",
    status = "DevServerUserStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct DevServerUserSpec {
    /// DNS-label-compatible username; the namespace is `dev-<username>`.
    pub username: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub quota_overrides: BTreeMap<String, Quantity>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DevServerUserStatus {
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[schemars(schema_with = "schemas::conditions")]
    pub conditions: Vec<Condition>,
    #[schemars(schema_with = "schemas::observed_generation")]
    pub observed_generation: Option<i64>,
}
