//! Controller-owner reference and common-label helpers shared by the
//! `DevServer`, `DevServerFlavor` and `DevServerUser` reconcilers (spec.md I5,
//! §4.4, §6.2).
use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;

pub const MANAGED_BY: &str = "devserver-operator";

/// Build the controller-owner reference every child of `root` must carry
/// (spec.md I5, P2). Panics if `root` has no UID, which only happens for
/// objects that have never round-tripped through the API server.
pub fn owner_reference<K>(root: &K) -> OwnerReference
where
    K: Resource<DynamicType = ()>,
{
    root.controller_owner_ref(&())
        .expect("root object must have a UID")
}

/// Labels every owned object carries so it can be rediscovered by selector
/// without following the reverse owner-reference edge (spec.md §9,
/// "Avoiding cyclic ownership").
pub fn common_labels(app: &str, name: &str) -> BTreeMap<String, String> {
    [
        ("app.kubernetes.io/name", app),
        ("app.kubernetes.io/instance", name),
        ("app.kubernetes.io/managed-by", MANAGED_BY),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect()
}

/// Selector labels for a `DevServer`'s workload and services (spec.md §4.3.2:
/// `{app=devserver, devserver=<name>}`).
pub fn devserver_selector(name: &str) -> BTreeMap<String, String> {
    [("app", "devserver"), ("devserver", name)]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}
