//! Pure builders for the five children of a `DevServerUser` (spec.md §4.4).
use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        core::v1::{Namespace, ResourceQuota, ResourceQuotaSpec, ServiceAccount},
        rbac::v1::{PolicyRule, Role, RoleBinding, RoleRef, Subject},
    },
    apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
};

use crate::controller::owner;
use crate::resource::DevServerUser;

pub const ROLE_NAME: &str = "dev-user";

pub fn namespace_name(username: &str) -> String {
    format!("dev-{username}")
}

pub fn service_account_name(username: &str) -> String {
    format!("{username}-sa")
}

fn labels(user_name: &str) -> BTreeMap<String, String> {
    owner::common_labels("devserver-user", user_name)
}

pub fn build_namespace(user: &DevServerUser) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(namespace_name(&user.spec.username)),
            owner_references: Some(vec![owner::owner_reference(user)]),
            labels: Some(labels(&user.spec.username)),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn build_service_account(user: &DevServerUser, namespace: &str) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(service_account_name(&user.spec.username)),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner::owner_reference(user)]),
            labels: Some(labels(&user.spec.username)),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn build_role(user: &DevServerUser, namespace: &str) -> Role {
    Role {
        metadata: ObjectMeta {
            name: Some(ROLE_NAME.to_owned()),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner::owner_reference(user)]),
            labels: Some(labels(&user.spec.username)),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                api_groups: Some(vec!["devserver.io".to_owned()]),
                resources: Some(vec!["devservers".to_owned()]),
                verbs: verbs(),
                ..Default::default()
            },
            PolicyRule {
                api_groups: Some(vec![String::new()]),
                resources: Some(vec![
                    "pods".to_owned(),
                    "services".to_owned(),
                    "persistentvolumeclaims".to_owned(),
                    "configmaps".to_owned(),
                    "secrets".to_owned(),
                ]),
                verbs: verbs(),
                ..Default::default()
            },
        ]),
    }
}

fn verbs() -> Vec<String> {
    ["get", "list", "watch", "create", "update", "patch", "delete"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

pub fn build_role_binding(user: &DevServerUser, namespace: &str) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(ROLE_NAME.to_owned()),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner::owner_reference(user)]),
            labels: Some(labels(&user.spec.username)),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_owned(),
            kind: "Role".to_owned(),
            name: ROLE_NAME.to_owned(),
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_owned(),
            name: service_account_name(&user.spec.username),
            namespace: Some(namespace.to_owned()),
            ..Default::default()
        }]),
    }
}

const DEFAULT_QUOTA: &[(&str, &str)] = &[
    ("requests.cpu", "4"),
    ("requests.memory", "16Gi"),
    ("persistentvolumeclaims", "10"),
];

pub fn build_resource_quota(user: &DevServerUser, namespace: &str) -> ResourceQuota {
    let mut hard: BTreeMap<String, Quantity> =
        DEFAULT_QUOTA.iter().map(|(k, v)| ((*k).to_owned(), Quantity((*v).to_owned()))).collect();
    hard.extend(user.spec.quota_overrides.clone());

    ResourceQuota {
        metadata: ObjectMeta {
            name: Some("dev-user-quota".to_owned()),
            namespace: Some(namespace.to_owned()),
            owner_references: Some(vec![owner::owner_reference(user)]),
            labels: Some(labels(&user.spec.username)),
            ..Default::default()
        },
        spec: Some(ResourceQuotaSpec { hard: Some(hard), ..Default::default() }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DevServerUser {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "devserver.io/v1",
            "kind": "DevServerUser",
            "metadata": {"name": "alice", "uid": "11111111-1111-1111-1111-111111111111"},
            "spec": {"username": "alice"},
        }))
        .unwrap()
    }

    #[test]
    fn namespace_and_sa_names_follow_convention() {
        assert_eq!(namespace_name("alice"), "dev-alice");
        assert_eq!(service_account_name("alice"), "alice-sa");
    }

    #[test]
    fn quota_overrides_win_over_defaults() {
        let mut user = sample();
        user.spec.quota_overrides.insert("requests.cpu".to_owned(), Quantity("8".to_owned()));
        let quota = build_resource_quota(&user, "dev-alice");
        let hard = quota.spec.unwrap().hard.unwrap();
        assert_eq!(hard.get("requests.cpu"), Some(&Quantity("8".to_owned())));
        assert_eq!(hard.get("requests.memory"), Some(&Quantity("16Gi".to_owned())));
    }

    #[test]
    fn role_grants_full_verb_set_on_devserver_and_children() {
        let role = build_role(&sample(), "dev-alice");
        let rules = role.rules.unwrap();
        assert_eq!(rules[0].resources.as_ref().unwrap(), &["devservers"]);
        assert_eq!(rules[0].verbs.len(), 7);
    }
}
