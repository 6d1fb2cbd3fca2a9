//! `DevServerUser` reconciler (spec.md §4.4): provisions a namespace, service
//! account, role, role-binding and resource quota for a human identity, all
//! controller-owned by the `DevServerUser` so deleting it cascades.
mod builders;

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::{
    core::v1::{Namespace, ResourceQuota, ServiceAccount},
    rbac::v1::{Role, RoleBinding},
};
use kube::{
    api::{Api, Patch, PatchParams},
    runtime::{controller::Action, watcher, Controller},
    Client, ResourceExt,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::controller::create_ignore_conflict;
use crate::controller::error::{Error, Result};
use crate::resource::{Condition, ConditionStatus, DevServerUser};

const FIELD_MANAGER: &str = "devserver-operator-user";

pub struct Ctx {
    pub client: Client,
}

pub async fn run(client: Client, config: Config) {
    let ctx = Arc::new(Ctx { client: client.clone() });
    let watcher_config = watcher::Config::default().timeout(crate::controller::resync_timeout_secs(&config));
    Controller::new(Api::<DevServerUser>::all(client.clone()), watcher_config.clone())
        .owns(Api::<Namespace>::all(client.clone()), watcher_config.clone())
        .owns(Api::<ServiceAccount>::all(client.clone()), watcher_config.clone())
        .owns(Api::<Role>::all(client.clone()), watcher_config.clone())
        .owns(Api::<RoleBinding>::all(client.clone()), watcher_config.clone())
        .owns(Api::<ResourceQuota>::all(client), watcher_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { x.ok() })
        .for_each(|_| async {})
        .await;
}

#[tracing::instrument(skip(user, ctx), fields(user = %user.name_any()), level = "debug")]
async fn reconcile(user: Arc<DevServerUser>, ctx: Arc<Ctx>) -> Result<Action> {
    let client = ctx.client.clone();
    let namespace = builders::namespace_name(&user.spec.username);

    let namespaces: Api<Namespace> = Api::all(client.clone());
    create_ignore_conflict(&namespaces, builders::build_namespace(&user)).await?;

    let service_accounts: Api<ServiceAccount> = Api::namespaced(client.clone(), &namespace);
    create_ignore_conflict(&service_accounts, builders::build_service_account(&user, &namespace)).await?;

    let roles: Api<Role> = Api::namespaced(client.clone(), &namespace);
    roles
        .patch(
            builders::ROLE_NAME,
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(builders::build_role(&user, &namespace)),
        )
        .await?;

    let role_bindings: Api<RoleBinding> = Api::namespaced(client.clone(), &namespace);
    create_ignore_conflict(&role_bindings, builders::build_role_binding(&user, &namespace)).await?;

    let quotas: Api<ResourceQuota> = Api::namespaced(client.clone(), &namespace);
    quotas
        .patch(
            "dev-user-quota",
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(builders::build_resource_quota(&user, &namespace)),
        )
        .await?;

    let mut status = user.status.clone().unwrap_or_default();
    status.namespace = Some(namespace.clone());
    crate::resource::condition::set_condition(
        &mut status.conditions,
        Condition::new("Ready", ConditionStatus::True, "NamespaceProvisioned", ""),
    );
    status.observed_generation = user.metadata.generation;

    let users: Api<DevServerUser> = Api::all(client);
    users
        .patch_status(
            &user.name_any(),
            &PatchParams::apply(FIELD_MANAGER).force(),
            &Patch::Apply(serde_json::json!({
                "apiVersion": "devserver.io/v1",
                "kind": "DevServerUser",
                "status": status,
            })),
        )
        .await?;

    info!(user = %user.name_any(), namespace = %namespace, "devserveruser reconciled");
    Ok(Action::requeue(std::time::Duration::from_secs(10 * 60)))
}

fn error_policy(_user: Arc<DevServerUser>, error: &Error, _ctx: Arc<Ctx>) -> Action {
    warn!("devserveruser reconcile failed: {}", error);
    error.action()
}
