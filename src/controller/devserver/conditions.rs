//! Status-subresource patch helper for `DevServer` (spec.md §7, "status
//! writes are atomic with respect to a single reconcile"). Uses
//! server-side apply with `force()`, matching the teacher's
//! `conditions.rs` and the recommendation in the upstream SSA docs: "always
//! force conflicts, since they might not be able to resolve or act on
//! these conflicts."
use kube::{
    api::{Patch, PatchParams},
    Api, Client, Resource, ResourceExt,
};

use crate::resource::{Condition, DevServer, DevServerPhase, DevServerStatus};

const FIELD_MANAGER: &str = "devserver-operator-devserver";

pub async fn patch_status(
    ds: &DevServer,
    client: Client,
    namespace: &str,
    f: impl FnOnce(&mut DevServerStatus),
) -> kube::Result<()> {
    let mut status = ds.status.clone().unwrap_or_default();
    f(&mut status);

    let api: Api<DevServer> = Api::namespaced(client, namespace);
    api.patch_status(
        &ds.name_any(),
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(serde_json::json!({
            "apiVersion": DevServer::api_version(&()),
            "kind": DevServer::kind(&()),
            "status": status,
        })),
    )
    .await?;
    Ok(())
}

pub async fn set_condition(ds: &DevServer, client: Client, namespace: &str, condition: Condition) -> kube::Result<()> {
    patch_status(ds, client, namespace, |status| {
        crate::resource::condition::set_condition(&mut status.conditions, condition);
        status.observed_generation = ds.metadata.generation;
    })
    .await
}

pub async fn set_phase(ds: &DevServer, client: Client, namespace: &str, phase: DevServerPhase, condition: Condition) -> kube::Result<()> {
    patch_status(ds, client, namespace, |status| {
        status.phase = phase;
        status.ready = matches!(phase, DevServerPhase::Running);
        crate::resource::condition::set_condition(&mut status.conditions, condition);
        status.observed_generation = ds.metadata.generation;
    })
    .await
}
