//! `DevServer` reconciler (spec.md §4.2): the finalizer gate, time-to-live
//! materialization, expiration check, flavor resolution, mode dispatch and
//! status projection, in that order, one reconcile at a time.
pub mod builders;
pub mod conditions;
pub mod duration;

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::{
    apps::v1::{Deployment, StatefulSet},
    core::v1::{PersistentVolumeClaim, Pod, Secret, Service},
};
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PropagationPolicy},
    runtime::{
        controller,
        controller::{Action, Controller},
        finalizer::{finalizer, Event as Finalizer},
        watcher,
    },
    Client, Resource, ResourceExt,
};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::controller::error::{Error, Result};
use crate::controller::owner;
use crate::controller::{create_ignore_conflict, scoped_api};
use crate::resource::{
    Condition, ConditionStatus, DevServer, DevServerFlavor, DevServerMode, DevServerPhase,
    DEVSERVER_FINALIZER,
};

const LOCKED_SHARED_CLAIM_ANNOTATION: &str = "devserver.io/locked-shared-volume-claim-name";

pub struct Ctx {
    pub client: Client,
    pub config: Config,
}

pub async fn run(client: Client, config: Config) {
    let worker_count = config.worker_count;
    let watcher_config = watcher::Config::default().timeout(crate::controller::resync_timeout_secs(&config));
    let ctx = Arc::new(Ctx { client: client.clone(), config: config.clone() });
    let ns = config.watch_namespace();

    Controller::new(scoped_api::<DevServer>(&client, ns), watcher_config.clone())
        .owns(scoped_api::<Deployment>(&client, ns), watcher_config.clone())
        .owns(scoped_api::<StatefulSet>(&client, ns), watcher_config.clone())
        .owns(scoped_api::<Service>(&client, ns), watcher_config.clone())
        .owns(scoped_api::<PersistentVolumeClaim>(&client, ns), watcher_config.clone())
        .owns(scoped_api::<Secret>(&client, ns), watcher_config)
        .shutdown_on_signal()
        .with_config(controller::Config::default().concurrency(worker_count.try_into().unwrap_or(u16::MAX)))
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { x.ok() })
        .for_each(|(_, action)| async move {
            debug!("devserver reconciled, requeue: {:?}", action);
        })
        .await;
}

#[tracing::instrument(skip(ds, ctx), fields(devserver = %ds.name_any()), level = "debug")]
async fn reconcile(ds: Arc<DevServer>, ctx: Arc<Ctx>) -> Result<Action> {
    let namespace = ds.namespace().expect("DevServer is namespaced");
    let api: Api<DevServer> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, DEVSERVER_FINALIZER, ds, |event| async {
        match event {
            Finalizer::Apply(ds) => apply(&ds, &ctx).await,
            Finalizer::Cleanup(ds) => cleanup(&ds, &ctx).await,
        }
    })
    .await
    .map_err(Error::from)
}

fn error_policy(_ds: Arc<DevServer>, error: &Error, _ctx: Arc<Ctx>) -> Action {
    warn!("devserver reconcile failed: {}", error);
    error.action()
}

/// Cleanup runs once, when a deletion timestamp is observed and the
/// finalizer is still present (spec.md §4.6 state machine, `* →
/// Terminating`). Owner references cascade the actual deletion of
/// children (spec.md §4.2.7); the only thing left to do here is make the
/// transition observable on the object before it's removed.
async fn cleanup(ds: &DevServer, ctx: &Ctx) -> Result<Action> {
    let namespace = ds.namespace().expect("DevServer is namespaced");
    conditions::patch_status(ds, ctx.client.clone(), &namespace, |status| {
        status.phase = DevServerPhase::Terminating;
        status.ready = false;
        status.observed_generation = ds.metadata.generation;
    })
    .await?;
    info!(devserver = %ds.name_any(), "devserver deleted, finalizer will be removed");
    Ok(Action::await_change())
}

async fn apply(ds: &DevServer, ctx: &Ctx) -> Result<Action> {
    let namespace = ds.namespace().expect("DevServer is namespaced");
    let name = ds.name_any();
    let client = ctx.client.clone();

    // Step 3: time-to-live materialization (spec.md I3).
    if let Some(lifecycle) = ds.spec.lifecycle.as_ref() {
        if let (Some(ttl), None) = (&lifecycle.time_to_live, lifecycle.expiration_time) {
            return match duration::parse(ttl) {
                Ok(parsed) => {
                    let created = ds
                        .meta()
                        .creation_timestamp
                        .as_ref().map_or_else(Utc::now, crate::controller::time::k8s_time_to_utc);
                    let expiration = created + parsed;
                    let api: Api<DevServer> = Api::namespaced(client, &namespace);
                    api.patch(
                        &name,
                        &PatchParams::default(),
                        &Patch::Merge(serde_json::json!({ "spec": { "lifecycle": { "expirationTime": expiration } } })),
                    )
                    .await?;
                    Ok(Action::requeue(StdDuration::ZERO))
                }
                Err(e) => {
                    conditions::set_phase(
                        ds,
                        client,
                        &namespace,
                        DevServerPhase::Failed,
                        Condition::new("Degraded", ConditionStatus::True, "InvalidDuration", e.to_string()),
                    )
                    .await?;
                    Ok(Action::await_change())
                }
            };
        }
    }

    // Step 4: expiration check (spec.md I4).
    if let Some(expiration) = ds.spec.lifecycle.as_ref().and_then(|l| l.expiration_time) {
        if Utc::now() >= expiration {
            info!(devserver = %name, "expired, deleting");
            let api: Api<DevServer> = Api::namespaced(client, &namespace);
            api.delete(
                &name,
                &DeleteParams { propagation_policy: Some(PropagationPolicy::Background), ..Default::default() },
            )
            .await?;
            return Ok(Action::await_change());
        }
    }
    let requeue_after = ds
        .spec
        .lifecycle
        .as_ref()
        .and_then(|l| l.expiration_time)
        .map_or(ctx.config.default_requeue, |exp| (exp - Utc::now()).to_std().unwrap_or_default().min(ctx.config.default_requeue));

    // Step 5: flavor resolution.
    let flavors: Api<DevServerFlavor> = Api::all(client.clone());
    let flavor = if let Some(flavor) = flavors.get_opt(&ds.spec.flavor).await? { flavor } else {
        conditions::set_phase(
            ds,
            client,
            &namespace,
            DevServerPhase::Failed,
            Condition::new("Degraded", ConditionStatus::True, "FlavorNotFound", format!("flavor \"{}\" not found", ds.spec.flavor)),
        )
        .await?;
        return Ok(Action::requeue(StdDuration::from_secs(5 * 60)));
    };

    // Step 6: mode dispatch.
    let projection = match ds.spec.mode {
        DevServerMode::Standalone => standalone::reconcile(ds, ctx, &namespace, &name, &flavor).await?,
        DevServerMode::Distributed => distributed::reconcile(ds, ctx, &namespace, &name, &flavor).await?,
    };

    // Step 7: status projection.
    conditions::patch_status(ds, client, &namespace, |status| {
        status.phase = projection.phase;
        status.ready = projection.ready;
        status.service_name = Some(projection.ssh_service_name.clone());
        status.ssh_endpoint = projection.ssh_endpoint.clone();
        status.pod_names = projection.pod_names.clone();
        if projection.ready && status.start_time.is_none() {
            status.start_time = Some(Utc::now());
        }
        crate::resource::condition::set_condition(
            &mut status.conditions,
            Condition::new(
                "Ready",
                if projection.ready { ConditionStatus::True } else { ConditionStatus::False },
                if projection.ready { "ChildrenReady" } else { "WaitingForChildren" },
                "",
            ),
        );
        // spec.md §9: autoShutdown+idleTimeout's transition rule (deletion vs
        // pausing the workload) is left unresolved by the source repository.
        // Surfaced as a condition rather than guessed at.
        if let Some(lifecycle) = ds.spec.lifecycle.as_ref() {
            if lifecycle.auto_shutdown == Some(true) && lifecycle.idle_timeout.is_some() {
                crate::resource::condition::set_condition(
                    &mut status.conditions,
                    Condition::new(
                        "Degraded",
                        ConditionStatus::True,
                        "IdleShutdownUnspecified",
                        "autoShutdown+idleTimeout is set but no idle-to-action transition is implemented",
                    ),
                );
            }
        }
        status.observed_generation = ds.metadata.generation;
    })
    .await?;

    // Step 8: requeue.
    Ok(Action::requeue(requeue_after))
}

/// Result of ensuring mode-specific children, consumed by status projection.
struct Projection {
    phase: DevServerPhase,
    ready: bool,
    ssh_service_name: String,
    ssh_endpoint: Option<String>,
    pod_names: Vec<String>,
}

/// Immutable-field enforcement shared by standalone and distributed mode
/// (spec.md I6): once a workload exists, the `sharedVolumeClaimName` it was
/// created with is locked via an annotation, and any later divergence in
/// `spec.sharedVolumeClaimName` produces a Degraded condition instead of a
/// patch. `persistentHomeSize` needs no such bookkeeping: it is compared
/// directly against the already-created volume claim, which this crate
/// never re-patches (see `builders::volumeclaim`).
fn lock_shared_claim(ds: &DevServer, locked_annotation: Option<&str>) -> (Option<String>, Option<Condition>) {
    let declared = ds.spec.shared_volume_claim_name.clone();
    match locked_annotation {
        None => (declared, None),
        Some(locked) => {
            let locked = if locked.is_empty() { None } else { Some(locked.to_owned()) };
            if locked == declared {
                (locked, None)
            } else {
                let degraded = Condition::new(
                    "Degraded",
                    ConditionStatus::True,
                    "ImmutableField",
                    "spec.sharedVolumeClaimName is immutable after first successful reconcile",
                );
                (locked, Some(degraded))
            }
        }
    }
}

/// spec.md §7 "Precondition": a referenced shared volume claim that does
/// not exist yet. Surfaced as a condition; the workload is still created
/// so it converges to Running as soon as the claim appears, matching "the
/// engine returns success with a 5-min requeue" rather than blocking.
async fn shared_claim_precondition(client: Client, ns: &str, claim_name: Option<&str>) -> Result<Option<Condition>> {
    let Some(claim_name) = claim_name else {
        return Ok(None);
    };
    let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client, ns);
    if pvcs.get_opt(claim_name).await?.is_none() {
        Ok(Some(Condition::new(
            "Degraded",
            ConditionStatus::True,
            "SharedVolumeClaimNotFound",
            format!("shared volume claim \"{claim_name}\" not found"),
        )))
    } else {
        Ok(None)
    }
}

/// Names of the pods owned by this `DevServer`, selected by the same
/// `{app=devserver, devserver=<name>}` labels its workload's pod template
/// carries (spec.md §3.1 `status.podNames`).
async fn list_pod_names(client: Client, ns: &str, name: &str) -> Result<Vec<String>> {
    let pods: Api<Pod> = Api::namespaced(client, ns);
    let selector = owner::devserver_selector(name)
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    let list = pods.list(&ListParams::default().labels(&selector)).await?;
    Ok(list.items.into_iter().filter_map(|p| p.metadata.name).collect())
}

/// Re-patches an owned `Service` back toward its desired selector/ports/labels
/// (spec.md §4.3.5, §5): `clusterIP` and `type` are left untouched since both
/// can be immutable depending on how the service was created.
async fn patch_service(services: &Api<Service>, name: &str, desired: &Service) -> Result<()> {
    let spec = desired.spec.as_ref().expect("service builders always set spec");
    services
        .patch(
            name,
            &PatchParams::apply("devserver-operator-workload").force(),
            &Patch::Apply(serde_json::json!({
                "apiVersion": "v1",
                "kind": "Service",
                "metadata": { "labels": desired.metadata.labels },
                "spec": { "selector": spec.selector, "ports": spec.ports },
            })),
        )
        .await?;
    Ok(())
}

fn home_size_degraded(ds: &DevServer, existing_pvc: Option<&PersistentVolumeClaim>) -> Option<Condition> {
    let existing_size = existing_pvc
        .and_then(|p| p.spec.as_ref())
        .and_then(|s| s.resources.as_ref())
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get("storage"));
    match existing_size {
        Some(existing) if *existing != ds.spec.persistent_home_size => Some(Condition::new(
            "Degraded",
            ConditionStatus::True,
            "ImmutableField",
            "spec.persistentHomeSize is immutable after first successful reconcile",
        )),
        _ => None,
    }
}

fn effective_ds(ds: &DevServer, effective_shared_claim: Option<String>) -> DevServer {
    let mut clone = ds.clone();
    clone.spec.shared_volume_claim_name = effective_shared_claim;
    clone
}

mod standalone {
    use super::{
        builders, create_ignore_conflict, effective_ds, home_size_degraded, lock_shared_claim,
        patch_service, DevServerPhase, Projection, LOCKED_SHARED_CLAIM_ANNOTATION,
    };
    use crate::controller::devserver::conditions;
    use crate::controller::error::{Error, Result};
    use crate::resource::{DevServer, DevServerFlavor};
    use k8s_openapi::api::{apps::v1::Deployment, core::v1::PersistentVolumeClaim};
    use kube::api::{Api, Patch, PatchParams};

    pub async fn reconcile(ds: &DevServer, ctx: &super::Ctx, ns: &str, name: &str, flavor: &DevServerFlavor) -> Result<Projection> {
        let client = ctx.client.clone();

        let pvcs: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), ns);
        let pvc_name = builders::volumeclaim::name(name);
        let existing_pvc = pvcs.get_opt(&pvc_name).await?;
        let desired_pvc = builders::volumeclaim::build(ds, name, ns);
        if existing_pvc.is_none() {
            create_ignore_conflict(&pvcs, desired_pvc).await?;
        } else {
            // `spec` (size, storage class) is immutable once bound; only
            // labels are re-patched. Size divergence is surfaced via
            // `home_size_degraded` instead of patched.
            pvcs.patch(
                &pvc_name,
                &PatchParams::apply("devserver-operator-workload").force(),
                &Patch::Apply(serde_json::json!({
                    "apiVersion": "v1",
                    "kind": "PersistentVolumeClaim",
                    "metadata": { "labels": desired_pvc.metadata.labels },
                })),
            )
            .await?;
        }
        let degraded = home_size_degraded(ds, existing_pvc.as_ref());

        let deployments: Api<Deployment> = Api::namespaced(client.clone(), ns);
        let existing = deployments.get_opt(name).await?;
        let locked_annotation = existing
            .as_ref()
            .and_then(|d| d.metadata.annotations.as_ref())
            .and_then(|a| a.get(LOCKED_SHARED_CLAIM_ANNOTATION))
            .cloned();
        let (effective_shared, shared_degraded) = lock_shared_claim(ds, locked_annotation.as_deref());
        let effective = effective_ds(ds, effective_shared.clone());
        let missing_claim = super::shared_claim_precondition(client.clone(), ns, effective_shared.as_deref()).await?;

        if let Some(cond) = degraded.or(shared_degraded).or(missing_claim) {
            conditions::set_condition(ds, client.clone(), ns, cond).await?;
        }

        let mut desired = builders::workload::build_deployment(&effective, name, ns, flavor);
        match existing {
            None => {
                desired
                    .metadata
                    .annotations
                    .get_or_insert_with(Default::default)
                    .insert(LOCKED_SHARED_CLAIM_ANNOTATION.to_owned(), effective_shared.clone().unwrap_or_default());
                create_ignore_conflict(&deployments, desired).await?;
            }
            Some(_) => {
                deployments
                    .patch(
                        name,
                        &PatchParams::apply("devserver-operator-workload").force(),
                        &Patch::Apply(serde_json::json!({
                            "apiVersion": "apps/v1",
                            "kind": "Deployment",
                            "metadata": { "labels": desired.metadata.labels },
                            "spec": { "replicas": 1, "selector": desired.spec.as_ref().unwrap().selector, "template": desired.spec.as_ref().unwrap().template },
                        })),
                    )
                    .await?;
            }
        }

        let ssh_service_name = if ds.spec.enable_ssh {
            let services: Api<k8s_openapi::api::core::v1::Service> = Api::namespaced(client.clone(), ns);
            let svc_name = builders::service::ssh_name(name);
            let desired_svc = builders::service::build_ssh(ds, name, ns);
            if services.get_opt(&svc_name).await?.is_none() {
                create_ignore_conflict(&services, desired_svc).await?;
            } else {
                patch_service(&services, &svc_name, &desired_svc).await?;
            }
            if ds.spec.ssh.is_some() {
                maybe_host_keys(ds, ctx, ns, name).await?;
            }
            svc_name
        } else {
            String::new()
        };

        let deployments: Api<Deployment> = Api::namespaced(client.clone(), ns);
        let workload = deployments.get_opt(name).await?;
        let ready = workload
            .as_ref()
            .and_then(|d| d.status.as_ref())
            .is_some_and(|s| s.ready_replicas.unwrap_or(0) >= 1);
        let pod_names = super::list_pod_names(client, ns, name).await?;

        Ok(Projection {
            phase: if ready { DevServerPhase::Running } else { DevServerPhase::Pending },
            ready,
            ssh_endpoint: (ready && ds.spec.enable_ssh).then(|| format!("{ssh_service_name}.{ns}.svc:22")),
            ssh_service_name,
            pod_names,
        })
    }

    /// Host keys are generated once and never regenerated (spec.md §9); if
    /// the secret already exists only its labels are re-patched, never its
    /// key material.
    async fn maybe_host_keys(ds: &DevServer, ctx: &super::Ctx, ns: &str, name: &str) -> Result<()> {
        let secrets: Api<k8s_openapi::api::core::v1::Secret> = Api::namespaced(ctx.client.clone(), ns);
        let secret_name = builders::hostkeys::name(name);
        if secrets.get_opt(&secret_name).await?.is_some() {
            secrets
                .patch(
                    &secret_name,
                    &PatchParams::apply("devserver-operator-workload").force(),
                    &Patch::Apply(serde_json::json!({
                        "apiVersion": "v1",
                        "kind": "Secret",
                        "metadata": { "labels": crate::controller::owner::common_labels("devserver", name) },
                    })),
                )
                .await?;
        } else {
            let secret = builders::hostkeys::build(ds, name, ns)
                .map_err(|e| Error::Validation(e.to_string()))?;
            create_ignore_conflict(&secrets, secret).await?;
        }
        Ok(())
    }
}

mod distributed {
    use super::{
        builders, create_ignore_conflict, effective_ds, lock_shared_claim, patch_service, DevServerPhase,
        Projection, LOCKED_SHARED_CLAIM_ANNOTATION,
    };
    use crate::controller::devserver::conditions;
    use crate::controller::error::Result;
    use crate::resource::{Condition, ConditionStatus, DevServer, DevServerFlavor};
    use k8s_openapi::api::{apps::v1::StatefulSet, core::v1::ConfigMap, core::v1::Service};
    use kube::api::{Api, Patch, PatchParams};

    pub async fn reconcile(ds: &DevServer, ctx: &super::Ctx, ns: &str, name: &str, flavor: &DevServerFlavor) -> Result<Projection> {
        let client = ctx.client.clone();
        let Some(dist) = ds.spec.distributed.as_ref() else {
            conditions::set_phase(
                ds,
                client,
                ns,
                DevServerPhase::Failed,
                Condition::new("Degraded", ConditionStatus::True, "MissingDistributedSpec", "mode=distributed requires spec.distributed"),
            )
            .await?;
            return Ok(Projection {
                phase: DevServerPhase::Failed,
                ready: false,
                ssh_service_name: String::new(),
                ssh_endpoint: None,
                pod_names: Vec::new(),
            });
        };

        let peers_name = builders::service::peers_name(name);
        let services: Api<Service> = Api::namespaced(client.clone(), ns);
        let desired_peers = builders::service::build_peers(ds, name, ns);
        if services.get_opt(&peers_name).await?.is_none() {
            create_ignore_conflict(&services, desired_peers).await?;
        } else {
            patch_service(&services, &peers_name, &desired_peers).await?;
        }
        let ssh_service_name = if ds.spec.enable_ssh {
            let ssh_name = builders::service::ssh_name(name);
            let desired_ssh = builders::service::build_ssh(ds, name, ns);
            if services.get_opt(&ssh_name).await?.is_none() {
                create_ignore_conflict(&services, desired_ssh).await?;
            } else {
                patch_service(&services, &ssh_name, &desired_ssh).await?;
            }
            ssh_name
        } else {
            String::new()
        };

        let configmaps: Api<ConfigMap> = Api::namespaced(client.clone(), ns);
        let cm_name = builders::configmap::name(name);
        let desired_cm = builders::configmap::build(ds, name, ns, dist, &peers_name);
        if configmaps.get_opt(&cm_name).await?.is_none() {
            create_ignore_conflict(&configmaps, desired_cm).await?;
        } else {
            configmaps
                .patch(
                    &cm_name,
                    &PatchParams::apply("devserver-operator-workload").force(),
                    &Patch::Apply(serde_json::json!({
                        "apiVersion": "v1",
                        "kind": "ConfigMap",
                        "metadata": { "labels": desired_cm.metadata.labels },
                        "data": desired_cm.data,
                    })),
                )
                .await?;
        }

        let statefulsets: Api<StatefulSet> = Api::namespaced(client.clone(), ns);
        let existing = statefulsets.get_opt(name).await?;
        let locked_annotation = existing
            .as_ref()
            .and_then(|s| s.metadata.annotations.as_ref())
            .and_then(|a| a.get(LOCKED_SHARED_CLAIM_ANNOTATION))
            .cloned();
        let (effective_shared, shared_degraded) = lock_shared_claim(ds, locked_annotation.as_deref());
        let missing_claim = super::shared_claim_precondition(client.clone(), ns, effective_shared.as_deref()).await?;
        if let Some(cond) = shared_degraded.or(missing_claim) {
            conditions::set_condition(ds, client.clone(), ns, cond).await?;
        }
        let effective = effective_ds(ds, effective_shared.clone());

        let mut desired = builders::workload::build_stateful_set(&effective, name, ns, flavor, dist.world_size, &peers_name);
        match existing {
            None => {
                desired
                    .metadata
                    .annotations
                    .get_or_insert_with(Default::default)
                    .insert(LOCKED_SHARED_CLAIM_ANNOTATION.to_owned(), effective_shared.clone().unwrap_or_default());
                create_ignore_conflict(&statefulsets, desired).await?;
            }
            Some(_) => {
                statefulsets
                    .patch(
                        name,
                        &PatchParams::apply("devserver-operator-workload").force(),
                        &Patch::Apply(serde_json::json!({
                            "apiVersion": "apps/v1",
                            "kind": "StatefulSet",
                            "metadata": { "labels": desired.metadata.labels },
                            "spec": {
                                "replicas": dist.world_size,
                                "serviceName": peers_name,
                                "selector": desired.spec.as_ref().unwrap().selector,
                                "template": desired.spec.as_ref().unwrap().template,
                            },
                        })),
                    )
                    .await?;
            }
        }

        let statefulsets: Api<StatefulSet> = Api::namespaced(client.clone(), ns);
        let workload = statefulsets.get_opt(name).await?;
        let ready = workload
            .as_ref()
            .and_then(|s| s.status.as_ref())
            .is_some_and(|s| s.ready_replicas.unwrap_or(0) >= dist.world_size as i32);
        let pod_names = super::list_pod_names(client, ns, name).await?;

        Ok(Projection {
            phase: if ready { DevServerPhase::Running } else { DevServerPhase::Pending },
            ready,
            ssh_endpoint: (ready && ds.spec.enable_ssh).then(|| format!("{ssh_service_name}.{ns}.svc:22")),
            ssh_service_name,
            pod_names,
        })
    }
}
