//! Hand-rolled leader election on a `coordination.k8s.io/v1` `Lease`
//! (spec.md §4.1, §5). `kube-leader-election` would be the obvious choice —
//! `eosin-storage-operator` uses it — but its `k8s-openapi = ">=0.27"`
//! dependency is unbounded and pulls in a second, semver-incompatible
//! `k8s-openapi` release alongside the one this crate pins, so leader
//! election is implemented directly against `Lease` instead (see
//! DESIGN.md).
use std::time::Duration;

use k8s_openapi::{
    api::coordination::v1::{Lease, LeaseSpec},
    apimachinery::pkg::apis::meta::v1::MicroTime,
    jiff::Timestamp,
};
use kube::{
    api::{Patch, PatchParams, PostParams},
    Api, Client,
};
use tracing::{debug, info, warn};

const FIELD_MANAGER: &str = "devserver-operator-lease";

/// Renewable lease held by exactly one engine instance at a time. Lease
/// loss (another identity holds it, or it expired and someone else grabbed
/// it) must be observed by the caller so it can cancel in-flight
/// reconciles and stop reconciling (spec.md §5, "Leader election").
pub struct LeaseLock {
    api: Api<Lease>,
    name: String,
    identity: String,
    duration: Duration,
}

impl LeaseLock {
    pub fn new(client: Client, namespace: &str, name: impl Into<String>, identity: impl Into<String>, duration: Duration) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            name: name.into(),
            identity: identity.into(),
            duration,
        }
    }

    /// Try to acquire or renew the lease. Returns `true` if this identity
    /// holds it after the call.
    pub async fn try_acquire_or_renew(&self) -> kube::Result<bool> {
        let now = Timestamp::now();
        match self.api.get_opt(&self.name).await? {
            None => {
                let lease = Lease {
                    metadata: kube::api::ObjectMeta {
                        name: Some(self.name.clone()),
                        ..Default::default()
                    },
                    spec: Some(LeaseSpec {
                        holder_identity: Some(self.identity.clone()),
                        lease_duration_seconds: Some(self.duration.as_secs() as i32),
                        acquire_time: Some(MicroTime(now)),
                        renew_time: Some(MicroTime(now)),
                        lease_transitions: Some(0),
                        ..Default::default()
                    }),
                };
                match self.api.create(&PostParams::default(), &lease).await {
                    Ok(_) => {
                        info!(identity = %self.identity, "acquired lease");
                        Ok(true)
                    }
                    Err(kube::Error::Api(e)) if e.code == 409 => {
                        debug!("lost race to create lease");
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
            Some(existing) => {
                let spec = existing.spec.unwrap_or_default();
                let held_by_us = spec.holder_identity.as_deref() == Some(&self.identity);
                let expired = spec
                    .renew_time
                    .as_ref()
                    .map_or(true, |t| now.duration_since(t.0).as_secs() > i64::from(spec.lease_duration_seconds.unwrap_or(0)));

                if !held_by_us && !expired {
                    return Ok(false);
                }

                let transitions = spec.lease_transitions.unwrap_or(0) + i32::from(!held_by_us);
                let patch = serde_json::json!({
                    "spec": {
                        "holderIdentity": self.identity,
                        "leaseDurationSeconds": self.duration.as_secs() as i32,
                        "acquireTime": if held_by_us { spec.acquire_time.map(|t| t.0) } else { Some(now) },
                        "renewTime": now,
                        "leaseTransitions": transitions,
                    }
                });
                match self
                    .api
                    .patch(&self.name, &PatchParams::apply(FIELD_MANAGER).force(), &Patch::Merge(patch))
                    .await
                {
                    Ok(_) => {
                        if !held_by_us {
                            info!(identity = %self.identity, "took over expired lease");
                        }
                        Ok(true)
                    }
                    Err(kube::Error::Api(e)) if e.code == 409 => {
                        warn!("lost lease renewal race");
                        Ok(false)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }
}

impl std::fmt::Debug for LeaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLock")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .finish()
    }
}

