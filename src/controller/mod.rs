//! Top-level wiring for the three reconcilers (spec.md §4, §5 "Leader
//! election"). Exactly one engine instance reconciles at a time; the
//! others hold open watches in standby and poll the lease until it frees up.
pub mod devserver;
pub mod error;
pub mod flavor;
pub mod lease;
pub mod owner;
pub mod time;
pub mod user;

use std::time::Duration;

use kube::{
    api::{Api, PostParams},
    core::{NamespaceResourceScope, Resource},
    Client,
};
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use error::Error;
use lease::LeaseLock;

const LEASE_NAME: &str = "devserver-operator-leader";
const LEASE_DURATION: Duration = Duration::from_secs(15);

pub async fn run(client: Client, config: Config) {
    if !config.leader_election {
        info!("leader election disabled, reconciling unconditionally");
        run_controllers(client, config).await;
        return;
    }

    let identity = format!("{}-{}", hostname(), Uuid::new_v4());
    let lock = LeaseLock::new(client.clone(), &config.lease_namespace, LEASE_NAME, identity, LEASE_DURATION);

    loop {
        match lock.try_acquire_or_renew().await {
            Ok(true) => break,
            Ok(false) => tokio::time::sleep(LEASE_DURATION / 3).await,
            Err(e) => {
                tracing::warn!("lease acquisition error: {}", e);
                tokio::time::sleep(LEASE_DURATION / 3).await;
            }
        }
    }
    info!(lease = lock.name(), "acquired leadership, starting controllers");

    let renewer = {
        let lock = lock;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(LEASE_DURATION / 3).await;
                if let Err(e) = lock.try_acquire_or_renew().await {
                    tracing::warn!("lease renewal error: {}", e);
                }
            }
        })
    };

    run_controllers(client, config).await;
    renewer.abort();
}

async fn run_controllers(client: Client, config: Config) {
    tokio::join!(
        devserver::run(client.clone(), config.clone()),
        user::run(client.clone(), config.clone()),
        flavor::run(client, config),
    );
}

fn hostname() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "devserver-operator".to_owned())
}

/// Dispatches to `Api::namespaced` or `Api::all` depending on whether
/// `ns` is set, for a kind this engine only ever watches namespace-scoped
/// (spec.md §6.4, "watch-namespace": single namespace or cluster-wide).
pub fn scoped_api<K>(client: &Client, ns: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    match ns {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

/// `Config::resync_period`, clamped to `u32` seconds for
/// `watcher::Config::timeout` (spec.md §6.4, "periodic rescan to catch
/// missed events"): once a watch call has run this long, the client closes
/// it and re-lists from the API server instead of waiting on further
/// watch events.
pub(crate) fn resync_timeout_secs(config: &Config) -> u32 {
    u32::try_from(config.resync_period.as_secs()).unwrap_or(u32::MAX)
}

/// Create `obj`, treating "already exists" as success: the next reconcile
/// of the same root will patch it toward desired state instead.
pub(crate) async fn create_ignore_conflict<K>(api: &Api<K>, obj: K) -> Result<(), Error>
where
    K: kube::Resource + Clone + serde::Serialize + serde::de::DeserializeOwned + std::fmt::Debug,
{
    match api.create(&PostParams::default(), &obj).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
        Err(e) => Err(Error::from(e)),
    }
}
