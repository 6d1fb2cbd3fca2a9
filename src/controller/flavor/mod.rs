//! `DevServerFlavor` reconciler (spec.md §4.5): pure validation, no children.
use std::sync::Arc;

use futures::StreamExt;
use kube::{
    api::{Api, Patch, PatchParams},
    runtime::{controller::Action, watcher, Controller},
    Client, ResourceExt,
};
use tracing::warn;

use crate::config::Config;
use crate::controller::error::{Error, Result};
use crate::resource::{Condition, ConditionStatus, DevServerFlavor};

const FIELD_MANAGER: &str = "devserver-operator-flavor";

pub struct Ctx {
    pub client: Client,
}

pub async fn run(client: Client, config: Config) {
    let ctx = Arc::new(Ctx { client: client.clone() });
    let watcher_config = watcher::Config::default().timeout(crate::controller::resync_timeout_secs(&config));
    Controller::new(Api::<DevServerFlavor>::all(client), watcher_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .filter_map(|x| async move { x.ok() })
        .for_each(|_| async {})
        .await;
}

#[tracing::instrument(skip(flavor, ctx), fields(flavor = %flavor.name_any()), level = "debug")]
async fn reconcile(flavor: Arc<DevServerFlavor>, ctx: Arc<Ctx>) -> Result<Action> {
    let condition = match validate(&flavor) {
        Ok(()) => Condition::new("Available", ConditionStatus::True, "Valid", ""),
        Err(reason) => Condition::new("Available", ConditionStatus::False, "Invalid", reason),
    };

    let mut status = flavor.status.clone().unwrap_or_default();
    crate::resource::condition::set_condition(&mut status.conditions, condition);
    status.observed_generation = flavor.metadata.generation;

    let api: Api<DevServerFlavor> = Api::all(ctx.client.clone());
    api.patch_status(
        &flavor.name_any(),
        &PatchParams::apply(FIELD_MANAGER).force(),
        &Patch::Apply(serde_json::json!({
            "apiVersion": "devserver.io/v1",
            "kind": "DevServerFlavor",
            "status": status,
        })),
    )
    .await?;

    Ok(Action::requeue(std::time::Duration::from_secs(10 * 60)))
}

/// Checks requests ≤ limits per resource key declared in both, that
/// tolerations are syntactically valid (non-empty key, a recognized
/// operator/effect), and that every `nodeSelector` key is non-empty.
fn validate(flavor: &DevServerFlavor) -> Result<(), String> {
    for (key, request) in &flavor.spec.resources.requests {
        if let Some(limit) = flavor.spec.resources.limits.get(key) {
            if parse_quantity(&request.0) > parse_quantity(&limit.0) {
                return Err(format!("requests.{key} ({}) exceeds limits.{key} ({})", request.0, limit.0));
            }
        }
    }

    for key in flavor.spec.node_selector.keys() {
        if key.is_empty() {
            return Err("nodeSelector contains an empty key".to_owned());
        }
    }

    for toleration in &flavor.spec.tolerations {
        if toleration.key.is_empty() {
            return Err("toleration has an empty key".to_owned());
        }
        if !matches!(toleration.operator.as_str(), "Exists" | "Equal") {
            return Err(format!("toleration operator {:?} is not Exists or Equal", toleration.operator));
        }
        if toleration.operator == "Equal" && toleration.value.is_none() {
            return Err(format!("toleration {:?} uses operator Equal but has no value", toleration.key));
        }
        if !matches!(toleration.effect.as_str(), "NoSchedule" | "PreferNoSchedule" | "NoExecute") {
            return Err(format!("toleration effect {:?} is not a recognized taint effect", toleration.effect));
        }
    }

    Ok(())
}

/// `Quantity` has no `Ord`; parse the common suffix forms well enough to
/// compare requests against limits. Falls back to treating unparsable
/// quantities as equal so a foreign unit never spuriously fails validation.
fn parse_quantity(raw: &str) -> f64 {
    let digits_len = raw
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit() || *c == '.')
        .count();
    let (number, suffix) = raw.split_at(digits_len);
    let Ok(value) = number.parse::<f64>() else {
        return 0.0;
    };
    let multiplier = match suffix {
        "m" => 0.001,
        "" => 1.0,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "Ki" => 1024.0,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        _ => 1.0,
    };
    value * multiplier
}

fn error_policy(_flavor: Arc<DevServerFlavor>, error: &Error, _ctx: Arc<Ctx>) -> Action {
    warn!("devserverflavor reconcile failed: {}", error);
    error.action()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn flavor(requests: &[(&str, &str)], limits: &[(&str, &str)]) -> DevServerFlavor {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "devserver.io/v1",
            "kind": "DevServerFlavor",
            "metadata": {"name": "cpu-small"},
            "spec": {
                "resources": {
                    "requests": requests.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect::<std::collections::BTreeMap<_,_>>(),
                    "limits": limits.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect::<std::collections::BTreeMap<_,_>>(),
                },
            },
        }))
        .unwrap()
    }

    #[test]
    fn accepts_requests_at_or_below_limits() {
        assert!(validate(&flavor(&[("cpu", "1")], &[("cpu", "2")])).is_ok());
        assert!(validate(&flavor(&[("cpu", "2")], &[("cpu", "2")])).is_ok());
    }

    #[test]
    fn rejects_requests_above_limits() {
        assert!(validate(&flavor(&[("cpu", "4")], &[("cpu", "2")])).is_err());
        assert!(validate(&flavor(&[("memory", "8Gi")], &[("memory", "4Gi")])).is_err());
    }

    #[test]
    fn rejects_empty_node_selector_key() {
        let mut f = flavor(&[], &[]);
        f.spec.node_selector.insert(String::new(), "x".to_owned());
        assert!(validate(&f).is_err());
    }

    #[test]
    fn rejects_malformed_toleration() {
        let mut f = flavor(&[], &[]);
        f.spec.tolerations.push(crate::resource::Toleration {
            key: "dedicated".to_owned(),
            operator: "Bogus".to_owned(),
            value: None,
            effect: "NoSchedule".to_owned(),
        });
        assert!(validate(&f).is_err());
        let _ = Quantity(String::new());
    }
}
