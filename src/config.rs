//! Engine process configuration surface (spec.md §6.4). A `clap::Parser`
//! struct read once at startup, every field also settable by environment
//! variable, in the style `echo-operator-bin`'s `Args` binds CLI flags to
//! env vars for container-friendly configuration.
use std::time::Duration;

use clap::Parser;

fn parse_duration_secs(s: &str) -> Result<Duration, String> {
    s.parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|e| e.to_string())
}

#[derive(Parser, Debug, Clone)]
#[command(name = "devserver-operator", about = "Reconciles DevServer, DevServerFlavor and DevServerUser custom resources.")]
pub struct Config {
    /// Number of concurrent reconcile workers.
    #[arg(long, env = "DEVSERVER_OPERATOR_WORKER_COUNT", default_value_t = 4)]
    pub worker_count: usize,

    /// Deadline for a single reconcile before it is cancelled and re-queued (seconds).
    #[arg(long, env = "DEVSERVER_OPERATOR_RECONCILE_DEADLINE", value_parser = parse_duration_secs, default_value = "120")]
    pub reconcile_deadline: Duration,

    /// Periodic full rescan interval to catch missed watch events (seconds).
    #[arg(long, env = "DEVSERVER_OPERATOR_RESYNC_PERIOD", value_parser = parse_duration_secs, default_value = "600")]
    pub resync_period: Duration,

    /// Fallback requeue interval when nothing else drives a reconcile (seconds).
    #[arg(long, env = "DEVSERVER_OPERATOR_DEFAULT_REQUEUE", value_parser = parse_duration_secs, default_value = "1800")]
    pub default_requeue: Duration,

    /// Whether to run leader election (disable only for single-replica deployments/tests).
    #[arg(long, env = "DEVSERVER_OPERATOR_LEADER_ELECTION", default_value_t = true)]
    pub leader_election: bool,

    /// Restrict watches to a single namespace; empty means cluster-wide.
    #[arg(long, env = "DEVSERVER_OPERATOR_WATCH_NAMESPACE", default_value = "")]
    pub watch_namespace: String,

    /// Namespace the leader-election `Lease` object itself lives in.
    #[arg(long, env = "DEVSERVER_OPERATOR_LEASE_NAMESPACE", default_value = "default")]
    pub lease_namespace: String,

    /// Logging filter for `tracing_subscriber::EnvFilter`.
    #[arg(long, env = "RUST_LOG", default_value = "info,devserver_operator=debug")]
    pub log_filter: String,
}

impl Config {
    #[must_use] 
    pub fn watch_namespace(&self) -> Option<&str> {
        if self.watch_namespace.is_empty() {
            None
        } else {
            Some(self.watch_namespace.as_str())
        }
    }
}
