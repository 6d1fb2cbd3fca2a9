// https://github.com/GREsau/schemars/pull/65
#![allow(clippy::field_reassign_with_default)]

pub mod condition;
mod devserver;
mod flavor;
mod schemas;
mod user;

pub use condition::{Condition, ConditionStatus};
pub use devserver::{
    DevServer, DevServerMode, DevServerPhase, DevServerSpec, DevServerStatus, DistributedBackend,
    DistributedSpec, LifecycleSpec, SshSpec,
};
pub use flavor::{
    DevServerFlavor, DevServerFlavorSpec, DevServerFlavorStatus, FlavorResources, Toleration,
};
pub use user::{DevServerUser, DevServerUserSpec, DevServerUserStatus};

/// Finalizer key the engine adds to every `DevServer` it manages
/// (spec.md §6.3). Presence means the engine owns teardown for that root.
pub const DEVSERVER_FINALIZER: &str = "devserver.devservers.io/finalizer";
