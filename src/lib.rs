#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
mod config;
mod controller;
mod resource;

pub use config::Config;
pub use controller::run;
pub use resource::{
    Condition, ConditionStatus, DevServer, DevServerFlavor, DevServerFlavorSpec,
    DevServerFlavorStatus, DevServerMode, DevServerPhase, DevServerSpec, DevServerStatus,
    DevServerUser, DevServerUserSpec, DevServerUserStatus, DistributedBackend, DistributedSpec,
    FlavorResources, LifecycleSpec, SshSpec, Toleration, DEVSERVER_FINALIZER,
};
