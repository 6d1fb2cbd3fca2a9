//! Pure functions from `(DevServer, DevServerFlavor)` to desired cluster
//! objects (spec.md §4.3). Every builder here is deterministic modulo
//! API-assigned timestamps, except [`hostkeys`], which is deliberately
//! exempt (see its module doc).
pub mod configmap;
pub mod hostkeys;
pub mod service;
pub mod volumeclaim;
pub mod workload;
