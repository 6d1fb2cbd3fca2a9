//! Error taxonomy shared by all three reconcilers (spec.md §7). Kinds, not
//! exhaustive wrapped types: each variant names the handling policy, and
//! `error_policy` (in each reconciler's `mod.rs`) dispatches on it rather
//! than on the wrapped source error.
//!
//! Two taxonomy kinds from spec.md §7 never materialize as a variant here:
//! **Precondition** (flavor/shared-claim missing) and **Immutable** (a
//! locked field changed) are both handled inline as a condition write plus
//! `Ok(Action::requeue(..))` — the spec's own wording ("reconcile returns
//! success", "other reconciliation continues") describes a success path,
//! not a propagated error.
use kube::runtime::controller::Action;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Conflict, throttling, timeout: recovered locally via bounded retry
    /// then requeue with backoff.
    #[error("transient API error: {0}")]
    TransientApi(#[source] kube::Error),

    /// Malformed duration, negative replicas, contradictory spec. Not
    /// retried until the object's generation changes.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Finalizer helper or kube-runtime plumbing failure, always treated
    /// as transient (it wraps a `kube::Error` internally in most cases).
    #[error("finalizer error: {0}")]
    Finalizer(#[source] Box<kube::runtime::finalizer::Error<Error>>),
}

impl Error {
    /// Classify this error into a requeue action (spec.md §7, "Propagation
    /// policy": only Fatal propagates out of the worker — this crate has
    /// no Fatal reconcile-step errors, only process-level ones handled in
    /// `bin/run.rs`).
    pub fn action(&self) -> Action {
        match self {
            Error::TransientApi(_) | Error::Finalizer(_) => Action::requeue(Duration::from_secs(15)),
            Error::Validation(_) => Action::await_change(),
        }
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::TransientApi(e)
    }
}

impl From<kube::runtime::finalizer::Error<Error>> for Error {
    fn from(e: kube::runtime::finalizer::Error<Error>) -> Self {
        Error::Finalizer(Box::new(e))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
