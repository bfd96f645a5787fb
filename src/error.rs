//! Error taxonomy (§7). Only two variants carry an `Error` value at all —
//! cache misses and cancellation are not errors, they fall out of the
//! reconciler's `Ok(Action::...)` control flow instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Transient hub API failure (conflict, timeout, rate-limit): requeue
    /// with backoff, never surfaced to the user.
    #[error("hub api error: {0}")]
    Hub(#[source] kube::Error),

    /// Patch computation failed to serialize — a programmer bug, not a
    /// cluster condition. Fatal for this reconcile; requeued so the key is
    /// retried once caches advance.
    #[error("failed to build status patch: {0}")]
    PatchBuild(#[source] serde_json::Error),
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        Error::Hub(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::PatchBuild(e)
    }
}
