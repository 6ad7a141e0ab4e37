//! The single "try remote under a deadline, otherwise local" control flow
//! that every entity family goes through.

use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use crate::auth::UserId;
use crate::coordinator::breaker::{CircuitBreaker, RemoteFailure};
use crate::coordinator::{EntityFamily, SyncCoordinator, SyncError};
use crate::local::{LocalStore, LocalStoreResult};
use crate::remote::{Document, RemotePath, RemoteResult, RemoteStore};

/// Remote store plus the user it is scoped to for this call.
pub(crate) struct RemoteTarget {
    pub store: Arc<dyn RemoteStore>,
    pub user: UserId,
}

impl RemoteTarget {
    pub fn user_collection(&self, name: &str) -> RemotePath {
        RemotePath::user_collection(self.user.as_str(), name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SkipReason {
    NoRemote,
    SignedOut,
    Guest,
    BreakerOpen,
}

pub(crate) enum RemoteOutcome<T> {
    Done(T),
    Skipped(SkipReason),
    Failed(RemoteFailure),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MirrorPolicy {
    /// Write locally even when the remote write succeeded.
    Always,
    OnRemoteFailure,
}

pub(crate) enum ReadPolicy<T> {
    /// A successful remote read is returned as-is, empty or not.
    TrustRemote,
    /// Read locally when the remote answer satisfies the predicate.
    LocalIfEmpty(fn(&T) -> bool),
}

impl SyncCoordinator {
    pub(crate) fn remote_target(&self) -> Result<RemoteTarget, SkipReason> {
        let store = self.remote.as_ref().ok_or(SkipReason::NoRemote)?;
        let user = self.auth.current_user().ok_or(SkipReason::SignedOut)?;
        if user.is_guest() {
            return Err(SkipReason::Guest);
        }
        if self.breaker.is_open() {
            return Err(SkipReason::BreakerOpen);
        }

        Ok(RemoteTarget {
            store: Arc::clone(store),
            user,
        })
    }

    /// Runs `op` against the remote store if it is usable, bounded by the
    /// configured timeout. Never retries.
    pub(crate) async fn attempt_remote<T, F, Fut>(&self, family: EntityFamily, op: F) -> RemoteOutcome<T>
    where
        F: FnOnce(RemoteTarget) -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let target = match self.remote_target() {
            Ok(target) => target,
            Err(reason) => {
                tracing::trace!(family = family.as_str(), ?reason, "remote skipped");
                return RemoteOutcome::Skipped(reason);
            }
        };

        match tokio::time::timeout(self.remote_timeout, op(target)).await {
            Ok(Ok(value)) => RemoteOutcome::Done(value),
            Ok(Err(err)) => RemoteOutcome::Failed(self.note_failure(family, RemoteFailure::classify(err))),
            Err(_) => RemoteOutcome::Failed(self.note_failure(family, RemoteFailure::Timeout(self.remote_timeout))),
        }
    }

    pub(crate) fn note_failure(&self, family: EntityFamily, failure: RemoteFailure) -> RemoteFailure {
        record_failure(&self.breaker, self.clock.now_ms(), family, &failure);
        failure
    }

    pub(crate) async fn write_with_fallback<F, Fut, L>(
        &self,
        family: EntityFamily,
        mirror: MirrorPolicy,
        remote_op: F,
        local_op: L,
    ) -> Result<(), SyncError>
    where
        F: FnOnce(RemoteTarget) -> Fut,
        Fut: Future<Output = RemoteResult<()>>,
        L: FnOnce(&LocalStore) -> LocalStoreResult<()>,
    {
        match self.attempt_remote(family, remote_op).await {
            RemoteOutcome::Done(()) => {
                if mirror == MirrorPolicy::Always {
                    if let Err(err) = local_op(&self.local) {
                        tracing::warn!(family = family.as_str(), error = %err, "local mirror write failed");
                    }
                }
                Ok(())
            }
            RemoteOutcome::Skipped(_) | RemoteOutcome::Failed(_) => local_op(&self.local).map_err(|err| {
                tracing::error!(family = family.as_str(), error = %err, "local write failed; change not persisted");
                SyncError::Local(err)
            }),
        }
    }

    pub(crate) async fn read_with_fallback<T, F, Fut, L>(
        &self,
        family: EntityFamily,
        policy: ReadPolicy<T>,
        remote_op: F,
        local_op: L,
    ) -> Result<T, SyncError>
    where
        F: FnOnce(RemoteTarget) -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
        L: FnOnce(&LocalStore) -> LocalStoreResult<T>,
    {
        if let RemoteOutcome::Done(value) = self.attempt_remote(family, remote_op).await {
            match policy {
                ReadPolicy::LocalIfEmpty(is_empty) if is_empty(&value) => {
                    tracing::trace!(family = family.as_str(), "remote returned nothing, checking local");
                }
                _ => return Ok(value),
            }
        }

        local_op(&self.local).map_err(|err| {
            tracing::error!(family = family.as_str(), error = %err, "local read failed");
            SyncError::Local(err)
        })
    }
}

/// Trips the breaker on permission failures and tallies the rest.
pub(crate) fn record_failure(breaker: &CircuitBreaker, now_ms: i64, family: EntityFamily, failure: &RemoteFailure) {
    match failure {
        RemoteFailure::Permission(err) => {
            if breaker.trip(&err.to_string(), now_ms) {
                tracing::warn!(
                    family = family.as_str(),
                    error = %err,
                    "remote permission denied; using local store for the rest of the session"
                );
            }
        }
        RemoteFailure::Timeout(_) | RemoteFailure::Transient(_) => {
            breaker.record_transient(failure, now_ms);
            tracing::debug!(family = family.as_str(), error = %failure, "remote unavailable, falling back to local");
        }
    }
}

/// Decodes query results, skipping documents that do not match the record shape.
pub(crate) fn decode_all<T: DeserializeOwned>(docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode() {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!(path = %doc.path, error = %err, "skipping malformed remote document");
                None
            }
        })
        .collect()
}
