//! Lane drainer.
//!
//! One drainer runs per busy key. It repeatedly takes the lane's waiting
//! operation, commits it, propagates it, and resolves its caller. Failed
//! attempts are retried with backoff against the same operation; a newer
//! waiting operation is only looked at once the current one has succeeded
//! or exhausted its attempts. When the waiting slot is empty the lane is
//! removed from the map and the drainer exits.

use crate::effects::{CommitEffects, PropagateEffects};
use crate::errors::{CommitError, PhaseError, PhaseResult, PropagateError, SyncError};
use crate::lane::QueuedOperation;
use crate::queue::QueueInner;
use crate::retry::duration_ms;
use crate::types::{Operation, SyncKey, SyncOutcome, Version};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::Instrument;

/// Drain `key`'s lane until it is empty, then retire it.
///
/// The guard is armed before the future is first polled, so a drainer that
/// is dropped unpolled still releases its lane.
pub(crate) fn drain_lane(
    inner: Arc<QueueInner>,
    key: SyncKey,
) -> impl Future<Output = ()> + Send {
    let span = tracing::debug_span!("drain_lane", key = %key);
    let mut guard = DrainGuard::new(Arc::clone(&inner), key.clone());
    async move {
        while let Some(op) = take_next(&inner, &key) {
            run_operation(&inner, op).await;
        }
        guard.disarm();
    }
    .instrument(span)
}

/// Take the waiting operation, or retire the lane if there is none
fn take_next(inner: &QueueInner, key: &SyncKey) -> Option<QueuedOperation> {
    let mut lanes = inner.lanes.lock();
    let next = lanes.get_mut(key).and_then(|lane| lane.take_waiting());
    if next.is_none() {
        lanes.remove(key);
        tracing::debug!(key = %key, "lane drained");
        inner.notify_if_idle(&lanes);
    }
    next
}

/// Run one operation through commit and propagate until it succeeds or
/// runs out of attempts, then resolve its caller
async fn run_operation(inner: &QueueInner, op: QueuedOperation) {
    let QueuedOperation {
        mut record,
        commit,
        propagate,
        responder,
    } = op;
    let policy = &inner.config.retry;

    let result = loop {
        match attempt(&record, commit.as_ref(), propagate.as_ref()).await {
            Ok(version) => {
                inner.metrics.record_synced();
                tracing::debug!(
                    key = %record.key(),
                    %version,
                    attempts = record.attempt() + 1,
                    waited_ms = inner.now_ms().saturating_sub(record.enqueued_at_ms()),
                    "operation synced"
                );
                break Ok(SyncOutcome::Synced { version });
            }
            Err(error) => {
                match &error {
                    PhaseError::Commit(_) => inner.metrics.record_commit_failure(),
                    PhaseError::Propagate(_) => inner.metrics.record_propagate_failure(),
                }
                record = record.record_failure();
                let failures = record.attempt();

                if !policy.allows_retry(failures) {
                    inner.metrics.record_failed();
                    tracing::warn!(
                        key = %record.key(),
                        attempts = failures,
                        phase = ?error.phase(),
                        error = %error,
                        "operation failed, retries exhausted"
                    );
                    break Err(SyncError::RetriesExhausted {
                        key: record.key().clone(),
                        attempts: failures,
                        last_error: error,
                    });
                }

                let delay = policy.delay_for(failures);
                inner.metrics.record_retry();
                tracing::warn!(
                    key = %record.key(),
                    attempt = failures,
                    delay_ms = duration_ms(delay),
                    phase = ?error.phase(),
                    error = %error,
                    "sync attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    };

    let _ = responder.send(result);
}

/// One commit-then-propagate attempt. A panicking handler counts as a
/// failure of its phase.
async fn attempt(
    record: &Operation,
    commit: &dyn CommitEffects,
    propagate: &dyn PropagateEffects,
) -> PhaseResult<Version> {
    let key = record.key();
    let payload = record.payload();

    let version = AssertUnwindSafe(commit.commit(key, payload))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(CommitError::internal(panic_message(panic.as_ref()))))?;

    AssertUnwindSafe(propagate.propagate(key, payload, version))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(PropagateError::internal(panic_message(panic.as_ref()))))?;

    Ok(version)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {message}")
    } else if let Some(message) = panic.downcast_ref::<String>() {
        format!("handler panicked: {message}")
    } else {
        "handler panicked".to_string()
    }
}

/// Retires the lane if the drainer is dropped before it finishes, e.g.
/// when the runtime shuts down mid-attempt. The waiting caller is resolved
/// as abandoned; the in-flight caller observes its dropped responder.
struct DrainGuard {
    inner: Arc<QueueInner>,
    key: SyncKey,
    armed: bool,
}

impl DrainGuard {
    fn new(inner: Arc<QueueInner>, key: SyncKey) -> Self {
        Self {
            inner,
            key,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let waiting = {
            let mut lanes = self.inner.lanes.lock();
            let waiting = lanes
                .remove(&self.key)
                .and_then(|mut lane| lane.take_waiting());
            self.inner.notify_if_idle(&lanes);
            waiting
        };

        tracing::warn!(key = %self.key, "drainer stopped before lane was empty");
        if let Some(op) = waiting {
            self.inner.metrics.record_abandoned();
            op.resolve(Err(SyncError::Abandoned {
                key: self.key.clone(),
            }));
        }
    }
}
