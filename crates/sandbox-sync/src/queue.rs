//! Queue coordinator.
//!
//! [`SyncQueue`] owns the key → lane map, accepts submissions, supersedes
//! waiting operations and starts one drainer per busy key.
//!
//! # Blocking Lock Usage
//!
//! The lane map sits behind a `parking_lot::Mutex` because:
//! 1. Critical sections are O(1) map edits (create lane, swap the waiting
//!    slot, retire a drained lane) plus an O(n) scan for [`SyncQueue::status`]
//! 2. The lock is never held across `.await` points, so commit and propagate
//!    calls for different keys never wait on each other
//! 3. Superseded callers are resolved after the lock is released

use crate::config::SyncQueueConfig;
use crate::drainer;
use crate::effects::{CommitEffects, PhysicalClock, PropagateEffects, SystemClock};
use crate::errors::{QueueError, SyncError};
use crate::lane::{Lane, QueuedOperation};
use crate::metrics::{MetricsSnapshot, QueueMetrics};
use crate::types::{Operation, Payload, SyncKey, SyncOutcome};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};

/// State shared between the queue handle and its drainers
pub(crate) struct QueueInner {
    pub(crate) lanes: Mutex<HashMap<SyncKey, Lane>>,
    pub(crate) config: SyncQueueConfig,
    pub(crate) metrics: QueueMetrics,
    pub(crate) idle: Notify,
    clock: Arc<dyn PhysicalClock>,
    runtime: Handle,
}

impl QueueInner {
    /// Start a drainer for `key` on the queue's runtime
    fn spawn_drainer(self: &Arc<Self>, key: SyncKey) {
        let inner = Arc::clone(self);
        self.runtime.spawn(drainer::drain_lane(inner, key));
    }

    /// Current time on the queue's clock, in Unix milliseconds
    pub(crate) fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Wake `wait_idle` callers if no lane is left
    pub(crate) fn notify_if_idle(&self, lanes: &HashMap<SyncKey, Lane>) {
        if lanes.is_empty() {
            self.idle.notify_waiters();
        }
    }
}

/// Per-key sequential synchronization queue.
///
/// Cloning is cheap and every clone drives the same lanes. Drainers keep the
/// shared state alive until their lane is empty, so dropping the last handle
/// does not cut off in-flight work.
#[derive(Clone)]
pub struct SyncQueue {
    inner: Arc<QueueInner>,
}

impl SyncQueue {
    /// Create a queue bound to the current tokio runtime
    pub fn new(config: SyncQueueConfig) -> Result<Self, QueueError> {
        Self::builder().with_config(config).build()
    }

    /// Create a queue builder
    pub fn builder() -> SyncQueueBuilder {
        SyncQueueBuilder::default()
    }

    /// Submit the desired content for `key`.
    ///
    /// Never blocks. If an older submission for `key` is still waiting it is
    /// resolved as [`SyncOutcome::Superseded`] and replaced; an operation that
    /// is already committing or propagating is left to finish first.
    pub fn submit(
        &self,
        key: impl Into<SyncKey>,
        payload: impl Into<Payload>,
        commit: Arc<dyn CommitEffects>,
        propagate: Arc<dyn PropagateEffects>,
    ) -> PendingSync {
        let key = key.into();
        let (responder, receiver) = oneshot::channel();
        let record = Operation::new(key.clone(), payload.into(), self.inner.now_ms());
        let queued = QueuedOperation {
            record,
            commit,
            propagate,
            responder,
        };
        self.inner.metrics.record_submitted();

        let (displaced, start_drainer) = {
            let mut lanes = self.inner.lanes.lock();
            let lane = lanes.entry(key.clone()).or_insert_with(|| {
                tracing::debug!(key = %key, "lane created");
                Lane::default()
            });
            let displaced = lane.replace_waiting(queued);
            (displaced, lane.start_draining())
        };

        if let Some(old) = displaced {
            self.inner.metrics.record_superseded();
            tracing::debug!(
                key = %key,
                enqueued_at_ms = old.record.enqueued_at_ms(),
                "waiting operation superseded"
            );
            old.resolve(Ok(SyncOutcome::Superseded));
        }

        if start_drainer {
            self.inner.spawn_drainer(key.clone());
        }

        PendingSync::new(key, receiver)
    }

    /// Point-in-time view of waiting and draining keys. Read-only.
    pub fn status(&self) -> QueueStatus {
        let lanes = self.inner.lanes.lock();
        let mut status = QueueStatus::default();
        for (key, lane) in lanes.iter() {
            if lane.has_waiting() {
                status.waiting_keys.insert(key.clone());
                status.total_waiting += 1;
            }
            if lane.is_draining() {
                status.draining_keys.insert(key.clone());
            }
        }
        status
    }

    /// Snapshot of the queue counters
    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Number of keys with outstanding or in-flight work
    pub fn lane_count(&self) -> usize {
        self.inner.lanes.lock().len()
    }

    /// Whether no key has outstanding or in-flight work
    pub fn is_idle(&self) -> bool {
        self.inner.lanes.lock().is_empty()
    }

    /// Wait until every lane has drained
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    /// Active configuration
    pub fn config(&self) -> &SyncQueueConfig {
        &self.inner.config
    }
}

impl std::fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncQueue")
            .field("config", &self.inner.config)
            .field("lanes", &self.lane_count())
            .finish_non_exhaustive()
    }
}

/// Builder for [`SyncQueue`]
#[derive(Default)]
pub struct SyncQueueBuilder {
    config: Option<SyncQueueConfig>,
    clock: Option<Arc<dyn PhysicalClock>>,
    handle: Option<Handle>,
}

impl SyncQueueBuilder {
    /// Set configuration
    pub fn with_config(mut self, config: SyncQueueConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the clock used to stamp submissions
    pub fn with_clock(mut self, clock: Arc<dyn PhysicalClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Spawn drainers onto `handle` instead of the current runtime
    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    /// Build the queue
    pub fn build(self) -> Result<SyncQueue, QueueError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let runtime = match self.handle {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|e| QueueError::NoRuntime {
                message: e.to_string(),
            })?,
        };

        Ok(SyncQueue {
            inner: Arc::new(QueueInner {
                lanes: Mutex::new(HashMap::new()),
                config,
                metrics: QueueMetrics::default(),
                idle: Notify::new(),
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                runtime,
            }),
        })
    }
}

/// Point-in-time view of the queue, for operational visibility
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    /// Keys whose waiting slot is occupied
    pub waiting_keys: BTreeSet<SyncKey>,
    /// Keys with an active drainer
    pub draining_keys: BTreeSet<SyncKey>,
    /// Waiting operations across all keys
    pub total_waiting: usize,
}

impl QueueStatus {
    /// Whether nothing is waiting or draining
    pub fn is_empty(&self) -> bool {
        self.waiting_keys.is_empty() && self.draining_keys.is_empty()
    }
}

/// Pending result of a submission.
///
/// Resolves exactly once: [`SyncOutcome::Synced`] after commit and propagate
/// succeed, [`SyncOutcome::Superseded`] if a newer submission replaced this
/// one before it started, or a [`SyncError`]. Dropping it does not cancel
/// the operation.
#[must_use = "dropping a PendingSync discards the outcome, not the operation"]
#[derive(Debug)]
pub struct PendingSync {
    key: SyncKey,
    receiver: oneshot::Receiver<Result<SyncOutcome, SyncError>>,
    resolved: Option<Result<SyncOutcome, SyncError>>,
}

impl PendingSync {
    fn new(key: SyncKey, receiver: oneshot::Receiver<Result<SyncOutcome, SyncError>>) -> Self {
        Self {
            key,
            receiver,
            resolved: None,
        }
    }

    /// Key this submission targets
    pub fn key(&self) -> &SyncKey {
        &self.key
    }

    /// Outcome if already resolved, without waiting. Once an outcome has
    /// been observed, every later call and `.await` returns the same one.
    pub fn try_outcome(&mut self) -> Option<Result<SyncOutcome, SyncError>> {
        if self.resolved.is_none() {
            let result = match self.receiver.try_recv() {
                Ok(result) => result,
                Err(oneshot::error::TryRecvError::Empty) => return None,
                Err(oneshot::error::TryRecvError::Closed) => Err(self.abandoned()),
            };
            self.resolved = Some(result);
        }
        self.resolved.clone()
    }

    fn abandoned(&self) -> SyncError {
        SyncError::Abandoned {
            key: self.key.clone(),
        }
    }
}

impl Future for PendingSync {
    type Output = Result<SyncOutcome, SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        if let Some(result) = &this.resolved {
            return Poll::Ready(result.clone());
        }

        let result = match Pin::new(&mut this.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => result,
            Poll::Ready(Err(_)) => Err(this.abandoned()),
            Poll::Pending => return Poll::Pending,
        };
        this.resolved = Some(result.clone());
        Poll::Ready(result)
    }
}
