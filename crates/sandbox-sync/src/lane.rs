//! Per-key lane state.
//!
//! A lane holds at most one waiting operation. A newer submission replaces
//! the waiting one instead of queueing behind it, so memory per key stays
//! constant no matter how fast edits arrive.

use crate::effects::{CommitEffects, PropagateEffects};
use crate::errors::SyncError;
use crate::types::{Operation, SyncOutcome};
use std::sync::Arc;
use tokio::sync::oneshot;

/// Sending half of a submission's pending result
pub(crate) type Responder = oneshot::Sender<Result<SyncOutcome, SyncError>>;

/// An operation together with the handlers and responder its caller supplied
pub(crate) struct QueuedOperation {
    pub(crate) record: Operation,
    pub(crate) commit: Arc<dyn CommitEffects>,
    pub(crate) propagate: Arc<dyn PropagateEffects>,
    pub(crate) responder: Responder,
}

impl QueuedOperation {
    /// Deliver the final result; a caller that dropped its handle is ignored
    pub(crate) fn resolve(self, result: Result<SyncOutcome, SyncError>) {
        let _ = self.responder.send(result);
    }
}

impl std::fmt::Debug for QueuedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedOperation")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

/// Holding area for one key
#[derive(Debug, Default)]
pub(crate) struct Lane {
    waiting: Option<QueuedOperation>,
    draining: bool,
}

impl Lane {
    /// Install `op` as the waiting operation, returning the one it displaced
    pub(crate) fn replace_waiting(&mut self, op: QueuedOperation) -> Option<QueuedOperation> {
        self.waiting.replace(op)
    }

    /// Take the waiting operation to run it
    pub(crate) fn take_waiting(&mut self) -> Option<QueuedOperation> {
        self.waiting.take()
    }

    pub(crate) fn has_waiting(&self) -> bool {
        self.waiting.is_some()
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.draining
    }

    /// Mark the lane as draining. Returns `true` if it was idle, meaning
    /// the caller is responsible for starting the drainer.
    pub(crate) fn start_draining(&mut self) -> bool {
        !std::mem::replace(&mut self.draining, true)
    }
}
