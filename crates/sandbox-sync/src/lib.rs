//! Sandbox Sync: per-key sequential synchronization queue
//!
//! Mirrors a rapid stream of file edits into a remote execution sandbox.
//! Every submission names a key (a file path), the desired content, and two
//! caller-supplied handlers: a commit phase that writes to the authoritative
//! store and returns a version, and a propagate phase that pushes the
//! committed content into the sandbox.
//!
//! # Guarantees
//!
//! - **Single flight per key**: at most one commit/propagate cycle runs for
//!   a key at any time; different keys proceed in parallel.
//! - **Latest wins**: each key holds at most one waiting operation. A newer
//!   submission replaces it and the replaced caller is told
//!   [`SyncOutcome::Superseded`].
//! - **Bounded retries**: failed attempts are retried with backoff up to
//!   [`RetryPolicy::max_attempts`] (three by default), then reported as
//!   [`SyncError::RetriesExhausted`] without blocking other keys.
//! - **Every submission resolves**: each [`PendingSync`] completes exactly
//!   once.
//!
//! # Usage
//!
//! ```rust,no_run
//! use sandbox_sync::{commit_fn, propagate_fn, SyncQueue, SyncQueueConfig, Version};
//! use sandbox_sync::{CommitError, PropagateError};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = SyncQueue::new(SyncQueueConfig::default())?;
//!
//! let commit = Arc::new(commit_fn(|_key, _payload| async {
//!     Ok::<_, CommitError>(Version::new(1))
//! }));
//! let propagate = Arc::new(propagate_fn(|_key, _payload, _version| async {
//!     Ok::<_, PropagateError>(())
//! }));
//!
//! let outcome = queue
//!     .submit("src/App.tsx", "export default App;", commit, propagate)
//!     .await?;
//! println!("synced at {:?}", outcome.version());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod effects;
pub mod errors;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod types;

mod drainer;
mod lane;

pub use config::SyncQueueConfig;
pub use effects::{
    commit_fn, propagate_fn, CommitEffects, CommitFn, PhysicalClock, PropagateEffects,
    PropagateFn, SystemClock,
};
pub use errors::{CommitError, PhaseError, PropagateError, QueueError, SyncError, SyncPhase};
pub use metrics::MetricsSnapshot;
pub use queue::{PendingSync, QueueStatus, SyncQueue, SyncQueueBuilder};
pub use retry::{BackoffStrategy, RetryPolicy};
pub use types::{Operation, Payload, SyncKey, SyncOutcome, Version};
