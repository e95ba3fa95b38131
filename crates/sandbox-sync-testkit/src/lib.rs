//! Sandbox Sync Testing Infrastructure
//!
//! In-memory stand-ins for the two collaborators a sync queue talks to:
//! [`MemoryStore`] plays the authoritative record store and
//! [`MemorySandbox`] plays the remote execution environment. Both record
//! every call, can be scripted to fail, and can simulate latency with
//! `tokio::time::sleep` so tests under a paused clock stay deterministic.
//!
//! # Usage
//!
//! ```rust,no_run
//! use sandbox_sync::{SyncQueue, SyncQueueConfig};
//! use sandbox_sync_testkit::{MemorySandbox, MemoryStore};
//!
//! # async fn example() {
//! let queue = SyncQueue::new(SyncQueueConfig::for_testing()).unwrap();
//! let store = MemoryStore::new();
//! let sandbox = MemorySandbox::new();
//!
//! queue
//!     .submit("index.html", "<h1>hi</h1>", store.committer(), sandbox.propagator())
//!     .await
//!     .unwrap();
//! assert_eq!(store.content("index.html").as_deref(), Some("<h1>hi</h1>"));
//! # }
//! ```

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

pub mod sandbox;
pub mod script;
pub mod store;

pub use sandbox::{MemorySandbox, PropagateCall};
pub use script::FailureScript;
pub use store::{CommitCall, MemoryStore};

/// Install a test subscriber once per process.
///
/// Honors `RUST_LOG`; repeated calls from different tests are harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
