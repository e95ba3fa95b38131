//! Effect traits supplied by callers.
//!
//! The queue does not own the authoritative store or the sandbox. Each
//! submission carries its own [`CommitEffects`] and [`PropagateEffects`]
//! handlers, so one queue can serve many projects and sessions. Plain async
//! closures can be adapted with [`commit_fn`] and [`propagate_fn`].

use crate::errors::{CommitError, PropagateError};
use crate::retry::duration_ms;
use crate::types::{Payload, SyncKey, Version};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Commit phase: write content to the authoritative store
#[async_trait]
pub trait CommitEffects: Send + Sync {
    /// Persist `payload` for `key` and return the authoritative version
    async fn commit(&self, key: &SyncKey, payload: &Payload) -> Result<Version, CommitError>;
}

/// Propagate phase: push committed content into the remote sandbox
#[async_trait]
pub trait PropagateEffects: Send + Sync {
    /// Make `payload` at `version` visible in the sandbox
    async fn propagate(
        &self,
        key: &SyncKey,
        payload: &Payload,
        version: Version,
    ) -> Result<(), PropagateError>;
}

#[async_trait]
impl<T: CommitEffects + ?Sized> CommitEffects for Arc<T> {
    async fn commit(&self, key: &SyncKey, payload: &Payload) -> Result<Version, CommitError> {
        (**self).commit(key, payload).await
    }
}

#[async_trait]
impl<T: PropagateEffects + ?Sized> PropagateEffects for Arc<T> {
    async fn propagate(
        &self,
        key: &SyncKey,
        payload: &Payload,
        version: Version,
    ) -> Result<(), PropagateError> {
        (**self).propagate(key, payload, version).await
    }
}

/// Commit handler backed by an async closure
pub struct CommitFn<F>(F);

/// Adapt `Fn(SyncKey, Payload) -> impl Future<Output = Result<Version, CommitError>>`
pub fn commit_fn<F, Fut>(f: F) -> CommitFn<F>
where
    F: Fn(SyncKey, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Version, CommitError>> + Send + 'static,
{
    CommitFn(f)
}

#[async_trait]
impl<F, Fut> CommitEffects for CommitFn<F>
where
    F: Fn(SyncKey, Payload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Version, CommitError>> + Send + 'static,
{
    async fn commit(&self, key: &SyncKey, payload: &Payload) -> Result<Version, CommitError> {
        (self.0)(key.clone(), payload.clone()).await
    }
}

/// Propagate handler backed by an async closure
pub struct PropagateFn<F>(F);

/// Adapt `Fn(SyncKey, Payload, Version) -> impl Future<Output = Result<(), PropagateError>>`
pub fn propagate_fn<F, Fut>(f: F) -> PropagateFn<F>
where
    F: Fn(SyncKey, Payload, Version) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PropagateError>> + Send + 'static,
{
    PropagateFn(f)
}

#[async_trait]
impl<F, Fut> PropagateEffects for PropagateFn<F>
where
    F: Fn(SyncKey, Payload, Version) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), PropagateError>> + Send + 'static,
{
    async fn propagate(
        &self,
        key: &SyncKey,
        payload: &Payload,
        version: Version,
    ) -> Result<(), PropagateError> {
        (self.0)(key.clone(), payload.clone(), version).await
    }
}

/// Wall-clock source used to stamp operations on submission
pub trait PhysicalClock: Send + Sync {
    /// Current Unix time in milliseconds
    fn now_ms(&self) -> u64;
}

/// Clock backed by the operating system
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl PhysicalClock for SystemClock {
    fn now_ms(&self) -> u64 {
        duration_ms(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or(Duration::ZERO),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closure_adapters_forward_arguments() {
        let commit = commit_fn(|key: SyncKey, payload: Payload| async move {
            Ok::<_, CommitError>(Version::new(
                key.as_str().len() as u64 + payload.len() as u64,
            ))
        });
        let version = commit
            .commit(&SyncKey::from("a.rs"), &Payload::from("xyz"))
            .await
            .unwrap();
        assert_eq!(version, Version::new(7));

        let propagate = propagate_fn(|_key, _payload, version: Version| async move {
            if version.value() == 7 {
                Ok(())
            } else {
                Err(PropagateError::write_failed("unexpected version"))
            }
        });
        let shared: Arc<dyn PropagateEffects> = Arc::new(propagate);
        shared
            .propagate(&SyncKey::from("a.rs"), &Payload::from("xyz"), version)
            .await
            .unwrap();
    }

    #[test]
    fn system_clock_is_past_epoch() {
        assert!(SystemClock.now_ms() > 0);
    }
}
