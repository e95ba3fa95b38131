//! In-memory authoritative store.
//!
//! # Blocking Lock Usage
//!
//! Uses `parking_lot::Mutex` for the store state because the lock is only
//! taken for bookkeeping before and after the simulated latency, never
//! across an `.await`.

use crate::script::FailureScript;
use async_trait::async_trait;
use parking_lot::Mutex;
use sandbox_sync::{CommitEffects, CommitError, Payload, SyncKey, Version};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One recorded commit call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitCall {
    /// Key written
    pub key: SyncKey,
    /// Content written
    pub payload: Payload,
    /// When the call started
    pub started_at: Instant,
    /// Version assigned, if the write succeeded
    pub version: Option<Version>,
}

#[derive(Debug, Default)]
struct StoreState {
    records: HashMap<SyncKey, (Version, Payload)>,
    scripts: HashMap<SyncKey, FailureScript>,
    default_script: FailureScript,
    latency: Duration,
    calls: Vec<CommitCall>,
    in_flight: HashMap<SyncKey, usize>,
    max_in_flight: HashMap<SyncKey, usize>,
}

/// Authoritative store fake with per-key monotone versions
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Empty store that never fails and answers immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a round trip of `latency` on every commit
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state.lock().latency = latency;
        self
    }

    /// Script failures for one key
    pub fn fail_key(&self, key: impl Into<SyncKey>, script: FailureScript) {
        self.state.lock().scripts.insert(key.into(), script);
    }

    /// Script failures for every key without its own script
    pub fn fail_all(&self, script: FailureScript) {
        self.state.lock().default_script = script;
    }

    /// Handler to pass to `SyncQueue::submit`
    pub fn committer(&self) -> Arc<dyn CommitEffects> {
        Arc::new(self.clone())
    }

    /// Latest committed content for `key` as text
    pub fn content(&self, key: impl Into<SyncKey>) -> Option<String> {
        self.payload(key)
            .and_then(|payload| payload.as_text().map(str::to_string))
    }

    /// Latest committed payload for `key`
    pub fn payload(&self, key: impl Into<SyncKey>) -> Option<Payload> {
        self.state
            .lock()
            .records
            .get(&key.into())
            .map(|(_, payload)| payload.clone())
    }

    /// Latest committed version for `key`
    pub fn version(&self, key: impl Into<SyncKey>) -> Option<Version> {
        self.state
            .lock()
            .records
            .get(&key.into())
            .map(|(version, _)| *version)
    }

    /// Every commit call, in start order
    pub fn calls(&self) -> Vec<CommitCall> {
        self.state.lock().calls.clone()
    }

    /// Commit calls for one key, in start order
    pub fn calls_for(&self, key: impl Into<SyncKey>) -> Vec<CommitCall> {
        let key = key.into();
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.key == key)
            .cloned()
            .collect()
    }

    /// Number of commit calls made for `key`, failed or not
    pub fn commit_count(&self, key: impl Into<SyncKey>) -> usize {
        self.calls_for(key).len()
    }

    /// Highest number of overlapping commits observed for `key`
    pub fn max_concurrent(&self, key: impl Into<SyncKey>) -> usize {
        self.state
            .lock()
            .max_in_flight
            .get(&key.into())
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl CommitEffects for MemoryStore {
    async fn commit(&self, key: &SyncKey, payload: &Payload) -> Result<Version, CommitError> {
        let (latency, index) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let running = state.in_flight.entry(key.clone()).or_default();
            *running += 1;
            let running = *running;
            let peak = state.max_in_flight.entry(key.clone()).or_default();
            *peak = (*peak).max(running);
            state.calls.push(CommitCall {
                key: key.clone(),
                payload: payload.clone(),
                started_at: Instant::now(),
                version: None,
            });
            (state.latency, state.calls.len() - 1)
        };

        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Some(running) = state.in_flight.get_mut(key) {
            *running -= 1;
        }

        let fails = match state.scripts.get_mut(key) {
            Some(script) => script.next_fails(),
            None => state.default_script.next_fails(),
        };
        if fails {
            return Err(CommitError::unavailable(format!("store offline for {key}")));
        }

        let version = state
            .records
            .get(key)
            .map(|(version, _)| Version::new(version.value() + 1))
            .unwrap_or(Version::new(1));
        state.records.insert(key.clone(), (version, payload.clone()));
        state.calls[index].version = Some(version);
        Ok(version)
    }
}
