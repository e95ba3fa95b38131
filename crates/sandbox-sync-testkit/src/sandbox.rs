//! In-memory remote sandbox.
//!
//! # Blocking Lock Usage
//!
//! Same discipline as the store fake: `parking_lot::Mutex`, never held
//! across the simulated latency.

use crate::script::FailureScript;
use async_trait::async_trait;
use parking_lot::Mutex;
use sandbox_sync::{Payload, PropagateEffects, PropagateError, SyncKey, Version};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// One recorded propagate call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagateCall {
    /// Key written
    pub key: SyncKey,
    /// Content written
    pub payload: Payload,
    /// Version the content was committed at
    pub version: Version,
    /// When the call started
    pub started_at: Instant,
    /// Whether the write landed in the sandbox
    pub succeeded: bool,
}

#[derive(Debug)]
struct SandboxState {
    session: String,
    terminated: bool,
    files: HashMap<SyncKey, (Version, Payload)>,
    scripts: HashMap<SyncKey, FailureScript>,
    default_script: FailureScript,
    latency: Duration,
    calls: Vec<PropagateCall>,
    in_flight: HashMap<SyncKey, usize>,
    max_in_flight: HashMap<SyncKey, usize>,
}

/// Remote execution environment fake holding the propagated files
#[derive(Debug, Clone)]
pub struct MemorySandbox {
    state: Arc<Mutex<SandboxState>>,
}

impl Default for MemorySandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySandbox {
    /// Live sandbox that never fails and answers immediately
    pub fn new() -> Self {
        Self::with_session("sandbox-test")
    }

    /// Live sandbox with a specific session identifier
    pub fn with_session(session: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SandboxState {
                session: session.into(),
                terminated: false,
                files: HashMap::new(),
                scripts: HashMap::new(),
                default_script: FailureScript::never(),
                latency: Duration::ZERO,
                calls: Vec::new(),
                in_flight: HashMap::new(),
                max_in_flight: HashMap::new(),
            })),
        }
    }

    /// Simulate a round trip of `latency` on every propagate
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

    /// Terminate the session; every later propagate fails
    pub fn terminate(&self) {
        self.state.lock().terminated = true;
    }

    /// Bring a terminated session back
    pub fn restart(&self) {
        self.state.lock().terminated = false;
    }

    /// Handler to pass to `SyncQueue::submit`
    pub fn propagator(&self) -> Arc<dyn PropagateEffects> {
        Arc::new(self.clone())
    }

    /// Content currently visible in the sandbox for `key`, as text
    pub fn file(&self, key: impl Into<SyncKey>) -> Option<String> {
        self.state
            .lock()
            .files
            .get(&key.into())
            .and_then(|(_, payload)| payload.as_text().map(str::to_string))
    }

    /// Version of the content visible in the sandbox for `key`
    pub fn file_version(&self, key: impl Into<SyncKey>) -> Option<Version> {
        self.state
            .lock()
            .files
            .get(&key.into())
            .map(|(version, _)| *version)
    }

    /// Every propagate call, in start order
    pub fn calls(&self) -> Vec<PropagateCall> {
        self.state.lock().calls.clone()
    }

    /// Propagate calls for one key, in start order
    pub fn calls_for(&self, key: impl Into<SyncKey>) -> Vec<PropagateCall> {
        let key = key.into();
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| call.key == key)
            .cloned()
            .collect()
    }

    /// Number of propagate calls made for `key`, failed or not
    pub fn propagate_count(&self, key: impl Into<SyncKey>) -> usize {
        self.calls_for(key).len()
    }

    /// Highest number of overlapping propagations observed for `key`
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
impl PropagateEffects for MemorySandbox {
    async fn propagate(
        &self,
        key: &SyncKey,
        payload: &Payload,
        version: Version,
    ) -> Result<(), PropagateError> {
        let (latency, index) = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let running = state.in_flight.entry(key.clone()).or_default();
            *running += 1;
            let running = *running;
            let peak = state.max_in_flight.entry(key.clone()).or_default();
            *peak = (*peak).max(running);
            state.calls.push(PropagateCall {
                key: key.clone(),
                payload: payload.clone(),
                version,
                started_at: Instant::now(),
                succeeded: false,
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

        if state.terminated {
            return Err(PropagateError::session_unavailable(state.session.clone()));
        }

        let fails = match state.scripts.get_mut(key) {
            Some(script) => script.next_fails(),
            None => state.default_script.next_fails(),
        };
        if fails {
            return Err(PropagateError::write_failed(format!(
                "could not write {key} in {}",
                state.session
            )));
        }

        state.files.insert(key.clone(), (version, payload.clone()));
        state.calls[index].succeeded = true;
        Ok(())
    }
}
