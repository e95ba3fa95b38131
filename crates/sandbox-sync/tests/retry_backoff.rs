//! Retry and Failure Handling Tests
//!
//! Attempt ceiling, exponential backoff, phase-tagged terminal errors and
//! recovery from handlers that panic.

#![allow(clippy::unwrap_used, missing_docs)]

use assert_matches::assert_matches;
use sandbox_sync::{
    commit_fn, CommitError, PhaseError, PropagateError, RetryPolicy, SyncError, SyncOutcome,
    SyncPhase, SyncQueue, SyncQueueConfig, Version,
};
use sandbox_sync_testkit::{init_tracing, FailureScript, MemorySandbox, MemoryStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BASE_DELAY: Duration = Duration::from_millis(100);

fn queue() -> SyncQueue {
    init_tracing();
    let config = SyncQueueConfig::default().with_retry(
        RetryPolicy::exponential()
            .with_initial_delay(BASE_DELAY)
            .with_max_delay(Duration::from_secs(10)),
    );
    SyncQueue::new(config).unwrap()
}

// ============================================================================
// Commit failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn transient_commit_failures_recover_with_growing_backoff() {
    let queue = queue();
    let store = MemoryStore::new();
    let sandbox = MemorySandbox::new();
    store.fail_key("a", FailureScript::first(2));

    let outcome = queue
        .submit("a", "content", store.committer(), sandbox.propagator())
        .await;

    assert_eq!(
        outcome,
        Ok(SyncOutcome::Synced {
            version: Version::new(1)
        })
    );

    let calls = store.calls_for("a");
    assert_eq!(calls.len(), 3);
    let first_gap = calls[1].started_at - calls[0].started_at;
    let second_gap = calls[2].started_at - calls[1].started_at;
    assert!(first_gap >= BASE_DELAY && first_gap < BASE_DELAY * 2);
    assert!(second_gap >= BASE_DELAY * 2 && second_gap < BASE_DELAY * 3);

    // propagate runs exactly once, after the successful commit
    let propagated = sandbox.calls_for("a");
    assert_eq!(propagated.len(), 1);
    assert!(propagated[0].started_at >= calls[2].started_at);
    assert_eq!(propagated[0].version, Version::new(1));

    let metrics = queue.metrics();
    assert_eq!(metrics.commit_failures, 2);
    assert_eq!(metrics.retries, 2);
    assert_eq!(metrics.failed, 0);
}

#[tokio::test(start_paused = true)]
async fn permanent_commit_failure_exhausts_after_three_attempts() {
    let queue = queue();
    let store = MemoryStore::new();
    let sandbox = MemorySandbox::new();
    store.fail_all(FailureScript::always());

    let err = queue
        .submit("a", "content", store.committer(), sandbox.propagator())
        .await
        .unwrap_err();

    assert_matches!(
        &err,
        SyncError::RetriesExhausted {
            attempts: 3,
            last_error: PhaseError::Commit(CommitError::Unavailable { .. }),
            ..
        }
    );
    assert_eq!(err.key().as_str(), "a");
    assert!(err.to_string().contains("3 attempts"));

    assert_eq!(store.commit_count("a"), 3);
    assert_eq!(sandbox.propagate_count("a"), 0);
    assert_eq!(store.content("a"), None);
    queue.wait_idle().await;
    assert!(queue.is_idle());
}

// ============================================================================
// Propagate failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn propagate_failure_retries_from_commit() {
    let queue = queue();
    let store = MemoryStore::new();
    let sandbox = MemorySandbox::new();
    sandbox.fail_key("a", FailureScript::first(1));

    let outcome = queue
        .submit("a", "content", store.committer(), sandbox.propagator())
        .await
        .unwrap();

    assert_eq!(outcome.version(), Some(Version::new(2)));
    assert_eq!(store.commit_count("a"), 2);
    assert_eq!(sandbox.propagate_count("a"), 2);
    assert_eq!(sandbox.file_version("a"), Some(Version::new(2)));
    assert_eq!(queue.metrics().propagate_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn terminated_session_reports_saved_but_not_propagated() {
    let queue = queue();
    let store = MemoryStore::new();
    let sandbox = MemorySandbox::with_session("sbx-7");
    sandbox.terminate();

    let err = queue
        .submit("a", "content", store.committer(), sandbox.propagator())
        .await
        .unwrap_err();

    let last = err.last_error().unwrap();
    assert_eq!(last.phase(), SyncPhase::Propagate);
    assert_eq!(
        last,
        &PhaseError::Propagate(PropagateError::session_unavailable("sbx-7"))
    );

    // state was saved on every attempt, it just never reached the sandbox
    assert_eq!(store.version("a"), Some(Version::new(3)));
    assert_eq!(sandbox.file("a"), None);
}

#[tokio::test(start_paused = true)]
async fn mixed_phase_failures_share_one_budget() {
    let queue = queue();
    let store = MemoryStore::new();
    let sandbox = MemorySandbox::new();
    store.fail_key("a", FailureScript::sequence([true, false, true]));
    sandbox.fail_key("a", FailureScript::first(1));

    let err = queue
        .submit("a", "content", store.committer(), sandbox.propagator())
        .await
        .unwrap_err();

    // commit fails, propagate fails, commit fails: three attempts in total
    assert_matches!(
        err,
        SyncError::RetriesExhausted {
            attempts: 3,
            last_error: PhaseError::Commit(_),
            ..
        }
    );
    let metrics = queue.metrics();
    assert_eq!(metrics.commit_failures, 2);
    assert_eq!(metrics.propagate_failures, 1);
    assert_eq!(metrics.failed, 1);
}

// ============================================================================
// Lane progression after failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn newer_edit_runs_after_exhausted_one() {
    let queue = queue();
    let store = MemoryStore::new();
    let sandbox = MemorySandbox::new();
    store.fail_key("a", FailureScript::first(3));

    let stale = queue.submit("a", "stale", store.committer(), sandbox.propagator());
    tokio::time::sleep(Duration::from_millis(1)).await;
    let fresh = queue.submit("a", "fresh", store.committer(), sandbox.propagator());

    assert_matches!(stale.await, Err(SyncError::RetriesExhausted { attempts: 3, .. }));
    assert_eq!(
        fresh.await,
        Ok(SyncOutcome::Synced {
            version: Version::new(1)
        })
    );

    let payloads: Vec<_> = store
        .calls_for("a")
        .into_iter()
        .map(|call| call.payload.as_text().unwrap().to_string())
        .collect();
    assert_eq!(payloads, vec!["stale", "stale", "stale", "fresh"]);
    assert_eq!(sandbox.file("a").as_deref(), Some("fresh"));
}

#[tokio::test(start_paused = true)]
async fn panicking_commit_handler_counts_as_failed_attempt() {
    let queue = queue();
    let sandbox = MemorySandbox::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let commit = {
        let calls = Arc::clone(&calls);
        Arc::new(commit_fn(move |_key, _payload| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    panic!("disk on fire");
                }
                Ok::<_, CommitError>(Version::new(9))
            }
        }))
    };

    let outcome = queue
        .submit("a", "content", commit, sandbox.propagator())
        .await;

    assert_eq!(
        outcome,
        Ok(SyncOutcome::Synced {
            version: Version::new(9)
        })
    );
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(queue.metrics().commit_failures, 1);
    queue.wait_idle().await;
}

#[tokio::test(start_paused = true)]
async fn custom_attempt_ceiling_is_honored() {
    init_tracing();
    let config = SyncQueueConfig::for_testing()
        .with_retry(RetryPolicy::fixed(Duration::from_millis(5)).with_max_attempts(5));
    let queue = SyncQueue::new(config).unwrap();
    let store = MemoryStore::new();
    let sandbox = MemorySandbox::new();
    store.fail_all(FailureScript::always());

    let err = queue
        .submit("a", "content", store.committer(), sandbox.propagator())
        .await
        .unwrap_err();

    assert_matches!(err, SyncError::RetriesExhausted { attempts: 5, .. });
    assert_eq!(store.commit_count("a"), 5);
}
