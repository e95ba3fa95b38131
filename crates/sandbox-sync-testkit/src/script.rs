//! Scripted failure injection shared by the fakes.

use std::collections::VecDeque;

/// Decides, call by call, whether a fake should fail.
///
/// Explicit per-call decisions are consumed first; once they run out the
/// fallback applies to every later call.
#[derive(Debug, Clone, Default)]
pub struct FailureScript {
    upcoming: VecDeque<bool>,
    fail_after_script: bool,
}

impl FailureScript {
    /// Never fail
    pub fn never() -> Self {
        Self::default()
    }

    /// Fail every call
    pub fn always() -> Self {
        Self {
            upcoming: VecDeque::new(),
            fail_after_script: true,
        }
    }

    /// Fail the next `count` calls, then succeed
    pub fn first(count: usize) -> Self {
        Self {
            upcoming: std::iter::repeat(true).take(count).collect(),
            fail_after_script: false,
        }
    }

    /// Explicit outcomes for the next calls (`true` = fail), then succeed
    pub fn sequence(outcomes: impl IntoIterator<Item = bool>) -> Self {
        Self {
            upcoming: outcomes.into_iter().collect(),
            fail_after_script: false,
        }
    }

    /// Consume the decision for the next call
    pub fn next_fails(&mut self) -> bool {
        self.upcoming.pop_front().unwrap_or(self.fail_after_script)
    }
}
