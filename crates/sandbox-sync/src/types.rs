//! Identifiers and value types carried through the queue.
//!
//! A [`SyncKey`] partitions independent lanes (a file path in the editor),
//! a [`Payload`] is the desired content for that key, and a [`Version`] is
//! the authoritative version number returned by the commit phase.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Key identifying an independent sequential lane
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncKey(String);

impl SyncKey {
    /// Create a key from anything string-like
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SyncKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for SyncKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for SyncKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Content payload for a key.
///
/// Cloning is cheap: the bytes are reference counted, so a retried attempt
/// hands the same buffer to every commit and propagate call.
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Bytes);

impl Payload {
    /// Wrap raw bytes
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Raw bytes of the payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Interpret the payload as UTF-8 text, if it is valid
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.0).ok()
    }

    /// Consume the payload, returning the underlying buffer
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_text() {
            Some(text) if text.len() <= 64 => write!(f, "Payload({text:?})"),
            _ => write!(f, "Payload({} bytes)", self.0.len()),
        }
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Self(Bytes::copy_from_slice(value.as_bytes()))
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl From<&[u8]> for Payload {
    fn from(value: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(value))
    }
}

impl From<Bytes> for Payload {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

/// Authoritative version number assigned by the commit phase
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Create a version from its raw number
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw version number
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// One desired state transition for a key.
///
/// Records are never edited in place by a newer submission; a superseding
/// edit builds a fresh record. Only the drainer that owns a record advances
/// its attempt counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    key: SyncKey,
    payload: Payload,
    attempt: u32,
    enqueued_at_ms: u64,
}

impl Operation {
    /// Create a fresh record with `attempt = 0`
    pub fn new(key: SyncKey, payload: Payload, enqueued_at_ms: u64) -> Self {
        Self {
            key,
            payload,
            attempt: 0,
            enqueued_at_ms,
        }
    }

    /// Key this operation targets
    pub fn key(&self) -> &SyncKey {
        &self.key
    }

    /// Desired content
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Number of failed attempts so far
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Submission time in Unix milliseconds
    pub fn enqueued_at_ms(&self) -> u64 {
        self.enqueued_at_ms
    }

    /// Record one more failed attempt
    pub(crate) fn record_failure(mut self) -> Self {
        self.attempt = self.attempt.saturating_add(1);
        self
    }
}

/// Successful resolution of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Content committed at `version` and propagated to the sandbox
    Synced {
        /// Authoritative version returned by the commit phase
        version: Version,
    },
    /// Replaced by a newer submission for the same key before it started.
    ///
    /// Carries no version: this submission's content never reached the
    /// store, the newer submission commits its own.
    Superseded,
}

impl SyncOutcome {
    /// Committed version, or `None` for a superseded submission
    pub fn version(&self) -> Option<Version> {
        match self {
            SyncOutcome::Synced { version } => Some(*version),
            SyncOutcome::Superseded => None,
        }
    }

    /// Whether this submission was replaced by a newer one
    pub fn is_superseded(&self) -> bool {
        matches!(self, SyncOutcome::Superseded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_debug_shows_short_text() {
        let payload = Payload::from("hello");
        assert_eq!(format!("{payload:?}"), "Payload(\"hello\")");

        let binary = Payload::from(vec![0xff, 0xfe, 0x00]);
        assert_eq!(format!("{binary:?}"), "Payload(3 bytes)");
    }

    #[test]
    fn operation_failure_advances_attempt_only() {
        let op = Operation::new(SyncKey::from("src/main.rs"), Payload::from("fn main() {}"), 42);
        let failed = op.clone().record_failure().record_failure();

        assert_eq!(failed.attempt(), 2);
        assert_eq!(failed.key(), op.key());
        assert_eq!(failed.payload(), op.payload());
        assert_eq!(failed.enqueued_at_ms(), 42);
        assert_eq!(op.attempt(), 0);
    }

    #[test]
    fn superseded_outcome_has_no_version() {
        assert_eq!(SyncOutcome::Superseded.version(), None);
        assert!(SyncOutcome::Superseded.is_superseded());

        let synced = SyncOutcome::Synced {
            version: Version::new(7),
        };
        assert_eq!(synced.version(), Some(Version::new(7)));
        assert!(!synced.is_superseded());
    }

    #[test]
    fn sync_key_orders_lexically() {
        let mut keys = vec![SyncKey::from("b.ts"), SyncKey::from("a.ts")];
        keys.sort();
        assert_eq!(keys[0].as_str(), "a.ts");
        assert_eq!(keys[1].to_string(), "b.ts");
    }
}
