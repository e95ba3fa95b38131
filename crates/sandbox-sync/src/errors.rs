//! Error types for the commit and propagate phases and for the queue itself.
//!
//! Commit and propagate failures share one retry budget but stay distinct
//! all the way to the caller, so a terminal failure still tells "state not
//! saved" apart from "saved but not reflected in the sandbox".

use crate::types::SyncKey;
use serde::{Deserialize, Serialize};

/// Failure of the commit phase (write to the authoritative store)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum CommitError {
    /// The store refused the write
    #[error("Store rejected write: {message}")]
    Rejected {
        /// Reason reported by the store
        message: String,
    },

    /// The store could not be reached
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Underlying transport failure
        message: String,
    },

    /// The commit handler failed internally
    #[error("Commit handler error: {message}")]
    Internal {
        /// Error message describing the internal failure
        message: String,
    },
}

impl CommitError {
    /// Create a rejected-write error
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Create an unreachable-store error
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Failure of the propagate phase (write into the remote sandbox)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PropagateError {
    /// The sandbox accepted the call but the file write failed
    #[error("Sandbox write failed: {message}")]
    WriteFailed {
        /// Reason reported by the sandbox
        message: String,
    },

    /// The target sandbox session is missing or terminated
    #[error("Sandbox session unavailable: {session}")]
    SessionUnavailable {
        /// Identifier of the missing session
        session: String,
    },

    /// The network call to the sandbox failed
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// The propagate handler failed internally
    #[error("Propagate handler error: {message}")]
    Internal {
        /// Error message describing the internal failure
        message: String,
    },
}

impl PropagateError {
    /// Create a failed-write error
    pub fn write_failed(message: impl Into<String>) -> Self {
        Self::WriteFailed {
            message: message.into(),
        }
    }

    /// Create a missing-session error
    pub fn session_unavailable(session: impl Into<String>) -> Self {
        Self::SessionUnavailable {
            session: session.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Which phase of a sync attempt failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    /// Writing to the authoritative store
    Commit,
    /// Pushing committed content into the sandbox
    Propagate,
}

/// A single failed attempt, tagged with its phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum PhaseError {
    /// State was not saved
    #[error("commit failed: {0}")]
    Commit(#[from] CommitError),

    /// State was saved but not reflected in the sandbox
    #[error("propagate failed: {0}")]
    Propagate(#[from] PropagateError),
}

impl PhaseError {
    /// Phase the failure happened in
    pub fn phase(&self) -> SyncPhase {
        match self {
            PhaseError::Commit(_) => SyncPhase::Commit,
            PhaseError::Propagate(_) => SyncPhase::Propagate,
        }
    }

    /// Whether the authoritative write failed
    pub fn is_commit(&self) -> bool {
        matches!(self, PhaseError::Commit(_))
    }

    /// Whether the write succeeded but propagation failed
    pub fn is_propagate(&self) -> bool {
        matches!(self, PhaseError::Propagate(_))
    }
}

/// Terminal failure delivered through a submission's pending result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum SyncError {
    /// Every allowed attempt failed
    #[error("Sync of '{key}' failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Key whose operation failed
        key: SyncKey,
        /// Number of attempts made
        attempts: u32,
        /// Failure of the final attempt
        #[source]
        last_error: PhaseError,
    },

    /// The drainer was torn down before the operation resolved
    #[error("Sync of '{key}' was abandoned before completion")]
    Abandoned {
        /// Key whose operation was abandoned
        key: SyncKey,
    },
}

impl SyncError {
    /// Key the failure belongs to
    pub fn key(&self) -> &SyncKey {
        match self {
            SyncError::RetriesExhausted { key, .. } | SyncError::Abandoned { key } => key,
        }
    }

    /// Underlying phase failure, if retries were exhausted
    pub fn last_error(&self) -> Option<&PhaseError> {
        match self {
            SyncError::RetriesExhausted { last_error, .. } => Some(last_error),
            SyncError::Abandoned { .. } => None,
        }
    }
}

/// Errors constructing or configuring a queue
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No tokio runtime available to spawn drainers onto
    #[error("No tokio runtime available: {message}")]
    NoRuntime {
        /// Reason reported by tokio
        message: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {message}")]
    Config {
        /// Description of the invalid value
        message: String,
    },

    /// Configuration file could not be read
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl QueueError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result of a single sync attempt
pub type PhaseResult<T> = std::result::Result<T, PhaseError>;
