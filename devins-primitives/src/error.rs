//! Shared error definitions for DevIns primitives.

use std::path::PathBuf;

use thiserror::Error;
use uuid::Error as UuidError;

/// Result alias used throughout the DevIns runtime.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while manipulating primitive types.
#[derive(Debug, Error)]
pub enum Error {
    /// The provided session identifier could not be parsed.
    #[error("invalid session id: {source}")]
    InvalidSessionId {
        /// Source parsing error from the UUID library.
        #[from]
        source: UuidError,
    },

    /// Tool name failed validation.
    #[error("invalid tool name `{name}`: {reason}")]
    InvalidToolName {
        /// The offending tool name.
        name: String,
        /// Human-readable reason for rejection.
        reason: String,
    },
}

/// Errors surfaced by workspace collaborators (filesystem, VCS, processes).
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// No workspace root is bound to the current session.
    #[error("no workspace root is bound")]
    NoWorkspace,

    /// The requested path does not exist.
    #[error("path not found: {}", path.display())]
    NotFound {
        /// Path that could not be located.
        path: PathBuf,
    },

    /// The requested path resolves outside of the workspace root.
    #[error("path escapes the workspace root: {}", path.display())]
    OutsideWorkspace {
        /// Offending path.
        path: PathBuf,
    },

    /// Underlying I/O failure.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },

    /// A spawned process failed or could not be started.
    #[error("process error: {reason}")]
    Process {
        /// Human-readable reason describing the failure.
        reason: String,
    },

    /// A bounded operation exceeded its deadline.
    #[error("{operation} timed out after {millis}ms")]
    Timeout {
        /// Operation that timed out.
        operation: String,
        /// Deadline in milliseconds.
        millis: u128,
    },

    /// Version control provider failure.
    #[error("vcs error: {reason}")]
    Vcs {
        /// Human-readable reason describing the failure.
        reason: String,
    },
}

impl WorkspaceError {
    /// Creates a process error from the supplied reason.
    #[must_use]
    pub fn process(reason: impl Into<String>) -> Self {
        Self::Process {
            reason: reason.into(),
        }
    }

    /// Creates a VCS error from the supplied reason.
    #[must_use]
    pub fn vcs(reason: impl Into<String>) -> Self {
        Self::Vcs {
            reason: reason.into(),
        }
    }
}

/// Result alias for collaborator operations.
pub type WorkspaceResult<T> = std::result::Result<T, WorkspaceError>;
