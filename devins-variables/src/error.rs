//! Error types for variable resolution.

use devins_primitives::WorkspaceError;
use thiserror::Error;

/// Errors raised by individual resolvers. The chain turns these into warnings.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A collaborator call failed.
    #[error("workspace error: {source}")]
    Workspace {
        /// Source [`WorkspaceError`].
        #[from]
        source: WorkspaceError,
    },
    /// A pipeline pattern failed to compile.
    #[error("invalid pattern: {source}")]
    Pattern {
        /// Source [`regex::Error`].
        #[from]
        source: regex::Error,
    },
    /// A pipeline definition could not be parsed.
    #[error("invalid pipeline: {reason}")]
    InvalidPipeline {
        /// Human-readable reason.
        reason: String,
    },
    /// The resolver claimed a name it cannot currently produce.
    #[error("variable `{name}` is unavailable: {reason}")]
    Unavailable {
        /// Variable name.
        name: String,
        /// Human-readable reason.
        reason: &'static str,
    },
}

impl ResolveError {
    /// Helper to construct pipeline parse errors.
    #[must_use]
    pub fn pipeline(reason: impl Into<String>) -> Self {
        Self::InvalidPipeline {
            reason: reason.into(),
        }
    }
}

/// Result alias for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;
