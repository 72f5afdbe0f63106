//! Core shared types and traits for the DevIns runtime.

#![warn(missing_docs, clippy::pedantic)]

mod call;
mod error;
mod ids;
mod language;
pub mod workspace;

/// Tool call requests and execution context.
pub use call::{CallKind, CallOrigin, SessionMetadata, ToolCall, ToolExecutionContext};
/// Error types and result aliases shared across the SDK.
pub use error::{Error, Result, WorkspaceError, WorkspaceResult};
/// Unique identifier for compile sessions.
pub use ids::SessionId;
/// Code-fence language lookup.
pub use language::language_for_path;
