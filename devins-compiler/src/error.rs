use thiserror::Error;

/// Conditions that stop a compile before any node is processed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    /// The compiler requires a workspace root and none is bound.
    #[error("no workspace root is bound; open a project before compiling")]
    MissingWorkspace,
}
