//! Tool call requests and the read-only execution context handed to tools.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result, WorkspaceError, WorkspaceResult};
use crate::ids::SessionId;

const MAX_TOOL_NAME_LEN: usize = 128;

/// Distinguishes which kind of syntax node produced a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    /// `/command:args` invocation.
    Command,
    /// `@agent` mention.
    Agent,
}

impl fmt::Display for CallKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => f.write_str("command"),
            Self::Agent => f.write_str("agent"),
        }
    }
}

/// Source position of the node a call was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOrigin {
    kind: CallKind,
    line: usize,
    column: usize,
}

impl CallOrigin {
    /// Creates a new origin descriptor.
    #[must_use]
    pub const fn new(kind: CallKind, line: usize, column: usize) -> Self {
        Self { kind, line, column }
    }

    /// Returns the node kind.
    #[must_use]
    pub const fn kind(&self) -> CallKind {
        self.kind
    }

    /// Returns the 1-based line of the originating node.
    #[must_use]
    pub const fn line(&self) -> usize {
        self.line
    }

    /// Returns the 1-based column of the originating node.
    #[must_use]
    pub const fn column(&self) -> usize {
        self.column
    }
}

impl Default for CallOrigin {
    fn default() -> Self {
        Self::new(CallKind::Command, 1, 1)
    }
}

/// Structured request to invoke a named tool. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    tool_name: String,
    #[serde(default)]
    params: BTreeMap<String, String>,
    #[serde(default)]
    origin: CallOrigin,
}

impl ToolCall {
    /// Creates a call for the supplied tool with no parameters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidToolName`] when the name is empty, too long, or
    /// contains whitespace.
    pub fn new(tool_name: impl Into<String>) -> Result<Self> {
        let tool_name = tool_name.into();
        validate_tool_name(&tool_name)?;
        Ok(Self {
            tool_name,
            params: BTreeMap::new(),
            origin: CallOrigin::default(),
        })
    }

    /// Adds a parameter and returns the updated call.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Replaces all parameters.
    #[must_use]
    pub fn with_params(mut self, params: BTreeMap<String, String>) -> Self {
        self.params = params;
        self
    }

    /// Records the originating node position.
    #[must_use]
    pub fn with_origin(mut self, origin: CallOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Returns the tool name.
    #[must_use]
    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Returns all parameters.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Returns a single parameter value.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Returns where in the source the call came from.
    #[must_use]
    pub fn origin(&self) -> CallOrigin {
        self.origin
    }
}

fn validate_tool_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidToolName {
            name: name.into(),
            reason: "tool name cannot be empty".into(),
        });
    }

    if name.len() > MAX_TOOL_NAME_LEN {
        return Err(Error::InvalidToolName {
            name: name.into(),
            reason: format!("tool name length must be <= {MAX_TOOL_NAME_LEN}"),
        });
    }

    if name.chars().any(char::is_whitespace) {
        return Err(Error::InvalidToolName {
            name: name.into(),
            reason: "tool name cannot contain whitespace".into(),
        });
    }

    Ok(())
}

/// Session-scoped metadata exposed to policies and tools.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    session_id: SessionId,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    values: BTreeMap<String, String>,
}

impl SessionMetadata {
    /// Creates metadata for the supplied session.
    #[must_use]
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            values: BTreeMap::new(),
        }
    }

    /// Adds a key/value pair and returns the updated metadata.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Returns the session identifier.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Returns a metadata value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Returns all metadata values.
    #[must_use]
    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }
}

/// Read-only view of the workspace handed to policies and tool implementations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolExecutionContext {
    workspace_root: Option<PathBuf>,
    active_file: Option<PathBuf>,
    session: SessionMetadata,
}

impl ToolExecutionContext {
    /// Creates a context without a bound workspace.
    #[must_use]
    pub fn new(session: SessionMetadata) -> Self {
        Self {
            workspace_root: None,
            active_file: None,
            session,
        }
    }

    /// Binds a workspace root.
    #[must_use]
    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = Some(root.into());
        self
    }

    /// Records the file currently open in the host editor.
    #[must_use]
    pub fn with_active_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.active_file = Some(file.into());
        self
    }

    /// Returns the bound workspace root, if any.
    #[must_use]
    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    /// Returns the active editor file, if any.
    #[must_use]
    pub fn active_file(&self) -> Option<&Path> {
        self.active_file.as_deref()
    }

    /// Returns the session metadata.
    #[must_use]
    pub fn session(&self) -> &SessionMetadata {
        &self.session
    }

    /// Resolves a workspace-relative path, rejecting paths that escape the root.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::NoWorkspace`] when no root is bound and
    /// [`WorkspaceError::OutsideWorkspace`] for absolute paths or `..` traversal
    /// beyond the root.
    pub fn resolve_path(&self, relative: &str) -> WorkspaceResult<PathBuf> {
        let root = self.workspace_root().ok_or(WorkspaceError::NoWorkspace)?;
        let candidate = Path::new(relative.trim());

        let mut depth: usize = 0;
        for component in candidate.components() {
            match component {
                Component::Normal(_) => depth += 1,
                Component::CurDir => {}
                Component::ParentDir => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        WorkspaceError::OutsideWorkspace {
                            path: candidate.to_path_buf(),
                        }
                    })?;
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(WorkspaceError::OutsideWorkspace {
                        path: candidate.to_path_buf(),
                    });
                }
            }
        }

        Ok(root.join(candidate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_builder_collects_params() {
        let call = ToolCall::new("write-file")
            .unwrap()
            .with_param("path", "src/x.txt")
            .with_origin(CallOrigin::new(CallKind::Command, 3, 7));

        assert_eq!(call.tool_name(), "write-file");
        assert_eq!(call.param("path"), Some("src/x.txt"));
        assert_eq!(call.origin().line(), 3);
        assert!(call.param("content").is_none());
    }

    #[test]
    fn tool_call_rejects_bad_names() {
        assert!(ToolCall::new("").is_err());
        assert!(ToolCall::new("read file").is_err());
        assert!(ToolCall::new("x".repeat(200)).is_err());
    }

    #[test]
    fn resolve_path_requires_workspace() {
        let ctx = ToolExecutionContext::default();
        let err = ctx.resolve_path("README.md").unwrap_err();
        assert!(matches!(err, WorkspaceError::NoWorkspace));
    }

    #[test]
    fn resolve_path_blocks_traversal() {
        let ctx = ToolExecutionContext::default().with_workspace_root("/work");

        assert_eq!(
            ctx.resolve_path("src/../README.md").unwrap(),
            PathBuf::from("/work/src/../README.md")
        );
        assert!(matches!(
            ctx.resolve_path("../../etc/passwd"),
            Err(WorkspaceError::OutsideWorkspace { .. })
        ));
        assert!(matches!(
            ctx.resolve_path("/etc/passwd"),
            Err(WorkspaceError::OutsideWorkspace { .. })
        ));
    }
}
