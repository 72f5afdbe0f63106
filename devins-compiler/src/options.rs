use serde::{Deserialize, Serialize};

/// Knobs controlling one [`Compiler`](crate::Compiler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    require_workspace: bool,
    passthrough_unknown: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            require_workspace: false,
            passthrough_unknown: true,
        }
    }
}

impl CompilerOptions {
    /// Creates options that accept a missing workspace and echo unknown
    /// commands verbatim.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails the whole compile when no workspace root is bound.
    #[must_use]
    pub fn with_require_workspace(mut self, require: bool) -> Self {
        self.require_workspace = require;
        self
    }

    /// Chooses between echoing unknown commands with a warning (`true`) and
    /// reporting them as errors (`false`).
    #[must_use]
    pub fn with_passthrough_unknown(mut self, passthrough: bool) -> Self {
        self.passthrough_unknown = passthrough;
        self
    }

    /// Returns whether a workspace root is mandatory.
    #[must_use]
    pub fn require_workspace(&self) -> bool {
        self.require_workspace
    }

    /// Returns whether unknown commands are echoed verbatim.
    #[must_use]
    pub fn passthrough_unknown(&self) -> bool {
        self.passthrough_unknown
    }
}
