//! Editor state variables supplied by the host.

use std::path::PathBuf;

use async_trait::async_trait;
use devins_primitives::language_for_path;

use crate::error::ResolveResult;
use crate::resolver::{ResolveContext, VariableResolver};

const VARIABLES: &[&str] = &[
    "selection",
    "activeFile",
    "filePath",
    "language",
    "beforeCursor",
    "afterCursor",
    "projectRoot",
];

/// Snapshot of the host editor taken before compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditorContext {
    active_file: Option<PathBuf>,
    selection: Option<String>,
    language: Option<String>,
    before_cursor: Option<String>,
    after_cursor: Option<String>,
}

impl EditorContext {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the file open in the editor.
    #[must_use]
    pub fn with_active_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.active_file = Some(path.into());
        self
    }

    /// Sets the selected text.
    #[must_use]
    pub fn with_selection(mut self, selection: impl Into<String>) -> Self {
        self.selection = Some(selection.into());
        self
    }

    /// Overrides the language derived from the active file.
    #[must_use]
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the text around the cursor.
    #[must_use]
    pub fn with_cursor(mut self, before: impl Into<String>, after: impl Into<String>) -> Self {
        self.before_cursor = Some(before.into());
        self.after_cursor = Some(after.into());
        self
    }
}

/// Resolves editor state variables. Missing state resolves to the empty string.
#[derive(Debug, Clone, Default)]
pub struct ContextResolver {
    editor: EditorContext,
}

impl ContextResolver {
    /// Creates a resolver over the supplied snapshot.
    #[must_use]
    pub fn new(editor: EditorContext) -> Self {
        Self { editor }
    }
}

#[async_trait]
impl VariableResolver for ContextResolver {
    fn name(&self) -> &str {
        "context"
    }

    fn claims(&self, variable: &str) -> bool {
        VARIABLES.contains(&variable)
    }

    async fn resolve(&self, variable: &str, ctx: &ResolveContext) -> ResolveResult<String> {
        let editor = &self.editor;
        let active_file = editor
            .active_file
            .as_deref()
            .or_else(|| ctx.execution().active_file());

        let value = match variable {
            "selection" => editor.selection.clone(),
            "activeFile" | "filePath" => active_file.map(|p| p.display().to_string()),
            "language" => editor
                .language
                .clone()
                .or_else(|| active_file.map(|p| language_for_path(p).to_string())),
            "beforeCursor" => editor.before_cursor.clone(),
            "afterCursor" => editor.after_cursor.clone(),
            "projectRoot" => ctx.workspace_root().map(|p| p.display().to_string()),
            _ => None,
        };
        Ok(value.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use devins_primitives::ToolExecutionContext;

    use super::*;

    #[tokio::test]
    async fn resolves_editor_state() {
        let resolver = ContextResolver::new(
            EditorContext::new()
                .with_active_file("src/lib.rs")
                .with_selection("fn main() {}")
                .with_cursor("let x", " = 1;"),
        );
        let ctx = ResolveContext::new(
            ToolExecutionContext::default().with_workspace_root("/work"),
        );

        assert!(resolver.claims("selection"));
        assert!(!resolver.claims("os"));
        assert_eq!(resolver.resolve("filePath", &ctx).await.unwrap(), "src/lib.rs");
        assert_eq!(resolver.resolve("language", &ctx).await.unwrap(), "rust");
        assert_eq!(resolver.resolve("beforeCursor", &ctx).await.unwrap(), "let x");
        assert_eq!(resolver.resolve("projectRoot", &ctx).await.unwrap(), "/work");
    }

    #[tokio::test]
    async fn missing_state_is_empty() {
        let resolver = ContextResolver::default();
        let ctx = ResolveContext::default();
        assert_eq!(resolver.resolve("selection", &ctx).await.unwrap(), "");
        assert_eq!(resolver.resolve("language", &ctx).await.unwrap(), "");
    }
}
