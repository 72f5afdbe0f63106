use std::sync::Arc;

use async_trait::async_trait;
use devins_primitives::WorkspaceError;
use devins_primitives::workspace::VcsProvider;
use tracing::debug;

use crate::registry::{CONTENT_PARAM, Tool, ToolError, ToolInput, ToolOutput, ToolResult};

/// `rev`: renders the change set of one revision as a diff block.
pub struct RevTool {
    vcs: Arc<dyn VcsProvider>,
}

impl RevTool {
    /// Creates the tool over the supplied provider.
    #[must_use]
    pub fn new(vcs: Arc<dyn VcsProvider>) -> Self {
        Self { vcs }
    }
}

#[async_trait]
impl Tool for RevTool {
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        let revision = input.require("revision")?.trim();
        let root = input
            .context()
            .workspace_root()
            .ok_or(WorkspaceError::NoWorkspace)?;

        let diff = self
            .vcs
            .diff(root, Some(&format!("{revision}^!")))
            .await?;
        debug!(revision, bytes = diff.len(), "rendered revision");
        Ok(ToolOutput::text(format!(
            "```diff\n{}\n```",
            diff.trim_end_matches('\n')
        )))
    }
}

/// `commit`: records staged changes with a message.
pub struct CommitTool {
    vcs: Arc<dyn VcsProvider>,
}

impl CommitTool {
    /// Creates the tool over the supplied provider.
    #[must_use]
    pub fn new(vcs: Arc<dyn VcsProvider>) -> Self {
        Self { vcs }
    }
}

#[async_trait]
impl Tool for CommitTool {
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        let message = input
            .param(CONTENT_PARAM)
            .map(str::trim)
            .filter(|body| !body.is_empty())
            .or_else(|| input.param("message").map(str::trim))
            .filter(|message| !message.is_empty())
            .ok_or_else(|| ToolError::MissingParameter {
                tool: input.tool().to_string(),
                name: "message".into(),
            })?;
        let root = input
            .context()
            .workspace_root()
            .ok_or(WorkspaceError::NoWorkspace)?;

        let id = self.vcs.commit(root, message).await?;
        debug!(commit = %id, "recorded commit");
        let summary = message.lines().next().unwrap_or_default();
        Ok(ToolOutput::text(format!("Committed {id}: {summary}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::{StubVcs, input};

    #[tokio::test]
    async fn rev_wraps_diff_in_fence() {
        let tool = RevTool::new(Arc::new(StubVcs::default()));
        let output = tool
            .invoke(input("rev", &[("revision", "HEAD~1")]))
            .await
            .unwrap();
        assert_eq!(output.as_str(), "```diff\ndiff for HEAD~1^!\n```");
    }

    #[tokio::test]
    async fn commit_uses_body_before_argument() {
        let vcs = Arc::new(StubVcs::default());
        let tool = CommitTool::new(Arc::clone(&vcs) as Arc<dyn VcsProvider>);

        let output = tool
            .invoke(input(
                "commit",
                &[("message", "short"), ("content", "Fix parser\n\nDetails\n")],
            ))
            .await
            .unwrap();
        assert_eq!(output.as_str(), "Committed abc1234: Fix parser");
        assert_eq!(vcs.commits.lock().unwrap().as_slice(), ["Fix parser\n\nDetails"]);

        let err = tool.invoke(input("commit", &[])).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter { .. }));
    }
}
