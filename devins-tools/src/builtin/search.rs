use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use devins_primitives::WorkspaceError;
use devins_primitives::workspace::{FileSystem, walk_files};
use regex::Regex;
use tracing::debug;

use crate::registry::{Tool, ToolError, ToolInput, ToolOutput, ToolResult};

const MAX_FILES: usize = 5_000;
const MAX_MATCHES: usize = 200;

/// `grep`: regular-expression search across workspace files.
pub struct GrepTool {
    fs: Arc<dyn FileSystem>,
}

impl GrepTool {
    /// Creates the tool over the supplied filesystem.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for GrepTool {
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        let pattern = input.require("pattern")?;
        let regex = Regex::new(pattern)
            .map_err(|err| ToolError::execution(format!("invalid pattern `{pattern}`: {err}")))?;
        let root = input
            .context()
            .workspace_root()
            .ok_or(WorkspaceError::NoWorkspace)?
            .to_path_buf();
        let start = input
            .param("path")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(".");
        input.context().resolve_path(start)?;

        let files = walk_files(self.fs.as_ref(), &root, Path::new(start), MAX_FILES).await?;
        let mut out = String::new();
        let mut matches = 0;

        'files: for file in &files {
            // Binary or unreadable files are skipped.
            let Ok(content) = self.fs.read_to_string(&root.join(file)).await else {
                continue;
            };
            for (index, line) in content.lines().enumerate() {
                if !regex.is_match(line) {
                    continue;
                }
                if matches == MAX_MATCHES {
                    let _ = write!(out, "\n... truncated after {MAX_MATCHES} matches");
                    break 'files;
                }
                if !out.is_empty() {
                    out.push('\n');
                }
                let _ = write!(out, "{file}:{}: {}", index + 1, line.trim_end());
                matches += 1;
            }
        }

        debug!(pattern, files = files.len(), matches, "grep finished");
        if matches == 0 {
            return Ok(ToolOutput::text(format!("No matches for `{pattern}`")));
        }
        Ok(ToolOutput::text(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::{MemoryFs, input};

    fn workspace() -> Arc<MemoryFs> {
        Arc::new(
            MemoryFs::default()
                .with_file("src/lib.rs", "pub fn alpha() {}\n// TODO: beta\n")
                .with_file("src/main.rs", "fn main() {}\n")
                .with_file("target/debug/build.rs", "fn generated() {}\n")
                .with_file("README.md", "TODO: docs\n"),
        )
    }

    #[tokio::test]
    async fn grep_reports_path_and_line() {
        let tool = GrepTool::new(workspace());
        let output = tool
            .invoke(input("grep", &[("pattern", "TODO")]))
            .await
            .unwrap();

        assert_eq!(
            output.as_str(),
            "README.md:1: TODO: docs\nsrc/lib.rs:2: // TODO: beta"
        );
    }

    #[tokio::test]
    async fn grep_skips_build_output_and_scopes_to_path() {
        let tool = GrepTool::new(workspace());
        let output = tool
            .invoke(input("grep", &[("pattern", "fn "), ("path", "src")]))
            .await
            .unwrap();

        assert_eq!(
            output.as_str(),
            "src/lib.rs:1: pub fn alpha() {}\nsrc/main.rs:1: fn main() {}"
        );
    }

    #[tokio::test]
    async fn grep_reports_no_matches_and_bad_patterns() {
        let tool = GrepTool::new(workspace());
        let output = tool
            .invoke(input("grep", &[("pattern", "nothing-here")]))
            .await
            .unwrap();
        assert_eq!(output.as_str(), "No matches for `nothing-here`");

        let err = tool
            .invoke(input("grep", &[("pattern", "(")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
    }
}
