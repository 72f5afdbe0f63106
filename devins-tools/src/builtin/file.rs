use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use devins_primitives::language_for_path;
use devins_primitives::workspace::FileSystem;
use tracing::debug;

use crate::registry::{CONTENT_PARAM, Tool, ToolError, ToolInput, ToolOutput, ToolResult};

/// Inclusive 1-based line range parsed from a `#L<start>-L<end>` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LineRange {
    start: usize,
    end: usize,
}

impl LineRange {
    fn apply(self, content: &str) -> String {
        let take = self.end.saturating_sub(self.start) + 1;
        content
            .lines()
            .skip(self.start.saturating_sub(1))
            .take(take)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Splits `src/main.rs#L2-L5` into the path and the requested range.
fn split_range(raw: &str) -> (&str, Option<LineRange>) {
    let Some((path, fragment)) = raw.rsplit_once('#') else {
        return (raw, None);
    };
    let parse_line = |part: &str| part.strip_prefix('L').and_then(|n| n.parse::<usize>().ok());

    let range = match fragment.split_once('-') {
        Some((start, end)) => parse_line(start).zip(parse_line(end)).map(|(start, end)| {
            LineRange {
                start,
                end: end.max(start),
            }
        }),
        None => parse_line(fragment).map(|start| LineRange {
            start,
            end: start,
        }),
    };

    match range {
        Some(range) if range.start > 0 => (path, Some(range)),
        _ => (raw, None),
    }
}

/// `read-file`: renders a workspace file as a fenced block.
pub struct ReadFileTool {
    fs: Arc<dyn FileSystem>,
}

impl ReadFileTool {
    /// Creates the tool over the supplied filesystem.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    async fn read(&self, input: &ToolInput, path: &str) -> ToolResult<String> {
        let absolute = input.context().resolve_path(path)?;
        Ok(self.fs.read_to_string(&absolute).await?)
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        let raw = input.require("path")?.trim().to_string();
        let (path, range) = split_range(&raw);

        let content = self
            .read(&input, path)
            .await
            .map_err(|err| ToolError::execution(format!("could not read file `{path}`: {err}")))?;
        let content = match range {
            Some(range) => range.apply(&content),
            None => content,
        };
        debug!(path, bytes = content.len(), "read workspace file");

        let language = language_for_path(Path::new(path));
        let mut out = format!("## file: {path}\n```{language}\n");
        out.push_str(content.trim_end_matches('\n'));
        out.push_str("\n```");
        Ok(ToolOutput::text(out))
    }
}

/// `write-file`: writes the command body to a workspace file.
pub struct WriteFileTool {
    fs: Arc<dyn FileSystem>,
}

impl WriteFileTool {
    /// Creates the tool over the supplied filesystem.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        let path = input.require("path")?.trim();
        let content = input.param(CONTENT_PARAM).unwrap_or_default();
        let absolute = input.context().resolve_path(path)?;

        self.fs.write(&absolute, content).await?;
        debug!(path, bytes = content.len(), "wrote workspace file");
        Ok(ToolOutput::text(format!(
            "Wrote {} bytes to {path}",
            content.len()
        )))
    }
}

/// `list-dir`: lists a workspace directory, directories first.
pub struct ListDirTool {
    fs: Arc<dyn FileSystem>,
}

impl ListDirTool {
    /// Creates the tool over the supplied filesystem.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }
}

#[async_trait]
impl Tool for ListDirTool {
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        let path = input
            .param("path")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(".");
        let absolute = input.context().resolve_path(path)?;

        let mut entries = self.fs.list_dir(&absolute).await?;
        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));

        let mut out = format!("## dir: {path}");
        for entry in entries {
            let suffix = if entry.is_dir { "/" } else { "" };
            let _ = write!(out, "\n- {}{suffix}", entry.name);
        }
        Ok(ToolOutput::text(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::{MemoryFs, input};
    use devins_primitives::ToolExecutionContext;

    #[tokio::test]
    async fn read_file_renders_fenced_block() {
        let fs = Arc::new(MemoryFs::default().with_file("README.md", "# Demo\nhello\n"));
        let tool = ReadFileTool::new(fs);

        let output = tool
            .invoke(input("read-file", &[("path", "README.md")]))
            .await
            .unwrap();
        assert_eq!(output.as_str(), "## file: README.md\n```markdown\n# Demo\nhello\n```");
    }

    #[tokio::test]
    async fn read_file_honours_line_ranges() {
        let fs = Arc::new(MemoryFs::default().with_file("src/lib.rs", "a\nb\nc\nd\ne\n"));
        let tool = ReadFileTool::new(fs);

        let output = tool
            .invoke(input("read-file", &[("path", "src/lib.rs#L2-L4")]))
            .await
            .unwrap();
        assert_eq!(output.as_str(), "## file: src/lib.rs\n```rust\nb\nc\nd\n```");

        let single = tool
            .invoke(input("read-file", &[("path", "src/lib.rs#L5")]))
            .await
            .unwrap();
        assert!(single.as_str().ends_with("```rust\ne\n```"));
    }

    #[tokio::test]
    async fn read_file_without_workspace_reports_path() {
        let tool = ReadFileTool::new(Arc::new(MemoryFs::default()));
        let params = [("path".to_string(), "README.md".to_string())].into();

        let err = tool
            .invoke(ToolInput::new("read-file", params, ToolExecutionContext::default()))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "tool execution failed: could not read file `README.md`: no workspace root is bound"
        );
    }

    #[tokio::test]
    async fn read_file_rejects_traversal() {
        let tool = ReadFileTool::new(Arc::new(MemoryFs::default()));
        let err = tool
            .invoke(input("read-file", &[("path", "../secret")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("escapes the workspace root"));
    }

    #[tokio::test]
    async fn write_file_stores_body() {
        let fs = Arc::new(MemoryFs::default());
        let tool = WriteFileTool::new(Arc::clone(&fs) as Arc<dyn FileSystem>);

        let output = tool
            .invoke(input(
                "write-file",
                &[("path", "notes/todo.md"), ("content", "- ship it\n")],
            ))
            .await
            .unwrap();
        assert_eq!(output.as_str(), "Wrote 10 bytes to notes/todo.md");
        assert_eq!(fs.contents("notes/todo.md").as_deref(), Some("- ship it\n"));
    }

    #[tokio::test]
    async fn list_dir_puts_directories_first() {
        let fs = Arc::new(
            MemoryFs::default()
                .with_file("b.txt", "")
                .with_file("src/main.rs", "")
                .with_file("a.txt", ""),
        );
        let tool = ListDirTool::new(fs);

        let output = tool.invoke(input("list-dir", &[])).await.unwrap();
        assert_eq!(output.as_str(), "## dir: .\n- src/\n- a.txt\n- b.txt");
    }

    #[test]
    fn split_range_ignores_non_line_fragments() {
        assert_eq!(split_range("a.md#intro"), ("a.md#intro", None));
        assert_eq!(split_range("a.md#L0"), ("a.md#L0", None));
        assert_eq!(
            split_range("a.md#L3-L1"),
            ("a.md", Some(LineRange { start: 3, end: 3 }))
        );
    }
}
