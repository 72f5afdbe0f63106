//! Version-control and build-tool variables.

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;
use devins_primitives::WorkspaceError;
use devins_primitives::workspace::{FileSystem, VcsProvider};

use crate::error::ResolveResult;
use crate::resolver::{ResolveContext, VariableResolver};

const VARIABLES: &[&str] = &[
    "currentBranch",
    "recentCommits",
    "diff",
    "stagedDiff",
    "buildTool",
];

const RECENT_COMMITS: usize = 10;

/// Marker files checked in order to detect the build tool.
const BUILD_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "cargo"),
    ("build.gradle.kts", "gradle"),
    ("build.gradle", "gradle"),
    ("pom.xml", "maven"),
    ("package.json", "npm"),
    ("go.mod", "go"),
    ("pyproject.toml", "python"),
    ("Makefile", "make"),
];

/// Resolves variables backed by the VCS and workspace layout.
pub struct ToolchainResolver {
    fs: Arc<dyn FileSystem>,
    vcs: Arc<dyn VcsProvider>,
}

impl ToolchainResolver {
    /// Creates a resolver using the supplied collaborators.
    #[must_use]
    pub fn new(fs: Arc<dyn FileSystem>, vcs: Arc<dyn VcsProvider>) -> Self {
        Self { fs, vcs }
    }
}

#[async_trait]
impl VariableResolver for ToolchainResolver {
    fn name(&self) -> &str {
        "toolchain"
    }

    fn claims(&self, variable: &str) -> bool {
        VARIABLES.contains(&variable)
    }

    async fn resolve(&self, variable: &str, ctx: &ResolveContext) -> ResolveResult<String> {
        let root = ctx.workspace_root().ok_or(WorkspaceError::NoWorkspace)?;

        let value = match variable {
            "currentBranch" => self.vcs.current_branch(root).await?,
            "recentCommits" => {
                let commits = self.vcs.log(root, RECENT_COMMITS).await?;
                let mut out = String::new();
                for commit in commits {
                    let _ = writeln!(out, "{} {} ({})", commit.id, commit.summary, commit.author);
                }
                out.trim_end().to_string()
            }
            "diff" => self.vcs.diff(root, None).await?,
            "stagedDiff" => self.vcs.diff(root, Some("--cached")).await?,
            "buildTool" => {
                let mut detected = "unknown";
                for (marker, tool) in BUILD_MARKERS {
                    if self.fs.exists(&root.join(marker)).await {
                        detected = *tool;
                        break;
                    }
                }
                detected.to_string()
            }
            _ => String::new(),
        };
        Ok(value)
    }
}
