//! Collaborator interfaces injected by the host (filesystem, VCS, processes).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::WorkspaceResult;

/// Directory names never descended into by [`walk_files`].
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "build", "dist"];

/// Entry returned when listing a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    /// File or directory name.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

/// Filesystem abstraction used by file tools and resolvers.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Reads a UTF-8 file.
    async fn read_to_string(&self, path: &Path) -> WorkspaceResult<String>;

    /// Writes a file, creating parent directories as needed.
    async fn write(&self, path: &Path, contents: &str) -> WorkspaceResult<()>;

    /// Lists the entries of a directory, sorted by name.
    async fn list_dir(&self, path: &Path) -> WorkspaceResult<Vec<DirEntry>>;

    /// Returns `true` when the path exists.
    async fn exists(&self, path: &Path) -> bool;
}

/// Lists files below `start` (relative to `root`) as `/`-separated relative
/// paths, sorted. Hidden entries and build output directories are skipped and
/// at most `limit` paths are returned.
///
/// # Errors
///
/// Propagates the first listing failure.
pub async fn walk_files(
    fs: &dyn FileSystem,
    root: &Path,
    start: &Path,
    limit: usize,
) -> WorkspaceResult<Vec<String>> {
    let mut pending = vec![start.to_path_buf()];
    let mut files = Vec::new();

    'walk: while let Some(relative) = pending.pop() {
        for entry in fs.list_dir(&root.join(&relative)).await? {
            if entry.name.starts_with('.') || SKIPPED_DIRS.contains(&entry.name.as_str()) {
                continue;
            }
            let child = relative.join(&entry.name);
            if entry.is_dir {
                pending.push(child);
            } else {
                files.push(slash_path(&child));
                if files.len() >= limit {
                    break 'walk;
                }
            }
        }
    }

    files.sort();
    Ok(files)
}

fn slash_path(path: &Path) -> String {
    path.components()
        .filter(|c| !matches!(c, std::path::Component::CurDir))
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Resolves the project root for the current session.
pub trait WorkspaceResolver: Send + Sync {
    /// Returns the workspace root, if one is bound.
    fn workspace_root(&self) -> Option<PathBuf>;
}

/// Workspace resolver returning a fixed root.
#[derive(Debug, Clone, Default)]
pub struct StaticWorkspace {
    root: Option<PathBuf>,
}

impl StaticWorkspace {
    /// Creates a resolver bound to the supplied root.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    /// Creates a resolver with no bound root.
    #[must_use]
    pub fn unbound() -> Self {
        Self { root: None }
    }
}

impl WorkspaceResolver for StaticWorkspace {
    fn workspace_root(&self) -> Option<PathBuf> {
        self.root.clone()
    }
}

/// Summary of a single commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSummary {
    /// Commit hash.
    pub id: String,
    /// Author display name.
    pub author: String,
    /// First line of the commit message.
    pub summary: String,
}

/// Version-control provider used by `rev`/`commit` tools and toolchain variables.
#[async_trait]
pub trait VcsProvider: Send + Sync {
    /// Returns up to `limit` most recent commits.
    async fn log(&self, root: &Path, limit: usize) -> WorkspaceResult<Vec<CommitSummary>>;

    /// Returns the diff for a revision, or the working tree diff when `None`.
    async fn diff(&self, root: &Path, revision: Option<&str>) -> WorkspaceResult<String>;

    /// Returns the current branch name.
    async fn current_branch(&self, root: &Path) -> WorkspaceResult<String>;

    /// Commits staged changes with the supplied message, returning the new id.
    async fn commit(&self, root: &Path, message: &str) -> WorkspaceResult<String>;
}

/// Description of a process to launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    stdin: Option<String>,
    timeout: Duration,
}

impl ProcessSpec {
    /// Creates a process spec with a 60 second timeout.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
            stdin: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Sets an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Supplies data written to the process stdin.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Overrides the execution timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the argument list.
    #[must_use]
    pub fn arg_list(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Returns the environment overrides.
    #[must_use]
    pub fn env_vars(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Returns the stdin payload.
    #[must_use]
    pub fn stdin_data(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Returns the execution timeout.
    #[must_use]
    pub fn time_limit(&self) -> Duration {
        self.timeout
    }
}

/// Captured output of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessOutput {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

impl ProcessOutput {
    /// Returns `true` when the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Launches processes on behalf of shell-style tools.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Runs the process to completion, honouring the timeout in `spec`.
    async fn run(&self, spec: ProcessSpec) -> WorkspaceResult<ProcessOutput>;
}
