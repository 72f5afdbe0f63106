//! Built-in tools and their static registration table.

mod file;
mod patch;
mod search;
mod shell;
mod vcs;

use std::sync::Arc;
use std::time::Duration;

use devins_primitives::workspace::{FileSystem, ProcessLauncher, VcsProvider};

use crate::local::{GitCli, LocalFileSystem, TokioProcessLauncher};
use crate::registry::{ToolMetadata, ToolRegistry, ToolResult};

pub use file::{ListDirTool, ReadFileTool, WriteFileTool};
pub use patch::PatchTool;
pub use search::GrepTool;
pub use shell::{RunTool, ShellTool};
pub use vcs::{CommitTool, RevTool};

/// Default deadline for `shell` and `run`.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(60);

/// Host capabilities the built-in tools operate through.
#[derive(Clone)]
pub struct ToolCollaborators {
    fs: Arc<dyn FileSystem>,
    launcher: Arc<dyn ProcessLauncher>,
    vcs: Arc<dyn VcsProvider>,
    process_timeout: Duration,
}

impl ToolCollaborators {
    /// Bundles the supplied collaborators.
    #[must_use]
    pub fn new(
        fs: Arc<dyn FileSystem>,
        launcher: Arc<dyn ProcessLauncher>,
        vcs: Arc<dyn VcsProvider>,
    ) -> Self {
        Self {
            fs,
            launcher,
            vcs,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
        }
    }

    /// Collaborators backed by the local disk, tokio processes and `git`.
    #[must_use]
    pub fn local() -> Self {
        let launcher: Arc<dyn ProcessLauncher> = Arc::new(TokioProcessLauncher::new());
        Self::new(
            Arc::new(LocalFileSystem::new()),
            Arc::clone(&launcher),
            Arc::new(GitCli::new(launcher)),
        )
    }

    /// Overrides the deadline applied to `shell` and `run`.
    #[must_use]
    pub fn with_process_timeout(mut self, timeout: Duration) -> Self {
        self.process_timeout = timeout;
        self
    }

    /// Returns the filesystem.
    #[must_use]
    pub fn fs(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    /// Returns the process launcher.
    #[must_use]
    pub fn launcher(&self) -> Arc<dyn ProcessLauncher> {
        Arc::clone(&self.launcher)
    }

    /// Returns the VCS provider.
    #[must_use]
    pub fn vcs(&self) -> Arc<dyn VcsProvider> {
        Arc::clone(&self.vcs)
    }

    /// Returns the process deadline.
    #[must_use]
    pub fn process_timeout(&self) -> Duration {
        self.process_timeout
    }
}

impl std::fmt::Debug for ToolCollaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCollaborators")
            .field("process_timeout", &self.process_timeout)
            .finish_non_exhaustive()
    }
}

/// Builds a registry holding every built-in tool.
///
/// # Errors
///
/// Returns an error only if two entries of the table collide.
pub fn standard_registry(collaborators: &ToolCollaborators) -> ToolResult<ToolRegistry> {
    let registry = ToolRegistry::new();
    register_builtins(&registry, collaborators)?;
    Ok(registry)
}

/// Registers every built-in tool into an existing registry.
///
/// # Errors
///
/// Returns [`crate::ToolError::DuplicateTool`] when a name is already taken.
pub fn register_builtins(
    registry: &ToolRegistry,
    collaborators: &ToolCollaborators,
) -> ToolResult<()> {
    let fs = collaborators.fs();
    let launcher = collaborators.launcher();
    let vcs = collaborators.vcs();
    let timeout = collaborators.process_timeout();

    registry.register_tool(
        ToolMetadata::new("read-file", "Read a workspace file into a fenced code block")?
            .with_aliases(["file"])?
            .with_primary_param("path")
            .with_completion()
            .read_only()
            .with_example("/read-file:src/main.rs")
            .with_example("/read-file:src/main.rs#L10-L20"),
        ReadFileTool::new(Arc::clone(&fs)),
    )?;
    registry.register_tool(
        ToolMetadata::new("write-file", "Write the following code block to a workspace file")?
            .with_aliases(["write"])?
            .with_primary_param("path")
            .with_completion()
            .accepting_body()
            .with_example("/write-file:notes/todo.md"),
        WriteFileTool::new(Arc::clone(&fs)),
    )?;
    registry.register_tool(
        ToolMetadata::new("patch", "Apply the following unified diff to workspace files")?
            .with_optional_param("path")
            .with_completion()
            .accepting_body()
            .with_example("/patch:src/lib.rs"),
        PatchTool::new(Arc::clone(&fs)),
    )?;
    registry.register_tool(
        ToolMetadata::new("list-dir", "List the entries of a workspace directory")?
            .with_aliases(["dir"])?
            .with_optional_param("path")
            .with_completion()
            .read_only()
            .with_example("/list-dir:src"),
        ListDirTool::new(Arc::clone(&fs)),
    )?;
    registry.register_tool(
        ToolMetadata::new("grep", "Search workspace files for a regular expression")?
            .with_aliases(["search"])?
            .with_primary_param("pattern")
            .read_only()
            .with_example("/grep:TODO"),
        GrepTool::new(fs),
    )?;
    registry.register_tool(
        ToolMetadata::new("shell", "Run the following code block with `sh -c`")?
            .with_optional_param("command")
            .accepting_body()
            .with_example("/shell:ls"),
        ShellTool::new(Arc::clone(&launcher), timeout),
    )?;
    registry.register_tool(
        ToolMetadata::new("run", "Run a program with whitespace-separated arguments")?
            .with_primary_param("command")
            .with_example("/run:cargo test"),
        RunTool::new(launcher, timeout),
    )?;
    registry.register_tool(
        ToolMetadata::new("rev", "Show the changes introduced by a revision")?
            .with_primary_param("revision")
            .read_only()
            .with_example("/rev:HEAD"),
        RevTool::new(Arc::clone(&vcs)),
    )?;
    registry.register_tool(
        ToolMetadata::new("commit", "Commit staged changes")?
            .with_optional_param("message")
            .accepting_body()
            .with_example("/commit:fix typo"),
        CommitTool::new(vcs),
    )?;

    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory collaborators shared by the built-in tool tests.

    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use devins_primitives::workspace::{
        CommitSummary, DirEntry, FileSystem, ProcessLauncher, ProcessOutput, ProcessSpec,
        VcsProvider,
    };
    use devins_primitives::{ToolExecutionContext, WorkspaceError, WorkspaceResult};

    use crate::registry::ToolInput;

    pub const ROOT: &str = "/work";

    #[derive(Default)]
    pub struct MemoryFs {
        files: Mutex<BTreeMap<PathBuf, String>>,
    }

    impl MemoryFs {
        pub fn with_file(self, relative: &str, contents: &str) -> Self {
            self.files
                .lock()
                .unwrap()
                .insert(Path::new(ROOT).join(relative), contents.to_string());
            self
        }

        pub fn contents(&self, relative: &str) -> Option<String> {
            self.files
                .lock()
                .unwrap()
                .get(&Path::new(ROOT).join(relative))
                .cloned()
        }
    }

    #[async_trait]
    impl FileSystem for MemoryFs {
        async fn read_to_string(&self, path: &Path) -> WorkspaceResult<String> {
            self.files
                .lock()
                .unwrap()
                .get(path)
                .cloned()
                .ok_or_else(|| WorkspaceError::NotFound {
                    path: path.to_path_buf(),
                })
        }

        async fn write(&self, path: &Path, contents: &str) -> WorkspaceResult<()> {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_path_buf(), contents.to_string());
            Ok(())
        }

        async fn list_dir(&self, path: &Path) -> WorkspaceResult<Vec<DirEntry>> {
            let files = self.files.lock().unwrap();
            let mut entries: BTreeMap<String, bool> = BTreeMap::new();
            for file in files.keys() {
                if let Ok(rest) = file.strip_prefix(path) {
                    let mut parts = rest.components();
                    if let Some(first) = parts.next() {
                        let name = first.as_os_str().to_string_lossy().into_owned();
                        let is_dir = parts.next().is_some();
                        *entries.entry(name).or_default() |= is_dir;
                    }
                }
            }
            if entries.is_empty() {
                return Err(WorkspaceError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Ok(entries
                .into_iter()
                .map(|(name, is_dir)| DirEntry { name, is_dir })
                .collect())
        }

        async fn exists(&self, path: &Path) -> bool {
            self.files.lock().unwrap().contains_key(path)
        }
    }

    #[derive(Default)]
    pub struct RecordingLauncher {
        pub specs: Mutex<Vec<ProcessSpec>>,
        pub exit_code: i32,
    }

    #[async_trait]
    impl ProcessLauncher for RecordingLauncher {
        async fn run(&self, spec: ProcessSpec) -> WorkspaceResult<ProcessOutput> {
            let stdout = format!("{} {}", spec.program(), spec.arg_list().join(" "));
            self.specs.lock().unwrap().push(spec);
            Ok(ProcessOutput {
                exit_code: Some(self.exit_code),
                stdout,
                stderr: if self.exit_code == 0 {
                    String::new()
                } else {
                    "boom".into()
                },
            })
        }
    }

    #[derive(Default)]
    pub struct StubVcs {
        pub commits: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VcsProvider for StubVcs {
        async fn log(&self, _root: &Path, _limit: usize) -> WorkspaceResult<Vec<CommitSummary>> {
            Ok(Vec::new())
        }

        async fn diff(&self, _root: &Path, revision: Option<&str>) -> WorkspaceResult<String> {
            Ok(format!("diff for {}", revision.unwrap_or("worktree")))
        }

        async fn current_branch(&self, _root: &Path) -> WorkspaceResult<String> {
            Ok("main".into())
        }

        async fn commit(&self, _root: &Path, message: &str) -> WorkspaceResult<String> {
            self.commits.lock().unwrap().push(message.to_string());
            Ok("abc1234".into())
        }
    }

    pub fn input(tool: &str, params: &[(&str, &str)]) -> ToolInput {
        let params = params
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        ToolInput::new(
            tool,
            params,
            ToolExecutionContext::default().with_workspace_root(ROOT),
        )
    }
}
