//! Collaborators backed by the local machine.

use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use devins_primitives::workspace::{
    CommitSummary, DirEntry, FileSystem, ProcessLauncher, ProcessOutput, ProcessSpec, VcsProvider,
};
use devins_primitives::{WorkspaceError, WorkspaceResult};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// [`FileSystem`] over `tokio::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Creates the filesystem.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn not_found(path: &Path, err: std::io::Error) -> WorkspaceError {
    if err.kind() == std::io::ErrorKind::NotFound {
        WorkspaceError::NotFound {
            path: path.to_path_buf(),
        }
    } else {
        err.into()
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn read_to_string(&self, path: &Path) -> WorkspaceResult<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|err| not_found(path, err))
    }

    async fn write(&self, path: &Path, contents: &str) -> WorkspaceResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
        Ok(())
    }

    async fn list_dir(&self, path: &Path) -> WorkspaceResult<Vec<DirEntry>> {
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(|err| not_found(path, err))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let is_dir = entry.file_type().await?.is_dir();
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_dir,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

/// [`ProcessLauncher`] over `tokio::process` with a per-spec deadline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioProcessLauncher;

impl TokioProcessLauncher {
    /// Creates the launcher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessLauncher for TokioProcessLauncher {
    async fn run(&self, spec: ProcessSpec) -> WorkspaceResult<ProcessOutput> {
        let mut command = Command::new(spec.program());
        command
            .args(spec.arg_list())
            .envs(spec.env_vars())
            .stdin(if spec.stdin_data().is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = spec.working_dir() {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|err| {
            WorkspaceError::process(format!("failed to start `{}`: {err}", spec.program()))
        })?;
        // Stdin is fed from its own task so the child can fill stdout meanwhile.
        let feeder = match (spec.stdin_data(), child.stdin.take()) {
            (Some(data), Some(mut stdin)) => {
                let data = data.to_owned();
                Some(tokio::spawn(async move {
                    if let Err(err) = stdin.write_all(data.as_bytes()).await {
                        debug!(error = %err, "child closed stdin early");
                    }
                }))
            }
            _ => None,
        };

        let limit = spec.time_limit();
        let waited = tokio::time::timeout(limit, child.wait_with_output()).await;
        if let Some(feeder) = feeder {
            feeder.abort();
        }
        let output = waited.map_err(|_| WorkspaceError::Timeout {
            operation: format!("`{}`", spec.program()),
            millis: limit.as_millis(),
        })??;

        debug!(program = spec.program(), status = ?output.status.code(), "process finished");
        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

const FIELD_SEPARATOR: char = '\u{1f}';

/// [`VcsProvider`] that shells out to `git`.
#[derive(Clone)]
pub struct GitCli {
    launcher: Arc<dyn ProcessLauncher>,
}

impl std::fmt::Debug for GitCli {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitCli").finish_non_exhaustive()
    }
}

impl GitCli {
    /// Creates a provider running `git` through the supplied launcher.
    #[must_use]
    pub fn new(launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self { launcher }
    }

    async fn git<I, S>(&self, root: &Path, args: I) -> WorkspaceResult<String>
    where
        I: IntoIterator<Item = S> + Send,
        S: Into<String>,
    {
        let spec = ProcessSpec::new("git").args(args).cwd(root);
        let output = self.launcher.run(spec).await?;
        if !output.success() {
            return Err(WorkspaceError::vcs(output.stderr.trim().to_string()));
        }
        Ok(output.stdout)
    }
}

fn parse_log(stdout: &str) -> Vec<CommitSummary> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split(FIELD_SEPARATOR);
            Some(CommitSummary {
                id: fields.next()?.to_string(),
                author: fields.next()?.to_string(),
                summary: fields.next().unwrap_or_default().to_string(),
            })
        })
        .collect()
}

#[async_trait]
impl VcsProvider for GitCli {
    async fn log(&self, root: &Path, limit: usize) -> WorkspaceResult<Vec<CommitSummary>> {
        let stdout = self
            .git(
                root,
                [
                    "log".to_string(),
                    format!("-n{limit}"),
                    "--pretty=format:%H%x1f%an%x1f%s".to_string(),
                ],
            )
            .await?;
        Ok(parse_log(&stdout))
    }

    async fn diff(&self, root: &Path, revision: Option<&str>) -> WorkspaceResult<String> {
        match revision {
            Some(rev) => self.git(root, ["diff", rev]).await,
            None => self.git(root, ["diff"]).await,
        }
    }

    async fn current_branch(&self, root: &Path) -> WorkspaceResult<String> {
        let stdout = self
            .git(root, ["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(stdout.trim().to_string())
    }

    async fn commit(&self, root: &Path, message: &str) -> WorkspaceResult<String> {
        self.git(root, ["commit", "-m", message]).await?;
        let stdout = self.git(root, ["rev-parse", "--short", "HEAD"]).await?;
        Ok(stdout.trim().to_string())
    }
}
