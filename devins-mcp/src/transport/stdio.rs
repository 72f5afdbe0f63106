use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use super::Transport;
use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, parse_response};

const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Variables describing the capturing shell rather than the user's session.
const SHELL_LOCAL_VARS: &[&str] = &["_", "PWD", "OLDPWD", "SHLVL"];

/// Options applied when spawning stdio servers.
#[derive(Debug, Clone)]
pub struct StdioOptions {
    inherit_login_env: bool,
    login_env_timeout: Duration,
}

impl Default for StdioOptions {
    fn default() -> Self {
        Self {
            inherit_login_env: true,
            login_env_timeout: Duration::from_secs(5),
        }
    }
}

impl StdioOptions {
    /// Controls whether the login-shell environment is merged in before the
    /// configured overrides.
    #[must_use]
    pub fn with_login_env(mut self, inherit: bool) -> Self {
        self.inherit_login_env = inherit;
        self
    }

    /// Bounds how long capturing the login environment may take.
    #[must_use]
    pub fn with_login_env_timeout(mut self, timeout: Duration) -> Self {
        self.login_env_timeout = timeout;
        self
    }
}

/// Captures the environment of `$SHELL -l -c env`. Any failure yields an
/// empty map.
pub async fn login_shell_env(timeout: Duration) -> BTreeMap<String, String> {
    let Ok(shell) = std::env::var("SHELL") else {
        return BTreeMap::new();
    };

    let output = Command::new(&shell)
        .args(["-l", "-c", "env"])
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = match tokio::time::timeout(timeout, output).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            debug!(shell, status = ?output.status.code(), "login shell exited unsuccessfully");
            return BTreeMap::new();
        }
        Ok(Err(err)) => {
            debug!(shell, error = %err, "failed to run login shell");
            return BTreeMap::new();
        }
        Err(_) => {
            debug!(shell, "login shell environment capture timed out");
            return BTreeMap::new();
        }
    };

    parse_env(&String::from_utf8_lossy(&output.stdout))
}

fn parse_env(text: &str) -> BTreeMap<String, String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .filter(|(key, _)| {
            !key.is_empty()
                && !key.contains(char::is_whitespace)
                && !SHELL_LOCAL_VARS.contains(key)
        })
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

/// Subprocess server speaking newline-delimited JSON-RPC over stdin/stdout.
pub struct StdioTransport {
    program: String,
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl std::fmt::Debug for StdioTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioTransport")
            .field("program", &self.program)
            .field("pid", &self.child.id())
            .finish_non_exhaustive()
    }
}

impl StdioTransport {
    /// Spawns the server process.
    ///
    /// # Errors
    ///
    /// Returns [`McpError::Transport`] when the process cannot be started or
    /// its pipes are unavailable.
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &BTreeMap<String, String>,
        cwd: Option<&Path>,
        options: &StdioOptions,
    ) -> McpResult<Self> {
        let mut cmd = Command::new(command);
        if options.inherit_login_env {
            cmd.envs(login_shell_env(options.login_env_timeout).await);
        }
        cmd.envs(env)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|err| McpError::transport(format!("failed to start `{command}`: {err}")))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::transport("server stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::transport("server stdout unavailable"))?;

        if let Some(stderr) = child.stderr.take() {
            let program = command.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(server = %program, "{line}");
                }
            });
        }

        debug!(command, pid = ?child.id(), "spawned mcp server");
        Ok(Self {
            program: command.to_string(),
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }

    async fn write_message(&mut self, message: &JsonRpcRequest) -> McpResult<()> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&mut self, request: JsonRpcRequest) -> McpResult<JsonRpcResponse> {
        self.write_message(&request).await?;

        loop {
            let Some(line) = self.stdout.next_line().await? else {
                return Err(McpError::transport(format!(
                    "`{}` closed its output",
                    self.program
                )));
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_response(line) {
                Ok(Some(response)) if response.id() == request.id() => return Ok(response),
                Ok(Some(response)) => {
                    debug!(expected = ?request.id(), got = ?response.id(), "skipping stale response");
                }
                Ok(None) => debug!(server = %self.program, "ignoring server-initiated message"),
                Err(err) => debug!(server = %self.program, error = %err, "ignoring non-JSON output"),
            }
        }
    }

    async fn notify(&mut self, notification: JsonRpcRequest) -> McpResult<()> {
        self.write_message(&notification).await
    }

    async fn close(&mut self) -> McpResult<()> {
        // Closing stdin asks a well-behaved server to exit.
        let _ = self.stdin.shutdown().await;
        if tokio::time::timeout(CLOSE_GRACE, self.child.wait())
            .await
            .is_err()
        {
            self.child.kill().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_env_drops_shell_local_variables() {
        let env = parse_env(
            "PATH=/usr/bin:/bin\nSHLVL=2\n_=/usr/bin/env\nEMPTY=\nnot a var\nA=b=c\n",
        );
        assert_eq!(env.get("PATH").map(String::as_str), Some("/usr/bin:/bin"));
        assert_eq!(env.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(env.get("A").map(String::as_str), Some("b=c"));
        assert!(!env.contains_key("SHLVL"));
        assert!(!env.contains_key("_"));
        assert_eq!(env.len(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn request_skips_noise_until_matching_id() {
        let script = r#"read line
echo 'starting up'
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
echo '{"jsonrpc":"2.0","id":99,"result":{}}'
echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'
"#;
        let options = StdioOptions::default().with_login_env(false);
        let mut transport = StdioTransport::spawn(
            "sh",
            &["-c".to_string(), script.to_string()],
            &BTreeMap::new(),
            None,
            &options,
        )
        .await
        .unwrap();

        let response = transport
            .request(JsonRpcRequest::new(1, "ping", None))
            .await
            .unwrap();
        assert_eq!(response.into_result().unwrap(), json!({"ok": true}));

        // The script has exited: the next request fails instead of hanging.
        assert!(
            transport
                .request(JsonRpcRequest::new(2, "ping", None))
                .await
                .is_err()
        );
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn spawn_reports_missing_program() {
        let options = StdioOptions::default().with_login_env(false);
        let err = StdioTransport::spawn(
            "devins-missing-mcp-server",
            &[],
            &BTreeMap::new(),
            None,
            &options,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
