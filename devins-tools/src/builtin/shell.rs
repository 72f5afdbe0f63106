use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use devins_primitives::workspace::{ProcessLauncher, ProcessOutput, ProcessSpec};
use tracing::debug;

use crate::registry::{CONTENT_PARAM, Tool, ToolError, ToolInput, ToolOutput, ToolResult};

fn render(command: &str, output: &ProcessOutput) -> ToolResult<ToolOutput> {
    if !output.success() {
        let code = output
            .exit_code
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        let detail = if output.stderr.trim().is_empty() {
            output.stdout.trim()
        } else {
            output.stderr.trim()
        };
        return Err(ToolError::execution(format!(
            "`{command}` exited with {code}: {detail}"
        )));
    }

    let mut text = output.stdout.trim_end().to_string();
    if !output.stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(output.stderr.trim_end());
    }
    Ok(ToolOutput::text(format!("```bash\n$ {command}\n{text}\n```")))
}

fn working_spec(spec: ProcessSpec, input: &ToolInput, timeout: Duration) -> ProcessSpec {
    let spec = spec.timeout(timeout);
    match input.context().workspace_root() {
        Some(root) => spec.cwd(root),
        None => spec,
    }
}

/// `shell`: runs a script through `sh -c` in the workspace root.
pub struct ShellTool {
    launcher: Arc<dyn ProcessLauncher>,
    timeout: Duration,
}

impl ShellTool {
    /// Creates the tool.
    #[must_use]
    pub fn new(launcher: Arc<dyn ProcessLauncher>, timeout: Duration) -> Self {
        Self { launcher, timeout }
    }
}

#[async_trait]
impl Tool for ShellTool {
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        let script = input
            .param(CONTENT_PARAM)
            .filter(|body| !body.trim().is_empty())
            .or_else(|| input.param("command"))
            .map(str::trim)
            .filter(|script| !script.is_empty())
            .ok_or_else(|| ToolError::MissingParameter {
                tool: input.tool().to_string(),
                name: "command".into(),
            })?
            .to_string();

        let spec = working_spec(
            ProcessSpec::new("sh").args(["-c", script.as_str()]),
            &input,
            self.timeout,
        );
        debug!(script = %script, "running shell script");
        let output = self.launcher.run(spec).await?;
        render(&script, &output)
    }
}

/// `run`: executes a program directly, splitting arguments on whitespace.
pub struct RunTool {
    launcher: Arc<dyn ProcessLauncher>,
    timeout: Duration,
}

impl RunTool {
    /// Creates the tool.
    #[must_use]
    pub fn new(launcher: Arc<dyn ProcessLauncher>, timeout: Duration) -> Self {
        Self { launcher, timeout }
    }
}

#[async_trait]
impl Tool for RunTool {
    async fn invoke(&self, input: ToolInput) -> ToolResult<ToolOutput> {
        let command = input.require("command")?.trim().to_string();
        let mut words = command.split_whitespace();
        let program = words.next().unwrap_or_default();
        let mut spec = ProcessSpec::new(program).args(words);
        if let Some(body) = input.param(CONTENT_PARAM) {
            spec = spec.stdin(body);
        }

        let spec = working_spec(spec, &input, self.timeout);
        debug!(program, "running program");
        let output = self.launcher.run(spec).await?;
        render(&command, &output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtin::testing::{RecordingLauncher, input};

    #[tokio::test]
    async fn shell_prefers_body_and_runs_in_workspace() {
        let launcher = Arc::new(RecordingLauncher::default());
        let tool = ShellTool::new(
            Arc::clone(&launcher) as Arc<dyn ProcessLauncher>,
            Duration::from_secs(5),
        );

        let output = tool
            .invoke(input("shell", &[("command", "ignored"), ("content", "echo hi\n")]))
            .await
            .unwrap();
        assert_eq!(output.as_str(), "```bash\n$ echo hi\nsh -c echo hi\n```");

        let specs = launcher.specs.lock().unwrap();
        assert_eq!(specs[0].arg_list(), ["-c", "echo hi"]);
        assert_eq!(specs[0].working_dir().unwrap().to_str(), Some("/work"));
        assert_eq!(specs[0].time_limit(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn shell_without_script_is_missing_parameter() {
        let tool = ShellTool::new(Arc::new(RecordingLauncher::default()), Duration::from_secs(5));
        let err = tool.invoke(input("shell", &[])).await.unwrap_err();
        assert!(matches!(err, ToolError::MissingParameter { name, .. } if name == "command"));
    }

    #[tokio::test]
    async fn run_splits_arguments_and_reports_failure() {
        let launcher = Arc::new(RecordingLauncher {
            exit_code: 2,
            ..RecordingLauncher::default()
        });
        let tool = RunTool::new(
            Arc::clone(&launcher) as Arc<dyn ProcessLauncher>,
            Duration::from_secs(5),
        );

        let err = tool
            .invoke(input("run", &[("command", "cargo test --quiet")]))
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "tool execution failed: `cargo test --quiet` exited with 2: boom"
        );

        let specs = launcher.specs.lock().unwrap();
        assert_eq!(specs[0].program(), "cargo");
        assert_eq!(specs[0].arg_list(), ["test", "--quiet"]);
    }
}
