//! External tool invocation
//!
//! The instrumenter, the report generator, and the test runner are all
//! separate programs. Each is described by a [`ToolCommand`] whose arguments
//! may carry `{name}` placeholders that are filled in at call time.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// A program plus its argument template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCommand {
    /// Program to execute (looked up on `PATH` when not a path)
    pub program: String,
    /// Arguments, possibly containing `{name}` placeholders
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Create a command from a program and its arguments
    #[must_use]
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Build a command from a full argv (`program arg...`)
    pub fn from_argv(argv: &[String]) -> HarnessResult<Self> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| HarnessError::config("command must not be empty"))?;
        Ok(Self::new(program.clone(), args.iter().cloned()))
    }

    /// Substitute `{name}` placeholders in every argument
    #[must_use]
    pub fn render(&self, vars: &[(&str, &Path)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{name}}}"), &value.to_string_lossy())
                })
            })
            .collect()
    }

    /// Human-readable command line after substitution
    #[must_use]
    pub fn display(&self, vars: &[(&str, &Path)]) -> String {
        std::iter::once(self.program.clone())
            .chain(self.render(vars))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn validate(&self, what: &str) -> HarnessResult<()> {
        if self.program.trim().is_empty() {
            return Err(HarnessError::config(format!("{what} program must not be empty")));
        }
        Ok(())
    }

    fn to_process(&self, vars: &[(&str, &Path)], cwd: &Path) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(self.render(vars));
        cmd.current_dir(cwd);
        cmd.kill_on_drop(true);
        cmd
    }
}

/// Successful result of an external tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (always 0 for a returned output)
    pub code: i32,
    /// Captured stdout followed by stderr
    pub output: String,
}

/// Run a tool to completion, capturing its output
///
/// A nonzero exit becomes [`HarnessError::CommandFailed`] with the exit code
/// and the captured output. With a `timeout`, the child is killed once it
/// elapses.
pub async fn run_tool(
    command: &ToolCommand,
    vars: &[(&str, &Path)],
    cwd: &Path,
    timeout: Option<Duration>,
) -> HarnessResult<ToolOutput> {
    command.validate("tool")?;
    let command_line = command.display(vars);
    let start = Instant::now();

    let mut cmd = command.to_process(vars, cwd);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());

    debug!(command = %command_line, cwd = %cwd.display(), "running external tool");

    let output = match timeout {
        Some(limit) => tokio::time::timeout(limit, cmd.output())
            .await
            .map_err(|_| HarnessError::Timeout {
                command: command_line.clone(),
                seconds: limit.as_secs(),
            })?,
        None => cmd.output().await,
    }
    .map_err(|source| HarnessError::Spawn {
        command: command_line.clone(),
        source,
    })?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    let code = output.status.code().unwrap_or(-1);

    if !output.status.success() {
        return Err(HarnessError::CommandFailed {
            command: command_line,
            code,
            output: text,
        });
    }

    info!(
        command = %command_line,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "external tool finished"
    );
    Ok(ToolOutput { code, output: text })
}

/// Run a tool with inherited stdio and return once it exits successfully
///
/// Used for the test runner, whose output belongs on the user's terminal.
pub async fn run_inherited(
    command: &ToolCommand,
    vars: &[(&str, &Path)],
    cwd: &Path,
) -> HarnessResult<()> {
    command.validate("runner")?;
    let command_line = command.display(vars);

    let mut cmd = command.to_process(vars, cwd);
    cmd.stdin(Stdio::inherit());
    cmd.stdout(Stdio::inherit());
    cmd.stderr(Stdio::inherit());

    info!(command = %command_line, "launching test runner");

    let status = cmd.status().await.map_err(|source| HarnessError::Spawn {
        command: command_line.clone(),
        source,
    })?;

    if status.success() {
        Ok(())
    } else {
        Err(HarnessError::RunnerFailed {
            command: command_line,
            code: status.code().unwrap_or(-1),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_render_substitutes_placeholders() {
        let cmd = ToolCommand::new("node", ["cli.js", "instrument", "--output", "{output}", "{source}"]);
        let out = PathBuf::from("/work/instrumented");
        let src = PathBuf::from("/work/src");
        let args = cmd.render(&[("output", &out), ("source", &src)]);
        assert_eq!(
            args,
            vec!["cli.js", "instrument", "--output", "/work/instrumented", "/work/src"]
        );
    }

    #[test]
    fn test_render_leaves_unknown_placeholders() {
        let cmd = ToolCommand::new("testem", ["ci", "--file", "{config}", "{other}"]);
        let config = PathBuf::from("/work/testem.json");
        let args = cmd.render(&[("config", &config)]);
        assert_eq!(args, vec!["ci", "--file", "/work/testem.json", "{other}"]);
    }

    #[test]
    fn test_from_argv() {
        let argv = vec!["testem".to_string(), "ci".to_string()];
        let cmd = ToolCommand::from_argv(&argv).unwrap();
        assert_eq!(cmd.program, "testem");
        assert_eq!(cmd.args, vec!["ci"]);
    }

    #[test]
    fn test_from_argv_empty_is_config_error() {
        let err = ToolCommand::from_argv(&[]).unwrap_err();
        assert!(matches!(err, HarnessError::Config { .. }));
    }

    #[test]
    fn test_display() {
        let cmd = ToolCommand::new("node", ["cli.js", "report"]);
        assert_eq!(cmd.display(&[]), "node cli.js report");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_captures_output() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ToolCommand::new("sh", ["-c", "echo out; echo err >&2"]);
        let result = run_tool(&cmd, &[], dir.path(), None).await.unwrap();
        assert_eq!(result.code, 0);
        assert!(result.output.contains("out"));
        assert!(result.output.contains("err"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_nonzero_exit() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ToolCommand::new("sh", ["-c", "echo broken; exit 3"]);
        let err = run_tool(&cmd, &[], dir.path(), None).await.unwrap_err();
        match err {
            HarnessError::CommandFailed { code, output, .. } => {
                assert_eq!(code, 3);
                assert!(output.contains("broken"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_runs_in_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ToolCommand::new("sh", ["-c", "touch marker"]);
        run_tool(&cmd, &[], dir.path(), None).await.unwrap();
        assert!(dir.path().join("marker").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_tool_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ToolCommand::new("sh", ["-c", "sleep 5"]);
        let err = run_tool(&cmd, &[], dir.path(), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_tool_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ToolCommand::new("definitely-not-a-real-tool-xyz", Vec::<String>::new());
        let err = run_tool(&cmd, &[], dir.path(), None).await.unwrap_err();
        assert!(matches!(err, HarnessError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_inherited_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = ToolCommand::new("sh", ["-c", "exit 4"]);
        let err = run_inherited(&cmd, &[], dir.path()).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(4));
    }
}
