// External command execution with a hard timeout.
// Every fetch goes through `CommandRunner` so tests can script tool output.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::instrument;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("{program} could not be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("{program} exited with {}: {stderr}", exit_label(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "signal".to_string(),
    }
}

impl CommandError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, CommandError::TimedOut { .. })
    }
}

/// One invocation of an external tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    /// Extra environment variables, applied on top of the inherited environment.
    pub env: Vec<(String, String)>,
    pub timeout: Duration,
    /// Return stdout even on a non-zero exit, as long as stdout is non-empty.
    pub accept_partial_output: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: Vec::new(),
            timeout,
            accept_partial_output: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn accept_partial_output(mut self) -> Self {
        self.accept_partial_output = true;
        self
    }

    /// `program arg1 arg2`, for logs and test matching.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

pub trait CommandRunner: Send + Sync + 'static {
    /// Runs the command and returns its stdout.
    fn run(&self, spec: &CommandSpec) -> impl Future<Output = Result<String, CommandError>> + Send;
}

fn env_pairs(spec: &CommandSpec) -> impl Iterator<Item = (&str, &str)> {
    spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
}

/// Runs commands as real child processes.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    #[instrument(skip(self, spec), fields(command = %spec.display(), timeout_ms = spec.timeout.as_millis() as u64))]
    async fn run(&self, spec: &CommandSpec) -> Result<String, CommandError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .envs(env_pairs(spec))
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        // On timeout the child is dropped here and kill_on_drop reaps it.
        let output = match timeout(spec.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| CommandError::Spawn {
                program: spec.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(CommandError::TimedOut {
                    program: spec.program.clone(),
                    timeout: spec.timeout,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            return Ok(stdout);
        }
        if spec.accept_partial_output && !stdout.trim().is_empty() {
            tracing::debug!(
                code = ?output.status.code(),
                "non-zero exit with output; keeping output"
            );
            return Ok(stdout);
        }
        Err(CommandError::Failed {
            program: spec.program.clone(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}
