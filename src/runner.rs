//! External command execution.
//!
//! Steps are run as an explicit program plus argument list. Nothing is
//! passed through a shell, so manifest content cannot inject commands.
//! On unix each child runs in its own process group.
//! [`CommandRunner`] is the seam tests replace.

use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;

/// Lines of stderr kept in failure reports
const STDERR_TAIL_LINES: usize = 5;

/// A fully expanded command ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or("")
    }
}

/// Exit status and captured output of a finished command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Stdout followed by stderr
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }

    /// Last few non-empty lines of stderr, joined with " | "
    pub fn stderr_tail(&self) -> String {
        let lines: Vec<&str> = self
            .stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
        lines[start..].join(" | ")
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {}s", .after.as_secs())]
    TimedOut { after: Duration },
}

pub trait CommandRunner: Send + Sync {
    /// Run `command` to completion, failing with [`RunError::TimedOut`] once `timeout` elapses
    fn run<'a>(
        &'a self,
        command: &'a CommandSpec,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, RunError>>;
}

/// Runs commands as real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run<'a>(
        &'a self,
        command: &'a CommandSpec,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<CommandOutput, RunError>> {
        Box::pin(async move {
            let Some((program, args)) = command.argv.split_first() else {
                return Err(RunError::Spawn {
                    program: String::new(),
                    source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
                });
            };

            let mut cmd = tokio::process::Command::new(program);
            cmd.args(args)
                .envs(&command.env)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                // Dropping the wait future on timeout kills the child
                .kill_on_drop(true);
            if let Some(cwd) = &command.cwd {
                cmd.current_dir(cwd);
            }
            // A terminal Ctrl-C goes to the foreground process group. Children
            // get their own group so only scoby sees it and in-flight steps finish.
            #[cfg(unix)]
            cmd.process_group(0);

            tracing::debug!("Running {:?}", command.argv);

            let child = cmd.spawn().map_err(|source| RunError::Spawn {
                program: program.clone(),
                source,
            })?;

            match tokio::time::timeout(timeout, child.wait_with_output()).await {
                Ok(Ok(output)) => Ok(CommandOutput {
                    status: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                }),
                Ok(Err(source)) => Err(RunError::Spawn {
                    program: program.clone(),
                    source,
                }),
                Err(_) => Err(RunError::TimedOut { after: timeout }),
            }
        })
    }
}
