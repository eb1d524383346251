use std::fmt::Display;
use std::path::Path;
use std::process::Stdio;
use std::{ffi::OsStr, process::Output};
use tokio::process::{Child, Command as BaseCommand};
use tracing::debug;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("failed to spawn command: {command}")]
    Spawn {
        command: String,
        #[source]
        error: tokio::io::Error,
    },

    #[error("command failed: {command}\n{stderr}")]
    Failure { command: String, stderr: String },

    #[error("failed to signal process {pid}: {message}")]
    Signal { pid: u32, message: String },
}

impl CommandError {
    /// The most useful single line for a notification.
    pub fn summary(&self) -> String {
        match self {
            CommandError::Failure { stderr, command } => last_line(stderr)
                .map(str::to_owned)
                .unwrap_or_else(|| format!("command failed: {command}")),
            other => other.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct Command {
    cmd: BaseCommand,
}

impl Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let cmd = self.cmd.as_std();
        let program = cmd.get_program().to_string_lossy();
        let args = cmd
            .get_args()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ");
        if args.is_empty() {
            write!(f, "{program}",)
        } else {
            write!(f, "{program} {args}",)
        }
    }
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Self {
        Self {
            cmd: BaseCommand::new(program),
        }
    }

    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.cmd.arg(arg);
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.cmd.args(args);
        self
    }

    pub fn env<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.cmd.env(key, value);
        self
    }

    pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        self.cmd.envs(vars);
        self
    }

    pub fn current_dir<P: AsRef<Path>>(&mut self, dir: P) -> &mut Command {
        self.cmd.current_dir(dir);
        self
    }

    /// Spawn with piped output and no stdin. The child is killed if its
    /// handle is dropped.
    pub fn spawn(&mut self) -> Result<Child, CommandError> {
        debug!(command = %self, "spawning");
        self.cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|error| CommandError::Spawn {
                command: self.to_string(),
                error,
            })
    }

    pub async fn output(&mut self) -> Result<Output, CommandError> {
        debug!(command = %self, "running");
        self.cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|error| CommandError::Spawn {
                command: self.to_string(),
                error,
            })
    }

    pub async fn run(&mut self) -> Result<Output, CommandError> {
        self.output().await.and_then(|out| {
            if out.status.success() {
                Ok(out)
            } else {
                Err(CommandError::Failure {
                    command: self.to_string(),
                    stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                })
            }
        })
    }

    /// Run to success and return stdout as text.
    pub async fn run_stdout(&mut self) -> Result<String, CommandError> {
        let output = self.run().await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Ask a child to stop the way a terminal would (SIGINT), letting it clean up.
#[cfg(unix)]
pub fn interrupt(child: &mut Child) -> Result<(), CommandError> {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        // Already reaped.
        return Ok(());
    };
    let raw = i32::try_from(pid).map_err(|error| CommandError::Signal {
        pid,
        message: error.to_string(),
    })?;
    kill(Pid::from_raw(raw), Signal::SIGINT).map_err(|error| CommandError::Signal {
        pid,
        message: error.to_string(),
    })
}

#[cfg(not(unix))]
pub fn interrupt(child: &mut Child) -> Result<(), CommandError> {
    let pid = child.id().unwrap_or_default();
    child.start_kill().map_err(|error| CommandError::Signal {
        pid,
        message: error.to_string(),
    })
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_command() {
        assert_eq!(Command::new("pulumi").to_string(), "pulumi")
    }

    #[test]
    fn test_get_command_with_two_args() {
        assert_eq!(
            Command::new("pulumi").arg("stack").arg("ls").to_string(),
            "pulumi stack ls"
        )
    }

    #[test]
    fn test_failure_summary_uses_last_stderr_line() {
        let error = CommandError::Failure {
            command: "pulumi stack ls".to_string(),
            stderr: "warning: old cli\nerror: no Pulumi.yaml project file found\n\n".to_string(),
        };
        assert_eq!(error.summary(), "error: no Pulumi.yaml project file found");
    }
}
