use std::path::Path;

use async_trait::async_trait;
use strata_cmd::Command;
use strata_engine::{CommandResult, ResourceUrn, StackInitializer, StateMutator};
use tracing::{info, warn};

use crate::PulumiCli;

async fn run(mut command: Command) -> CommandResult {
    match command.output().await {
        Ok(output) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            if output.status.success() {
                info!(command = %command, "state command succeeded");
                CommandResult::ok(stdout)
            } else {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let error = stderr
                    .lines()
                    .map(str::trim)
                    .rfind(|line| !line.is_empty())
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("{command} exited with {}", output.status));
                warn!(command = %command, %error, "state command failed");
                CommandResult::failed(error, stdout)
            }
        }
        Err(error) => {
            warn!(%error, "state command could not start");
            CommandResult::failed(error.summary(), String::new())
        }
    }
}

impl PulumiCli {
    fn state_command(&self, workdir: &Path, action: &str, stack: &str, urn: &ResourceUrn) -> Command {
        let mut command = self.command(workdir);
        command
            .args(["state", action, urn.as_str()])
            .args(["--stack", stack, "--yes", "--non-interactive"]);
        command
    }
}

#[async_trait]
impl StateMutator for PulumiCli {
    async fn state_delete(&self, workdir: &Path, stack: &str, urn: &ResourceUrn) -> CommandResult {
        run(self.state_command(workdir, "delete", stack, urn)).await
    }

    async fn protect(&self, workdir: &Path, stack: &str, urn: &ResourceUrn) -> CommandResult {
        run(self.state_command(workdir, "protect", stack, urn)).await
    }

    async fn unprotect(&self, workdir: &Path, stack: &str, urn: &ResourceUrn) -> CommandResult {
        run(self.state_command(workdir, "unprotect", stack, urn)).await
    }

    async fn import(
        &self,
        workdir: &Path,
        stack: &str,
        resource_type: &str,
        name: &str,
        id: &str,
        parent: Option<&ResourceUrn>,
    ) -> CommandResult {
        let mut command = self.command(workdir);
        command
            .args(["import", resource_type, name, id])
            .args(["--stack", stack, "--yes", "--non-interactive"]);
        if let Some(parent) = parent {
            command.arg("--parent").arg(format!("parent={parent}"));
        }
        run(command).await
    }
}

#[async_trait]
impl StackInitializer for PulumiCli {
    async fn init_stack(&self, workdir: &Path, name: &str) -> CommandResult {
        let mut command = self.command(workdir);
        command.args(["stack", "init", name, "--non-interactive"]);
        run(command).await
    }
}
