use std::{collections::BTreeMap, path::Path};

use async_trait::async_trait;
use displaydoc::Display;
use thiserror::Error;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;

use crate::{
    CommandResult, HistoryEntry, OperationEvent, OperationKind, OperationOptions, PreviewEvent,
    ProjectInfo, ResourceInfo, ResourceUrn, StackInfo, WhoAmI, WorkspaceInfo,
};

#[derive(Debug, Error, Display)]
pub enum EngineError {
    /// {operation} failed: {message}
    Backend {
        operation: &'static str,
        message: String,
    },

    /// failed to decode {what}: {source}
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// failed to read {path}: {source}
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// invalid {what}: {message}
    Invalid { what: &'static str, message: String },
}

/// Runs previews and executions, streaming events back.
///
/// The executor owns each returned channel and closes it when the operation
/// ends. Consumers treat a closed channel as `Done`. Cancelling the token is a
/// request, not a kill: the stream still ends with `Done` or `Error`.
pub trait OperationExecutor: Send + Sync {
    fn preview(
        &self,
        cancel: CancellationToken,
        workdir: &Path,
        stack: &str,
        kind: OperationKind,
        options: OperationOptions,
    ) -> Receiver<PreviewEvent>;

    fn up(
        &self,
        cancel: CancellationToken,
        workdir: &Path,
        stack: &str,
        options: OperationOptions,
    ) -> Receiver<OperationEvent>;

    fn refresh(
        &self,
        cancel: CancellationToken,
        workdir: &Path,
        stack: &str,
        options: OperationOptions,
    ) -> Receiver<OperationEvent>;

    fn destroy(
        &self,
        cancel: CancellationToken,
        workdir: &Path,
        stack: &str,
        options: OperationOptions,
    ) -> Receiver<OperationEvent>;

    fn execute(
        &self,
        kind: OperationKind,
        cancel: CancellationToken,
        workdir: &Path,
        stack: &str,
        options: OperationOptions,
    ) -> Receiver<OperationEvent> {
        match kind {
            OperationKind::Up => self.up(cancel, workdir, stack, options),
            OperationKind::Refresh => self.refresh(cancel, workdir, stack, options),
            OperationKind::Destroy => self.destroy(cancel, workdir, stack, options),
        }
    }
}

#[async_trait]
pub trait StackReader: Send + Sync {
    async fn get_resources(&self, workdir: &Path, stack: &str)
    -> Result<Vec<ResourceInfo>, EngineError>;

    async fn get_history(
        &self,
        workdir: &Path,
        stack: &str,
        page_size: usize,
        page: usize,
    ) -> Result<Vec<HistoryEntry>, EngineError>;

    async fn get_stacks(&self, workdir: &Path) -> Result<Vec<StackInfo>, EngineError>;

    async fn get_whoami(&self, workdir: &Path) -> Result<WhoAmI, EngineError>;

    async fn get_project_info(&self, workdir: &Path) -> Result<ProjectInfo, EngineError>;

    async fn list_stack_files(&self, workdir: &Path) -> Result<Vec<String>, EngineError>;

    async fn find_workspaces(
        &self,
        cwd: &Path,
        workdir: &Path,
    ) -> Result<Vec<WorkspaceInfo>, EngineError>;

    fn is_workspace(&self, path: &Path) -> bool;
}

#[async_trait]
pub trait StateMutator: Send + Sync {
    async fn state_delete(&self, workdir: &Path, stack: &str, urn: &ResourceUrn) -> CommandResult;

    async fn protect(&self, workdir: &Path, stack: &str, urn: &ResourceUrn) -> CommandResult;

    async fn unprotect(&self, workdir: &Path, stack: &str, urn: &ResourceUrn) -> CommandResult;

    async fn import(
        &self,
        workdir: &Path,
        stack: &str,
        resource_type: &str,
        name: &str,
        id: &str,
        parent: Option<&ResourceUrn>,
    ) -> CommandResult;
}

#[async_trait]
pub trait StackInitializer: Send + Sync {
    async fn init_stack(&self, workdir: &Path, name: &str) -> CommandResult;
}

/// Outcome of authenticating one credential plugin.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthenticateResult {
    pub plugin: String,
    pub cached: bool,
    pub env_keys: Vec<String>,
    pub error: Option<String>,
}

impl AuthenticateResult {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Supplies credentials as environment variables.
///
/// Per-plugin failures are reported in the results, not as `Err`.
#[async_trait]
pub trait PluginProvider: Send + Sync {
    async fn initialize(
        &self,
        workdir: &Path,
        program_name: &str,
        stack_name: Option<&str>,
    ) -> Result<Vec<AuthenticateResult>, EngineError>;

    fn get_all_env(&self) -> BTreeMap<String, String>;

    fn invalidate_all_credentials(&self);

    fn invalidate_credentials_for_context(
        &self,
        workdir: &Path,
        stack_name: Option<&str>,
        program_name: &str,
    );
}
