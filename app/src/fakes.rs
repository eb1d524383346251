//! In-memory collaborators for driving the app in tests.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use strata_ctx::{AppContext, Paths};
use strata_engine::{
    AuthenticateResult, CommandResult, EngineError, HistoryEntry, OperationEvent, OperationExecutor,
    OperationOptions, PluginProvider, PreviewEvent, ProjectInfo, ResourceInfo, ResourceUrn,
    StackInfo, StackInitializer, StackReader, StateMutator, WhoAmI, WorkspaceInfo,
};
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;

use crate::{App, AppSettings, Clipboard, Dependencies};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap()
}

#[derive(Default)]
struct ExecutorInner {
    preview_events: Vec<PreviewEvent>,
    operation_events: Vec<OperationEvent>,
    hold: bool,
    held_preview: Option<Sender<PreviewEvent>>,
    held_operation: Option<Sender<OperationEvent>>,
    calls: Vec<(String, OperationOptions)>,
    tokens: Vec<CancellationToken>,
}

/// Replays canned events. Channels close right away unless held open.
#[derive(Default)]
pub struct FakeExecutor(Mutex<ExecutorInner>);

impl FakeExecutor {
    pub fn push_preview(&self, event: PreviewEvent) {
        lock(&self.0).preview_events.push(event);
    }

    pub fn push_operation(&self, event: OperationEvent) {
        lock(&self.0).operation_events.push(event);
    }

    /// Keep the next streams open until [`FakeExecutor::release`].
    pub fn hold_open(&self) {
        lock(&self.0).hold = true;
    }

    pub fn release(&self) {
        let mut inner = lock(&self.0);
        inner.hold = false;
        inner.held_preview = None;
        inner.held_operation = None;
    }

    pub fn calls(&self) -> Vec<(String, OperationOptions)> {
        lock(&self.0).calls.clone()
    }

    pub fn cancelled(&self) -> bool {
        lock(&self.0)
            .tokens
            .last()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn operation(
        &self,
        label: &str,
        cancel: CancellationToken,
        options: OperationOptions,
    ) -> Receiver<OperationEvent> {
        let mut inner = lock(&self.0);
        inner.calls.push((label.to_string(), options));
        inner.tokens.push(cancel);
        let (tx, rx) = mpsc::channel(64);
        for event in inner.operation_events.clone() {
            let _ = tx.try_send(event);
        }
        if inner.hold {
            inner.held_operation = Some(tx);
        }
        rx
    }
}

impl OperationExecutor for FakeExecutor {
    fn preview(
        &self,
        cancel: CancellationToken,
        _workdir: &Path,
        _stack: &str,
        kind: strata_engine::OperationKind,
        options: OperationOptions,
    ) -> Receiver<PreviewEvent> {
        let mut inner = lock(&self.0);
        inner.calls.push((format!("preview {kind}"), options));
        inner.tokens.push(cancel);
        let (tx, rx) = mpsc::channel(64);
        for event in inner.preview_events.clone() {
            let _ = tx.try_send(event);
        }
        if inner.hold {
            inner.held_preview = Some(tx);
        }
        rx
    }

    fn up(
        &self,
        cancel: CancellationToken,
        _workdir: &Path,
        _stack: &str,
        options: OperationOptions,
    ) -> Receiver<OperationEvent> {
        self.operation("up", cancel, options)
    }

    fn refresh(
        &self,
        cancel: CancellationToken,
        _workdir: &Path,
        _stack: &str,
        options: OperationOptions,
    ) -> Receiver<OperationEvent> {
        self.operation("refresh", cancel, options)
    }

    fn destroy(
        &self,
        cancel: CancellationToken,
        _workdir: &Path,
        _stack: &str,
        options: OperationOptions,
    ) -> Receiver<OperationEvent> {
        self.operation("destroy", cancel, options)
    }
}

pub struct FakeReader {
    pub workspace: Mutex<bool>,
    pub stacks: Mutex<Vec<StackInfo>>,
    pub resources: Mutex<Result<Vec<ResourceInfo>, String>>,
    pub history: Mutex<Vec<HistoryEntry>>,
    pub workspaces: Mutex<Vec<WorkspaceInfo>>,
}

impl Default for FakeReader {
    fn default() -> Self {
        Self {
            workspace: Mutex::new(true),
            stacks: Mutex::new(vec![StackInfo::new("dev", true)]),
            resources: Mutex::new(Ok(Vec::new())),
            history: Mutex::new(Vec::new()),
            workspaces: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl StackReader for FakeReader {
    async fn get_resources(
        &self,
        _workdir: &Path,
        _stack: &str,
    ) -> Result<Vec<ResourceInfo>, EngineError> {
        lock(&self.resources)
            .clone()
            .map_err(|message| EngineError::Backend {
                operation: "stack export",
                message,
            })
    }

    async fn get_history(
        &self,
        _workdir: &Path,
        _stack: &str,
        page_size: usize,
        page: usize,
    ) -> Result<Vec<HistoryEntry>, EngineError> {
        let history = lock(&self.history);
        Ok(history
            .iter()
            .skip(page.saturating_sub(1) * page_size)
            .take(page_size)
            .cloned()
            .collect())
    }

    async fn get_stacks(&self, _workdir: &Path) -> Result<Vec<StackInfo>, EngineError> {
        Ok(lock(&self.stacks).clone())
    }

    async fn get_whoami(&self, _workdir: &Path) -> Result<WhoAmI, EngineError> {
        Ok(WhoAmI {
            user: "me".to_string(),
            ..Default::default()
        })
    }

    async fn get_project_info(&self, _workdir: &Path) -> Result<ProjectInfo, EngineError> {
        Ok(ProjectInfo {
            name: "shop".to_string(),
            runtime: "nodejs".to_string(),
            description: None,
        })
    }

    async fn list_stack_files(&self, _workdir: &Path) -> Result<Vec<String>, EngineError> {
        Ok(Vec::new())
    }

    async fn find_workspaces(
        &self,
        _cwd: &Path,
        _workdir: &Path,
    ) -> Result<Vec<WorkspaceInfo>, EngineError> {
        Ok(lock(&self.workspaces).clone())
    }

    fn is_workspace(&self, _path: &Path) -> bool {
        *lock(&self.workspace)
    }
}

/// Succeeds, except for the URNs it was told to fail.
#[derive(Default)]
pub struct FakeMutator {
    failing: BTreeSet<ResourceUrn>,
    calls: Mutex<Vec<String>>,
}

impl FakeMutator {
    pub fn failing<const N: usize>(urns: [&str; N]) -> Self {
        Self {
            failing: urns.into_iter().map(ResourceUrn::from).collect(),
            calls: Mutex::default(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    fn record(&self, action: &str, urn: &ResourceUrn) -> CommandResult {
        lock(&self.calls).push(format!("{action} {urn}"));
        match self.failing.contains(urn) {
            true => CommandResult::failed("resource is protected", ""),
            false => CommandResult::ok(""),
        }
    }
}

#[async_trait]
impl StateMutator for FakeMutator {
    async fn state_delete(&self, _workdir: &Path, _stack: &str, urn: &ResourceUrn) -> CommandResult {
        self.record("delete", urn)
    }

    async fn protect(&self, _workdir: &Path, _stack: &str, urn: &ResourceUrn) -> CommandResult {
        self.record("protect", urn)
    }

    async fn unprotect(&self, _workdir: &Path, _stack: &str, urn: &ResourceUrn) -> CommandResult {
        self.record("unprotect", urn)
    }

    async fn import(
        &self,
        _workdir: &Path,
        _stack: &str,
        resource_type: &str,
        name: &str,
        id: &str,
        _parent: Option<&ResourceUrn>,
    ) -> CommandResult {
        lock(&self.calls).push(format!("import {resource_type} {name} {id}"));
        CommandResult::ok("")
    }
}

#[derive(Default)]
pub struct FakeInitializer {
    pub created: Mutex<Vec<String>>,
}

#[async_trait]
impl StackInitializer for FakeInitializer {
    async fn init_stack(&self, _workdir: &Path, name: &str) -> CommandResult {
        lock(&self.created).push(name.to_string());
        CommandResult::ok("")
    }
}

#[derive(Default)]
pub struct FakePlugins {
    env: Mutex<BTreeMap<String, String>>,
    log: Mutex<Vec<String>>,
}

impl FakePlugins {
    pub fn set_env<const N: usize>(&self, env: [(&str, &str); N]) {
        *lock(&self.env) = env
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
    }

    /// Initializations and invalidations, in order.
    pub fn log(&self) -> Vec<String> {
        lock(&self.log).clone()
    }
}

#[async_trait]
impl PluginProvider for FakePlugins {
    async fn initialize(
        &self,
        _workdir: &Path,
        _program_name: &str,
        stack_name: Option<&str>,
    ) -> Result<Vec<AuthenticateResult>, EngineError> {
        lock(&self.log).push(format!("initialize {}", stack_name.unwrap_or("-")));
        Ok(vec![AuthenticateResult {
            plugin: "fake".to_string(),
            env_keys: lock(&self.env).keys().cloned().collect(),
            ..Default::default()
        }])
    }

    fn get_all_env(&self) -> BTreeMap<String, String> {
        lock(&self.env).clone()
    }

    fn invalidate_all_credentials(&self) {
        lock(&self.log).push("invalidate all".to_string());
    }

    fn invalidate_credentials_for_context(
        &self,
        _workdir: &Path,
        stack_name: Option<&str>,
        _program_name: &str,
    ) {
        lock(&self.log).push(format!("invalidate {}", stack_name.unwrap_or("-")));
    }
}

#[derive(Default)]
pub struct FakeClipboard {
    pub copied: Mutex<Vec<String>>,
}

impl Clipboard for FakeClipboard {
    fn copy(&self, text: &str) -> Result<(), String> {
        lock(&self.copied).push(text.to_string());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct Fakes {
    pub executor: Arc<FakeExecutor>,
    pub reader: Arc<FakeReader>,
    pub mutator: Arc<FakeMutator>,
    pub initializer: Arc<FakeInitializer>,
    pub plugins: Arc<FakePlugins>,
    pub clipboard: Arc<FakeClipboard>,
}

impl Fakes {
    pub fn deps(&self) -> Dependencies {
        Dependencies {
            executor: self.executor.clone(),
            reader: self.reader.clone(),
            mutator: self.mutator.clone(),
            initializer: self.initializer.clone(),
            plugins: self.plugins.clone(),
            clipboard: self.clipboard.clone(),
        }
    }
}

pub fn context(stack: Option<&str>) -> AppContext {
    AppContext::new(
        PathBuf::from("/src"),
        PathBuf::from("/src/infra"),
        stack.map(str::to_owned),
        BTreeMap::from([("HOME".to_string(), "/home/me".to_string())]),
        Paths::new("/c".into(), "/d".into(), "/r".into()),
    )
}

pub fn app_with(fakes: &Fakes, stack: Option<&str>) -> App {
    app_with_settings(fakes, stack, AppSettings::default())
}

pub fn app_with_settings(fakes: &Fakes, stack: Option<&str>, settings: AppSettings) -> App {
    App::new(
        context(stack),
        fakes.deps(),
        settings,
        CancellationToken::new(),
    )
}
