use std::path::PathBuf;

use strata_engine::{AuthenticateResult, ProjectInfo, ResourceInfo, StackInfo, WhoAmI};
use tracing::{debug, info, warn};

use crate::{
    App,
    command::{Command, Invalidate, StackListFor},
    convert::{StackInitAction, convert_stacks_to_items, determine_stack_init_action},
    item::ResourceItem,
    message::{AuthPurpose, InitMessage, SelectionMessage},
    state::{InitState, OperationState, PendingOperation},
    ui::{Focus, ToastLevel, ViewMode},
};

impl App {
    /// The commands that kick off startup.
    pub fn start(&mut self) -> Vec<Command> {
        info!(workdir = %self.ctx.workdir().display(), "checking workspace");
        vec![Command::CheckWorkspace {
            workdir: self.ctx.workdir().to_owned(),
        }]
    }

    pub(crate) fn set_init_state(&mut self, next: InitState) {
        if self.state.init_state != next {
            debug!(from = ?self.state.init_state, to = ?next, "init transition");
            self.state.init_state = next;
        }
    }

    /// Unrecoverable for this attempt: show it and hand control to the user.
    pub(crate) fn init_failed(&mut self, error: String) -> Vec<Command> {
        warn!(%error, state = ?self.state.init_state, "initialization failed");
        self.state.err = Some(error);
        self.set_init_state(InitState::Complete);
        self.ui.focus.push(Focus::ErrorModal);
        Vec::new()
    }

    pub(crate) fn handle_init_message(&mut self, message: InitMessage) -> Vec<Command> {
        match message {
            InitMessage::WorkspaceChecked { valid } => self.on_workspace_checked(valid),
            InitMessage::PluginsLoaded {
                purpose,
                ticket,
                result,
            } => self.on_plugins_loaded(purpose, ticket, result),
            InitMessage::StacksLoaded(result) => self.on_init_stacks_loaded(result),
            InitMessage::ProjectInfoLoaded(result) => self.on_project_info(result),
            InitMessage::WhoAmILoaded(result) => self.on_whoami(result),
            InitMessage::ResourcesLoaded {
                during_init,
                result,
            } => self.on_resources_loaded(during_init, result),
        }
    }

    fn on_workspace_checked(&mut self, valid: bool) -> Vec<Command> {
        if valid {
            self.set_init_state(InitState::LoadingPlugins);
            return self.begin_auth(AuthPurpose::Initial, Invalidate::Nothing);
        }
        warn!(workdir = %self.ctx.workdir().display(), "not a workspace");
        self.open_workspace_selector()
    }

    fn begin_auth(&mut self, purpose: AuthPurpose, invalidate: Invalidate) -> Vec<Command> {
        let ticket = self.state.set_busy("authenticating");
        vec![Command::Authenticate {
            workdir: self.ctx.workdir().to_owned(),
            program_name: self.ctx.program_name().to_owned(),
            stack: self.ctx.stack().map(str::to_owned),
            purpose,
            invalidate,
            ticket,
        }]
    }

    fn on_plugins_loaded(
        &mut self,
        purpose: AuthPurpose,
        ticket: u64,
        result: Result<Vec<AuthenticateResult>, String>,
    ) -> Vec<Command> {
        // A newer authentication took the lock. Its own reply releases it.
        if !self.state.holds_busy(ticket) {
            debug!(?purpose, ticket, "ignoring superseded credentials");
            return Vec::new();
        }
        let mut commands = Vec::new();
        match result {
            Ok(results) => {
                let failed: Vec<_> = results.iter().filter(|result| !result.is_ok()).collect();
                info!(
                    ?purpose,
                    plugins = results.len(),
                    failed = failed.len(),
                    "credentials loaded"
                );
                for result in failed {
                    let error = result.error.as_deref().unwrap_or("unknown error");
                    warn!(plugin = %result.plugin, %error, "plugin failed");
                    let message = format!("plugin {}: {error}", result.plugin);
                    commands.push(self.toast(ToastLevel::Warning, message));
                }
                if purpose == AuthPurpose::Explicit {
                    commands.push(self.toast(ToastLevel::Info, "credentials refreshed"));
                }
            }
            Err(error) => {
                warn!(?purpose, %error, "credential plugins failed");
                let message = format!("credential plugins failed: {error}");
                commands.push(self.toast(ToastLevel::Warning, message));
            }
        }

        let pending = self.state.clear_busy();
        if purpose == AuthPurpose::Initial && self.state.init_state == InitState::LoadingPlugins {
            if self.ctx.stack().is_some() {
                commands.extend(self.proceed_with_stack());
            } else {
                self.set_init_state(InitState::LoadingStacks);
                commands.push(Command::FetchStacks {
                    workdir: self.ctx.workdir().to_owned(),
                    purpose: StackListFor::Init,
                });
            }
        }
        commands.extend(self.run_pending(pending));
        commands
    }

    /// A stack is known: load everything about it, under its own credentials.
    fn proceed_with_stack(&mut self) -> Vec<Command> {
        self.set_init_state(InitState::LoadingResources);
        let workdir = self.ctx.workdir().to_owned();
        let mut commands = vec![
            Command::FetchProjectInfo {
                workdir: workdir.clone(),
            },
            Command::FetchWhoAmI { workdir },
        ];
        commands.extend(self.begin_auth(AuthPurpose::StackContext, Invalidate::Nothing));
        self.state
            .queue_operation(PendingOperation::InitLoadResources);
        commands
    }

    fn on_init_stacks_loaded(&mut self, result: Result<Vec<StackInfo>, String>) -> Vec<Command> {
        let stacks = match result {
            Ok(stacks) => stacks,
            Err(error) => return self.init_failed(format!("failed to list stacks: {error}")),
        };
        let converted = convert_stacks_to_items(&stacks);
        let action = determine_stack_init_action(
            self.state.init_state,
            converted.items.len(),
            converted.current_stack_name.as_deref(),
        );
        debug!(?action, stacks = converted.items.len(), "stack list loaded");

        match action {
            StackInitAction::None => Vec::new(),
            StackInitAction::ShowInit => {
                self.set_init_state(InitState::SelectingStack);
                self.ui.stack_name_input.clear();
                self.ui.focus.push(Focus::StackInitModal);
                Vec::new()
            }
            StackInitAction::ShowSelector => {
                self.set_init_state(InitState::SelectingStack);
                self.ui.stacks.set_items(converted.items, 0);
                self.ui.focus.push(Focus::StackSelector);
                Vec::new()
            }
            StackInitAction::Proceed => {
                let selected = converted
                    .items
                    .iter()
                    .position(|item| item.current)
                    .unwrap_or_default();
                if let Some(name) = converted.current_stack_name {
                    self.ctx.set_stack(name);
                }
                self.ui.stacks.set_items(converted.items, selected);
                self.proceed_with_stack()
            }
        }
    }

    fn on_project_info(&mut self, result: Result<ProjectInfo, String>) -> Vec<Command> {
        match result {
            Ok(project) => {
                debug!(name = %project.name, runtime = %project.runtime, "project loaded");
                if !project.name.is_empty() {
                    self.ctx.set_program_name(project.name.clone());
                }
                self.ui.project = Some(project);
                Vec::new()
            }
            Err(error) => {
                warn!(%error, "failed to read project");
                vec![self.toast(ToastLevel::Warning, format!("failed to read project: {error}"))]
            }
        }
    }

    fn on_whoami(&mut self, result: Result<WhoAmI, String>) -> Vec<Command> {
        match result {
            Ok(whoami) => {
                debug!(user = %whoami.user, "backend identity loaded");
                self.ui.whoami = Some(whoami);
                Vec::new()
            }
            Err(error) => {
                warn!(%error, "whoami failed");
                vec![self.toast(ToastLevel::Warning, format!("whoami failed: {error}"))]
            }
        }
    }

    fn on_resources_loaded(
        &mut self,
        during_init: bool,
        result: Result<Vec<ResourceInfo>, String>,
    ) -> Vec<Command> {
        match result {
            Ok(resources) => {
                info!(resources = resources.len(), during_init, "resources loaded");
                self.ui
                    .resources
                    .replace_all(resources.into_iter().map(ResourceItem::from));
                self.ui.clamp_cursor();
                if during_init && self.state.init_state == InitState::LoadingResources {
                    self.set_init_state(InitState::Complete);
                }
                Vec::new()
            }
            Err(error) if during_init => {
                self.init_failed(format!("failed to load resources: {error}"))
            }
            Err(error) => {
                warn!(%error, "failed to reload resources");
                let message = format!("failed to load resources: {error}");
                vec![self.toast(ToastLevel::Error, message)]
            }
        }
    }

    /// Queue the load while credentials are in flight, otherwise load now.
    pub(crate) fn request_load_resources(&mut self, during_init: bool) -> Vec<Command> {
        if self.state.is_busy() {
            self.state.queue_operation(match during_init {
                true => PendingOperation::InitLoadResources,
                false => PendingOperation::LoadResources,
            });
            return Vec::new();
        }
        match self.ctx.stack() {
            Some(stack) => vec![Command::LoadResources {
                workdir: self.ctx.workdir().to_owned(),
                stack: stack.to_owned(),
                during_init,
            }],
            None => Vec::new(),
        }
    }

    /// Turn drained operations back into commands. Anything that finds the
    /// lock taken again goes back in the queue.
    pub(crate) fn run_pending(&mut self, pending: Vec<PendingOperation>) -> Vec<Command> {
        let mut commands = Vec::new();
        for op in pending {
            if self.state.is_busy() {
                self.state.queue_operation(op);
                continue;
            }
            debug!(?op, "running queued operation");
            match op {
                PendingOperation::Preview(kind) => commands.extend(self.start_preview(kind)),
                PendingOperation::LoadResources => {
                    commands.extend(self.request_load_resources(false))
                }
                PendingOperation::InitLoadResources => {
                    commands.extend(self.finish_initial_load())
                }
            }
        }
        commands
    }

    fn finish_initial_load(&mut self) -> Vec<Command> {
        let Some(kind) = self.settings.initial_operation else {
            return self.request_load_resources(true);
        };
        let mut commands = self.request_load_resources(false);
        commands.extend(self.start_preview(kind));
        // The preview finishing is what completes startup.
        if self.state.op_state != OperationState::Starting {
            self.set_init_state(InitState::Complete);
        }
        commands
    }

    pub(crate) fn handle_selection_message(&mut self, message: SelectionMessage) -> Vec<Command> {
        match message {
            SelectionMessage::StacksLoaded(Ok(stacks)) => {
                let converted = convert_stacks_to_items(&stacks);
                let current = self.ctx.stack().map(str::to_owned);
                let selected = converted
                    .items
                    .iter()
                    .position(|item| Some(&item.name) == current.as_ref())
                    .unwrap_or_default();
                self.ui.stacks.set_items(converted.items, selected);
                Vec::new()
            }
            SelectionMessage::StacksLoaded(Err(error)) => {
                warn!(%error, "failed to list stacks");
                self.ui.stacks.set_error(error.clone());
                vec![self.toast(ToastLevel::Error, format!("failed to list stacks: {error}"))]
            }
            SelectionMessage::WorkspacesLoaded(Ok(workspaces)) => {
                let selected = workspaces
                    .iter()
                    .position(|workspace| workspace.current)
                    .unwrap_or_default();
                debug!(workspaces = workspaces.len(), "workspaces found");
                self.ui.workspaces.set_items(workspaces, selected);
                Vec::new()
            }
            SelectionMessage::WorkspacesLoaded(Err(error)) => {
                self.ui.workspaces.set_error(error.clone());
                if self.state.init_state == InitState::CheckingWorkspace {
                    self.ui.focus.remove(Focus::WorkspaceSelector);
                    return self.init_failed(format!("failed to find workspaces: {error}"));
                }
                warn!(%error, "failed to find workspaces");
                vec![self.toast(ToastLevel::Error, format!("failed to find workspaces: {error}"))]
            }
            SelectionMessage::StackInitialized { name, result } => {
                self.ui.focus.remove(Focus::StackInitModal);
                if result.success {
                    info!(stack = %name, "stack created");
                    let mut commands =
                        vec![self.toast(ToastLevel::Success, format!("created stack {name}"))];
                    commands.extend(self.select_stack(name));
                    return commands;
                }
                let error = result
                    .error
                    .unwrap_or_else(|| "stack init failed".to_string());
                let error = format!("failed to create stack {name}: {error}");
                if self.state.init_state != InitState::Complete {
                    return self.init_failed(error);
                }
                warn!(%error, "stack init failed");
                vec![self.toast(ToastLevel::Error, error)]
            }
        }
    }

    pub(crate) fn open_workspace_selector(&mut self) -> Vec<Command> {
        self.ui.workspaces.start_loading();
        self.ui.focus.push(Focus::WorkspaceSelector);
        vec![Command::FetchWorkspaces {
            cwd: self.ctx.cwd().to_owned(),
            workdir: self.ctx.workdir().to_owned(),
        }]
    }

    pub(crate) fn open_stack_selector(&mut self) -> Vec<Command> {
        self.ui.stacks.start_loading();
        self.ui.focus.push(Focus::StackSelector);
        vec![Command::FetchStacks {
            workdir: self.ctx.workdir().to_owned(),
            purpose: StackListFor::Selector,
        }]
    }

    pub(crate) fn open_stack_init(&mut self) -> Vec<Command> {
        self.ui.stack_name_input.clear();
        self.ui.focus.push(Focus::StackInitModal);
        Vec::new()
    }

    pub(crate) fn create_stack(&mut self) -> Vec<Command> {
        let name = self.ui.stack_name_input.trim().to_owned();
        if name.is_empty() {
            return vec![self.toast(ToastLevel::Warning, "stack name is required")];
        }
        info!(stack = %name, "creating stack");
        vec![Command::InitStack {
            workdir: self.ctx.workdir().to_owned(),
            name,
        }]
    }

    pub(crate) fn select_stack(&mut self, name: String) -> Vec<Command> {
        self.ui.focus.remove(Focus::StackSelector);
        self.ui.focus.remove(Focus::StackInitModal);
        if self.state.op_state.is_active() {
            return vec![self.toast(ToastLevel::Warning, "wait for the operation to finish")];
        }
        info!(stack = %name, "stack selected");
        self.ctx.set_stack(name);
        self.state.err = None;

        if self.state.init_state != InitState::Complete {
            return self.proceed_with_stack();
        }

        self.state.operation = None;
        self.set_op_state(OperationState::Idle);
        self.ui.resources.clear();
        self.ui.reset_operation();
        self.ui.set_view(ViewMode::Stack);
        self.ui.history.clear();

        let mut commands = self.begin_auth(AuthPurpose::StackContext, Invalidate::Nothing);
        self.state.queue_operation(PendingOperation::LoadResources);
        commands.push(Command::FetchProjectInfo {
            workdir: self.ctx.workdir().to_owned(),
        });
        commands
    }

    /// Start over in another workspace, with fresh credentials.
    pub(crate) fn select_workspace(&mut self, workdir: PathBuf) -> Vec<Command> {
        self.ui.focus.remove(Focus::WorkspaceSelector);
        if self.state.op_state.is_active() {
            return vec![self.toast(ToastLevel::Warning, "wait for the operation to finish")];
        }
        info!(workdir = %workdir.display(), "workspace selected");
        self.ctx.set_workdir(workdir);
        self.state.err = None;
        self.state.operation = None;
        self.set_op_state(OperationState::Idle);
        self.ui.focus.remove(Focus::ErrorModal);
        self.ui.resources.clear();
        self.ui.reset_operation();
        self.ui.history.clear();
        self.ui.project = None;
        self.ui.set_view(ViewMode::Stack);

        self.set_init_state(InitState::LoadingPlugins);
        self.begin_auth(AuthPurpose::Initial, Invalidate::All)
    }

    /// The user closed a picker that startup was waiting on.
    pub(crate) fn abort_selection(&mut self, focus: Focus) -> Vec<Command> {
        self.ui.focus.remove(focus);
        let waiting = match focus {
            Focus::WorkspaceSelector => self.state.init_state == InitState::CheckingWorkspace,
            Focus::StackSelector | Focus::StackInitModal => {
                self.state.init_state == InitState::SelectingStack
            }
            _ => false,
        };
        if !waiting {
            return Vec::new();
        }
        info!(?focus, "selection aborted during startup");
        self.set_init_state(InitState::Complete);
        vec![self.toast(ToastLevel::Info, "no stack loaded, press s or w to pick one")]
    }

    pub(crate) fn reauthenticate(&mut self) -> Vec<Command> {
        if self.state.is_busy() {
            return vec![self.toast(ToastLevel::Info, "already authenticating")];
        }
        info!("refreshing credentials");
        self.begin_auth(AuthPurpose::Explicit, Invalidate::Context)
    }
}
