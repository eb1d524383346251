use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use strata_engine::{CommandResult, HistoryEntry, OperationKind, ResourceUrn, StepOp};
use tracing::{debug, info, warn};

use crate::{
    App,
    bulk::BulkDeleteReport,
    command::{Command, ImportRequest},
    convert::{EscapeAction, convert_history, determine_escape_action},
    message::{Message, OperationMessage, UiMessage},
    state::{FlagKind, ProtectAction},
    ui::{ConfirmAction, ConfirmModal, Focus, ImportForm, ToastLevel, ViewMode},
};

/// The stack's root resource, which state commands must not touch.
const STACK_RESOURCE_TYPE: &str = "pulumi:pulumi:Stack";

impl App {
    /// Apply one message and return the side effects it asks for.
    pub fn update(&mut self, message: Message) -> Vec<Command> {
        match message {
            Message::Key(key) => self.on_key(key),
            Message::Resize => Vec::new(),
            Message::Init(message) => self.handle_init_message(message),
            Message::Operation(message) => self.handle_operation_message(message),
            Message::Selection(message) => self.handle_selection_message(message),
            Message::Ui(message) => self.handle_ui_message(message),
        }
    }

    pub(crate) fn toast(&mut self, level: ToastLevel, message: impl Into<String>) -> Command {
        let id = self.ui.push_toast(level, message.into());
        Command::ExpireToast {
            id,
            after: self.settings.toast_duration,
        }
    }

    fn handle_ui_message(&mut self, message: UiMessage) -> Vec<Command> {
        match message {
            UiMessage::Tick => {
                self.ui.tick();
                Vec::new()
            }
            UiMessage::ToastExpired(id) => {
                self.ui.expire_toast(id);
                Vec::new()
            }
            UiMessage::Copied(Ok(text)) => vec![self.toast(ToastLevel::Info, format!("copied {text}"))],
            UiMessage::Copied(Err(error)) => {
                warn!(%error, "clipboard unavailable");
                vec![self.toast(ToastLevel::Warning, format!("copy failed: {error}"))]
            }
        }
    }

    fn handle_operation_message(&mut self, message: OperationMessage) -> Vec<Command> {
        match message {
            OperationMessage::Preview { generation, event } => {
                self.on_preview_event(generation, event)
            }
            OperationMessage::Execute { generation, event } => {
                self.on_execute_event(generation, event)
            }
            OperationMessage::CancelTimedOut { generation } => self.on_cancel_timeout(generation),
            OperationMessage::HistoryLoaded { page, result } => {
                self.on_history_loaded(page, result)
            }
            OperationMessage::BulkDeleteFinished(report) => self.on_bulk_delete_finished(report),
            OperationMessage::ProtectFinished {
                urn,
                protect,
                result,
            } => self.on_protect_finished(urn, protect, result),
            OperationMessage::ImportFinished { name, result } => {
                self.on_import_finished(name, result)
            }
        }
    }

    fn on_key(&mut self, key: KeyEvent) -> Vec<Command> {
        if key.kind == KeyEventKind::Release {
            return Vec::new();
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            return self.quit_app();
        }
        match self.ui.focus.top() {
            Focus::Main => self.on_main_key(key),
            Focus::ErrorModal => self.on_error_modal_key(key),
            Focus::ConfirmModal => self.on_confirm_key(key),
            Focus::ImportModal => self.on_import_key(key),
            Focus::StackInitModal => self.on_stack_init_key(key),
            Focus::WorkspaceSelector => self.on_workspace_selector_key(key),
            Focus::StackSelector => self.on_stack_selector_key(key),
            Focus::Help => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('?' | 'q')) {
                    self.ui.focus.remove(Focus::Help);
                }
                Vec::new()
            }
            Focus::Details => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q')) {
                    self.ui.focus.remove(Focus::Details);
                }
                Vec::new()
            }
        }
    }

    fn quit_app(&mut self) -> Vec<Command> {
        info!("quitting");
        self.operation.abandon();
        self.quit = true;
        Vec::new()
    }

    fn on_main_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match (key.code, ctrl) {
            (KeyCode::Char('q'), _) => self.quit_app(),
            (KeyCode::Char('j') | KeyCode::Down, _) => {
                self.ui.move_cursor(1);
                Vec::new()
            }
            (KeyCode::Char('k') | KeyCode::Up, _) => {
                self.ui.move_cursor(-1);
                Vec::new()
            }
            (KeyCode::Char(' '), _) => {
                self.ui.toggle_collapsed();
                Vec::new()
            }
            (KeyCode::Enter, _) => {
                if self.ui.view != ViewMode::History && self.ui.selected_item().is_some() {
                    self.ui.focus.push(Focus::Details);
                }
                Vec::new()
            }
            (KeyCode::Char('T'), _) => self.flag_selection(Some(FlagKind::Target)),
            (KeyCode::Char('R'), _) => self.flag_selection(Some(FlagKind::Replace)),
            (KeyCode::Char('E'), _) => self.flag_selection(Some(FlagKind::Exclude)),
            (KeyCode::Char('C'), _) => self.flag_selection(None),
            (KeyCode::Char('v'), _) => {
                self.ui.visual_anchor = match self.ui.visual_anchor {
                    Some(_) => None,
                    None if self.ui.view != ViewMode::History => Some(self.ui.cursor),
                    None => None,
                };
                Vec::new()
            }
            (KeyCode::Char('u'), false) => self.start_preview(OperationKind::Up),
            (KeyCode::Char('r'), false) => self.start_preview(OperationKind::Refresh),
            (KeyCode::Char('d'), false) => self.start_preview(OperationKind::Destroy),
            (KeyCode::Char('u'), true) => self.maybe_confirm_execution(OperationKind::Up),
            (KeyCode::Char('r'), true) => self.maybe_confirm_execution(OperationKind::Refresh),
            (KeyCode::Char('d'), true) => self.maybe_confirm_execution(OperationKind::Destroy),
            (KeyCode::Char('x'), _) => self.confirm_bulk_delete(),
            (KeyCode::Char('P'), _) => self.confirm_protect(),
            (KeyCode::Char('I'), _) => self.open_import(),
            (KeyCode::Char('s'), _) => self.open_stack_selector(),
            (KeyCode::Char('w'), _) => self.open_workspace_selector(),
            (KeyCode::Char('A'), _) => self.reauthenticate(),
            (KeyCode::Char('h'), _) => self.show_history(1),
            (KeyCode::Char('['), _) if self.ui.view == ViewMode::History => {
                match self.ui.history_page {
                    0 | 1 => Vec::new(),
                    page => self.show_history(page - 1),
                }
            }
            (KeyCode::Char(']'), _) if self.ui.view == ViewMode::History => {
                if self.ui.history.len() < self.settings.history_page_size {
                    return Vec::new();
                }
                self.show_history(self.ui.history_page + 1)
            }
            (KeyCode::Char('y'), _) => match self.ui.selected_item() {
                Some(item) if self.ui.view != ViewMode::History => {
                    vec![Command::CopyToClipboard(item.urn.to_string())]
                }
                _ => Vec::new(),
            },
            (KeyCode::Char('?'), _) => {
                self.ui.focus.push(Focus::Help);
                Vec::new()
            }
            (KeyCode::Esc, _) => self.escape(),
            _ => Vec::new(),
        }
    }

    fn escape(&mut self) -> Vec<Command> {
        let action =
            determine_escape_action(self.ui.view, self.state.op_state, self.ui.is_visual());
        debug!(?action, "escape");
        match action {
            EscapeAction::ExitVisualMode => {
                self.ui.visual_anchor = None;
                Vec::new()
            }
            EscapeAction::CancelOp => self.cancel_operation(),
            EscapeAction::NavigateBack => {
                self.ui.set_view(ViewMode::Stack);
                Vec::new()
            }
            EscapeAction::None => Vec::new(),
        }
    }

    /// Toggle one flag on every selected resource, or clear them all.
    fn flag_selection(&mut self, kind: Option<FlagKind>) -> Vec<Command> {
        if self.ui.view == ViewMode::History {
            return Vec::new();
        }
        let urns = self.ui.selected_urns();
        for urn in &urns {
            match kind {
                Some(kind) => self.state.toggle_flag(urn, kind),
                None => self.state.clear_flags(urn),
            }
        }
        debug!(?kind, resources = urns.len(), flagged = self.state.flags.len(), "flags changed");
        self.ui.visual_anchor = None;
        Vec::new()
    }

    fn on_error_modal_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Esc | KeyCode::Enter | KeyCode::Char('q') => {
                self.ui.focus.remove(Focus::ErrorModal);
                Vec::new()
            }
            KeyCode::Char('w') => {
                self.ui.focus.remove(Focus::ErrorModal);
                self.open_workspace_selector()
            }
            KeyCode::Char('s') => {
                self.ui.focus.remove(Focus::ErrorModal);
                self.open_stack_selector()
            }
            _ => Vec::new(),
        }
    }

    fn on_confirm_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Char('y') | KeyCode::Enter => self.accept_confirm(),
            KeyCode::Char('n') | KeyCode::Esc => {
                self.reject_confirm();
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn accept_confirm(&mut self) -> Vec<Command> {
        self.ui.focus.remove(Focus::ConfirmModal);
        let Some(modal) = self.ui.confirm.take() else {
            return Vec::new();
        };
        match modal.action {
            ConfirmAction::Execute(kind) => self.start_execution(kind),
            ConfirmAction::BulkDelete(urns) => self.run_bulk_delete(urns),
            ConfirmAction::Protect => match self.state.pending_protect_action.take() {
                Some(action) => self.run_protect(action),
                None => Vec::new(),
            },
        }
    }

    fn reject_confirm(&mut self) {
        self.ui.focus.remove(Focus::ConfirmModal);
        self.ui.confirm = None;
        self.state.pending_operation = None;
        self.state.pending_protect_action = None;
    }

    fn on_import_key(&mut self, key: KeyEvent) -> Vec<Command> {
        let Some(form) = self.ui.import.as_mut() else {
            self.ui.focus.remove(Focus::ImportModal);
            return Vec::new();
        };
        match key.code {
            KeyCode::Esc => {
                self.ui.import = None;
                self.ui.focus.remove(Focus::ImportModal);
            }
            KeyCode::Tab | KeyCode::Down => form.next_field(),
            KeyCode::BackTab | KeyCode::Up => form.previous_field(),
            KeyCode::Backspace => form.backspace(),
            KeyCode::Char(c) => form.input(c),
            KeyCode::Enter => return self.submit_import(),
            _ => {}
        }
        Vec::new()
    }

    fn on_stack_init_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Esc => self.abort_selection(Focus::StackInitModal),
            KeyCode::Enter => self.create_stack(),
            KeyCode::Backspace => {
                self.ui.stack_name_input.pop();
                Vec::new()
            }
            KeyCode::Char(c) => {
                self.ui.stack_name_input.push(c);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    fn on_workspace_selector_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.ui.workspaces.move_by(1);
                Vec::new()
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.ui.workspaces.move_by(-1);
                Vec::new()
            }
            KeyCode::Enter => match self.ui.workspaces.selected_item() {
                Some(workspace) => {
                    let path = workspace.path.clone();
                    self.select_workspace(path)
                }
                None => Vec::new(),
            },
            KeyCode::Esc | KeyCode::Char('q') => self.abort_selection(Focus::WorkspaceSelector),
            _ => Vec::new(),
        }
    }

    fn on_stack_selector_key(&mut self, key: KeyEvent) -> Vec<Command> {
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                self.ui.stacks.move_by(1);
                Vec::new()
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.ui.stacks.move_by(-1);
                Vec::new()
            }
            KeyCode::Enter => match self.ui.stacks.selected_item() {
                Some(stack) => {
                    let name = stack.name.clone();
                    self.select_stack(name)
                }
                None => Vec::new(),
            },
            KeyCode::Char('n') => self.open_stack_init(),
            KeyCode::Esc | KeyCode::Char('q') => self.abort_selection(Focus::StackSelector),
            _ => Vec::new(),
        }
    }

    /// State commands act on recorded resources only.
    fn state_command_allowed(&mut self) -> Result<String, Vec<Command>> {
        if self.state.op_state.is_active() {
            return Err(vec![self.toast(ToastLevel::Warning, "wait for the operation to finish")]);
        }
        if self.ui.view != ViewMode::Stack {
            return Err(vec![self.toast(ToastLevel::Info, "switch to the resources view first")]);
        }
        match self.ctx.stack() {
            Some(stack) => Ok(stack.to_owned()),
            None => Err(vec![self.toast(ToastLevel::Warning, "select a stack first")]),
        }
    }

    fn confirm_bulk_delete(&mut self) -> Vec<Command> {
        let stack = match self.state_command_allowed() {
            Ok(stack) => stack,
            Err(commands) => return commands,
        };
        let urns: Vec<ResourceUrn> = self
            .ui
            .selected_urns()
            .into_iter()
            .filter(|urn| urn.resource_type() != Some(STACK_RESOURCE_TYPE))
            .collect();
        if urns.is_empty() {
            return vec![self.toast(ToastLevel::Info, "nothing to delete")];
        }
        self.ui.confirm = Some(ConfirmModal {
            title: "delete from state".to_string(),
            message: format!(
                "Remove {} resources from the state of {stack}? Cloud resources are left as they are.",
                urns.len()
            ),
            action: ConfirmAction::BulkDelete(urns),
        });
        self.ui.focus.push(Focus::ConfirmModal);
        Vec::new()
    }

    fn run_bulk_delete(&mut self, urns: Vec<ResourceUrn>) -> Vec<Command> {
        let Some(stack) = self.ctx.stack().map(str::to_owned) else {
            return Vec::new();
        };
        info!(resources = urns.len(), %stack, "deleting from state");
        self.ui.visual_anchor = None;
        let message = format!("deleting {} resources from state", urns.len());
        vec![
            self.toast(ToastLevel::Info, message),
            Command::BulkStateDelete {
                workdir: self.ctx.workdir().to_owned(),
                stack,
                urns,
            },
        ]
    }

    fn on_bulk_delete_finished(&mut self, report: BulkDeleteReport) -> Vec<Command> {
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "state delete finished"
        );
        for urn in &report.succeeded {
            self.state.clear_flags(urn);
        }
        let mut commands = Vec::new();
        if report.failed.is_empty() {
            commands.push(self.toast(ToastLevel::Success, report.summary()));
        } else {
            self.state.err = Some(report.details());
            self.ui.focus.push(Focus::ErrorModal);
        }
        commands.extend(self.request_load_resources(false));
        commands
    }

    fn confirm_protect(&mut self) -> Vec<Command> {
        if let Err(commands) = self.state_command_allowed() {
            return commands;
        }
        let Some(item) = self.ui.selected_item() else {
            return Vec::new();
        };
        let action = ProtectAction {
            urn: item.urn.clone(),
            protect: !item.protect,
        };
        let verb = if action.protect { "protect" } else { "unprotect" };
        let name = item.name.clone();
        self.ui.confirm = Some(ConfirmModal {
            title: verb.to_string(),
            message: format!("{verb} {name}?"),
            action: ConfirmAction::Protect,
        });
        self.state.pending_protect_action = Some(action);
        self.ui.focus.push(Focus::ConfirmModal);
        Vec::new()
    }

    fn run_protect(&mut self, action: ProtectAction) -> Vec<Command> {
        let Some(stack) = self.ctx.stack().map(str::to_owned) else {
            return Vec::new();
        };
        info!(urn = %action.urn, protect = action.protect, "changing protection");
        vec![Command::SetProtect {
            workdir: self.ctx.workdir().to_owned(),
            stack,
            urn: action.urn,
            protect: action.protect,
        }]
    }

    fn on_protect_finished(
        &mut self,
        urn: ResourceUrn,
        protect: bool,
        result: CommandResult,
    ) -> Vec<Command> {
        let name = urn.name().unwrap_or(urn.as_str()).to_owned();
        let verb = if protect { "protect" } else { "unprotect" };
        if !result.success {
            let error = result.error.unwrap_or_default();
            warn!(%urn, %error, "{verb} failed");
            return vec![self.toast(ToastLevel::Error, format!("{verb} {name} failed: {error}"))];
        }
        let mut commands = vec![self.toast(ToastLevel::Success, format!("{verb}ed {name}"))];
        commands.extend(self.request_load_resources(false));
        commands
    }

    fn open_import(&mut self) -> Vec<Command> {
        if self.state.op_state.is_active() {
            return vec![self.toast(ToastLevel::Warning, "wait for the operation to finish")];
        }
        if self.ctx.stack().is_none() {
            return vec![self.toast(ToastLevel::Warning, "select a stack first")];
        }
        let prefill = self
            .ui
            .selected_item()
            .filter(|item| self.ui.view == ViewMode::Preview && item.op == StepOp::Create);
        self.ui.import = Some(ImportForm::prefilled(prefill));
        self.ui.focus.push(Focus::ImportModal);
        Vec::new()
    }

    fn submit_import(&mut self) -> Vec<Command> {
        let complete = self.ui.import.as_ref().is_some_and(ImportForm::is_complete);
        if !complete {
            return vec![self.toast(ToastLevel::Warning, "type, name and id are required")];
        }
        let Some(form) = self.ui.import.take() else {
            return Vec::new();
        };
        self.ui.focus.remove(Focus::ImportModal);
        let Some(stack) = self.ctx.stack().map(str::to_owned) else {
            return Vec::new();
        };
        let [resource_type, name, id, parent] = form.fields.map(|field| field.trim().to_owned());
        info!(%resource_type, %name, %id, "importing resource");
        vec![Command::Import {
            workdir: self.ctx.workdir().to_owned(),
            stack,
            request: ImportRequest {
                resource_type,
                name,
                id,
                parent: (!parent.is_empty()).then(|| ResourceUrn::from(parent)),
            },
        }]
    }

    fn on_import_finished(&mut self, name: String, result: CommandResult) -> Vec<Command> {
        if !result.success {
            let error = result.error.unwrap_or_default();
            warn!(%name, %error, "import failed");
            return vec![self.toast(ToastLevel::Error, format!("import of {name} failed: {error}"))];
        }
        let mut commands = vec![self.toast(ToastLevel::Success, format!("imported {name}"))];
        commands.extend(self.request_load_resources(false));
        commands
    }

    /// Pages start at one.
    fn show_history(&mut self, page: usize) -> Vec<Command> {
        let Some(stack) = self.ctx.stack().map(str::to_owned) else {
            return vec![self.toast(ToastLevel::Warning, "select a stack first")];
        };
        self.ui.set_view(ViewMode::History);
        self.ui.history_page = page;
        self.ui.history_loading = true;
        vec![Command::FetchHistory {
            workdir: self.ctx.workdir().to_owned(),
            stack,
            page_size: self.settings.history_page_size,
            page,
        }]
    }

    fn on_history_loaded(
        &mut self,
        page: usize,
        result: Result<Vec<HistoryEntry>, String>,
    ) -> Vec<Command> {
        if page != self.ui.history_page {
            debug!(page, current = self.ui.history_page, "ignoring stale history page");
            return Vec::new();
        }
        self.ui.history_loading = false;
        match result {
            Ok(entries) => {
                debug!(page, entries = entries.len(), "history loaded");
                self.ui.history = convert_history(&entries);
                self.ui.history_cursor = 0;
                Vec::new()
            }
            Err(error) => {
                warn!(%error, "failed to load history");
                vec![self.toast(ToastLevel::Error, format!("failed to load history: {error}"))]
            }
        }
    }
}
