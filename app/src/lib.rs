mod bulk;
mod command;
mod convert;
mod deps;
mod events;
#[cfg(test)]
mod fakes;
mod init;
mod item;
mod message;
mod operation;
mod runtime;
mod state;
mod ui;
mod update;

use std::time::Duration;

use strata_ctx::AppContext;
use strata_engine::OperationKind;
use tokio_util::sync::CancellationToken;

pub use crate::bulk::{BulkDeleteReport, bulk_state_delete};
pub use crate::command::{Command, ImportRequest, Invalidate, StackListFor};
pub use crate::convert::{
    EscapeAction, HistoryItem, StackInitAction, StackItem, StackItems, convert_history,
    convert_stacks_to_items, determine_escape_action, determine_stack_init_action,
};
pub use crate::deps::{Clipboard, Dependencies};
pub use crate::events::{
    OperationEventResult, PreviewEventResult, process_operation_event, process_preview_event,
};
pub use crate::item::{ItemStatus, ResourceItem, ResourceList};
pub use crate::message::{
    AuthPurpose, InitMessage, Message, OperationMessage, SelectionMessage, UiMessage,
};
pub use crate::operation::OperationController;
pub use crate::runtime::Runtime;
pub use crate::state::{
    AppState, FlagKind, InitState, OperationState, PendingOperation, ProtectAction,
    ResourceFlags,
};
pub use crate::ui::{
    ConfirmAction, ConfirmModal, Focus, FocusStack, IMPORT_FIELDS, ImportForm, Selector, Toast,
    ToastLevel, UiState, ViewMode,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub history_page_size: usize,
    pub cancel_timeout: Duration,
    pub toast_duration: Duration,
    /// Preview to run once the stack is loaded, instead of showing resources.
    pub initial_operation: Option<OperationKind>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            history_page_size: 20,
            cancel_timeout: Duration::from_secs(60),
            toast_duration: Duration::from_secs(4),
            initial_operation: None,
        }
    }
}

/// The single owner of all UI-visible state.
///
/// Mutated only through [`App::update`], which returns the side effects to
/// run. Stream events arrive through [`App::next_stream_message`].
pub struct App {
    ctx: AppContext,
    deps: Dependencies,
    settings: AppSettings,
    state: AppState,
    ui: UiState,
    operation: OperationController,
    quit: bool,
}

impl App {
    pub fn new(
        ctx: AppContext,
        deps: Dependencies,
        settings: AppSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            ctx,
            deps,
            settings,
            state: AppState::new(),
            ui: UiState::default(),
            operation: OperationController::new(cancel),
            quit: false,
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn ui(&self) -> &UiState {
        &self.ui
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    /// Something is in flight that the spinner should show.
    pub fn is_working(&self) -> bool {
        self.state.is_busy()
            || self.state.op_state.is_active()
            || self.state.init_state != InitState::Complete
    }

    /// Resolves with the next event of the armed stream, or never.
    pub async fn next_stream_message(&mut self) -> Message {
        self.operation.next_message().await
    }

    pub(crate) fn arm_stream(&mut self) {
        self.operation.arm();
    }
}
