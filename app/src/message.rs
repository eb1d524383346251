use crossterm::event::KeyEvent;
use strata_engine::{
    AuthenticateResult, CommandResult, HistoryEntry, OperationEvent, PreviewEvent, ProjectInfo,
    ResourceInfo, ResourceUrn, StackInfo, WhoAmI, WorkspaceInfo,
};

use crate::bulk::BulkDeleteReport;

/// Why credentials are being (re)loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPurpose {
    /// Startup or a workspace switch.
    Initial,
    /// A stack became known or changed.
    StackContext,
    /// Requested from the keyboard.
    Explicit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InitMessage {
    WorkspaceChecked {
        valid: bool,
    },
    PluginsLoaded {
        purpose: AuthPurpose,
        ticket: u64,
        result: Result<Vec<AuthenticateResult>, String>,
    },
    StacksLoaded(Result<Vec<StackInfo>, String>),
    ProjectInfoLoaded(Result<ProjectInfo, String>),
    WhoAmILoaded(Result<WhoAmI, String>),
    ResourcesLoaded {
        during_init: bool,
        result: Result<Vec<ResourceInfo>, String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationMessage {
    Preview {
        generation: u64,
        event: PreviewEvent,
    },
    Execute {
        generation: u64,
        event: OperationEvent,
    },
    CancelTimedOut {
        generation: u64,
    },
    HistoryLoaded {
        page: usize,
        result: Result<Vec<HistoryEntry>, String>,
    },
    BulkDeleteFinished(BulkDeleteReport),
    ProtectFinished {
        urn: ResourceUrn,
        protect: bool,
        result: CommandResult,
    },
    ImportFinished {
        name: String,
        result: CommandResult,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionMessage {
    StacksLoaded(Result<Vec<StackInfo>, String>),
    WorkspacesLoaded(Result<Vec<WorkspaceInfo>, String>),
    StackInitialized { name: String, result: CommandResult },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UiMessage {
    Tick,
    ToastExpired(u64),
    Copied(Result<String, String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Key(KeyEvent),
    Resize,
    Init(InitMessage),
    Operation(OperationMessage),
    Selection(SelectionMessage),
    Ui(UiMessage),
}
