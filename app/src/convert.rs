use std::collections::BTreeMap;

use strata_engine::{HistoryEntry, StackInfo};

use crate::{
    state::{InitState, OperationState},
    ui::ViewMode,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackItem {
    pub name: String,
    pub current: bool,
    pub update_in_progress: bool,
    pub last_update: Option<String>,
    pub resource_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackItems {
    pub items: Vec<StackItem>,
    pub current_stack_name: Option<String>,
}

pub fn convert_stacks_to_items(stacks: &[StackInfo]) -> StackItems {
    let items: Vec<StackItem> = stacks
        .iter()
        .map(|stack| StackItem {
            name: stack.name.clone(),
            current: stack.current,
            update_in_progress: stack.update_in_progress,
            last_update: stack.last_update.clone(),
            resource_count: stack.resource_count,
        })
        .collect();
    let current_stack_name = items
        .iter()
        .find(|item| item.current)
        .map(|item| item.name.clone());
    StackItems {
        items,
        current_stack_name,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryItem {
    pub version: u64,
    pub kind: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub message: Option<String>,
    pub result: String,
    pub resource_changes: BTreeMap<String, u64>,
}

/// Newest first. Entries without a version are numbered `len - index`.
pub fn convert_history(entries: &[HistoryEntry]) -> Vec<HistoryItem> {
    let len = entries.len() as u64;
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| HistoryItem {
            version: match entry.version {
                0 => len - index as u64,
                version => version,
            },
            kind: entry.kind.clone(),
            start_time: entry.start_time.clone(),
            end_time: entry.end_time.clone(),
            message: entry.message.clone(),
            result: entry.result.clone(),
            resource_changes: entry.resource_changes.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackInitAction {
    None,
    ShowInit,
    ShowSelector,
    Proceed,
}

/// What to do once the stack list arrives during startup.
pub fn determine_stack_init_action(
    init_state: InitState,
    stack_count: usize,
    current_stack: Option<&str>,
) -> StackInitAction {
    if init_state != InitState::LoadingStacks {
        return StackInitAction::None;
    }
    match (stack_count, current_stack) {
        (_, Some(name)) if !name.is_empty() => StackInitAction::Proceed,
        (0, _) => StackInitAction::ShowInit,
        _ => StackInitAction::ShowSelector,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeAction {
    ExitVisualMode,
    CancelOp,
    NavigateBack,
    None,
}

/// Escape on the main view, highest priority first: leave visual mode,
/// cancel a running operation, go back to the stack view.
pub fn determine_escape_action(
    view: ViewMode,
    op_state: OperationState,
    visual_mode: bool,
) -> EscapeAction {
    if visual_mode {
        return EscapeAction::ExitVisualMode;
    }
    match view {
        ViewMode::Stack => EscapeAction::None,
        ViewMode::History => EscapeAction::NavigateBack,
        ViewMode::Preview | ViewMode::Execute => match op_state {
            OperationState::Running => EscapeAction::CancelOp,
            OperationState::Starting | OperationState::Cancelling => EscapeAction::None,
            OperationState::Idle | OperationState::Complete | OperationState::Error => {
                EscapeAction::NavigateBack
            }
        },
    }
}
