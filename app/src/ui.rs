use std::collections::{HashSet, VecDeque};

use strata_engine::{Diagnostic, OperationKind, ProjectInfo, ResourceUrn, WhoAmI, WorkspaceInfo};
use strata_tree::TreeRow;

use crate::{
    convert::{HistoryItem, StackItem},
    item::{ResourceItem, ResourceList},
};

const DIAGNOSTIC_LIMIT: usize = 200;
const SPINNER: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ViewMode {
    #[default]
    Stack,
    Preview,
    Execute,
    History,
}

impl ViewMode {
    pub const ALL: [ViewMode; 4] = [
        ViewMode::Stack,
        ViewMode::Preview,
        ViewMode::Execute,
        ViewMode::History,
    ];

    pub fn title(self) -> &'static str {
        match self {
            ViewMode::Stack => "resources",
            ViewMode::Preview => "preview",
            ViewMode::Execute => "execute",
            ViewMode::History => "history",
        }
    }
}

/// Owners of keyboard input, in no particular order. The topmost entry of the
/// [`FocusStack`] gets every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Focus {
    Main,
    ErrorModal,
    ConfirmModal,
    ImportModal,
    StackInitModal,
    WorkspaceSelector,
    StackSelector,
    Help,
    Details,
}

#[derive(Debug, Clone, Default)]
pub struct FocusStack(Vec<Focus>);

impl FocusStack {
    pub fn top(&self) -> Focus {
        self.0.last().copied().unwrap_or(Focus::Main)
    }

    /// Raise `focus` to the top, moving it if already open.
    pub fn push(&mut self, focus: Focus) {
        if focus == Focus::Main {
            return;
        }
        self.0.retain(|open| *open != focus);
        self.0.push(focus);
    }

    pub fn pop(&mut self) -> Option<Focus> {
        self.0.pop()
    }

    pub fn remove(&mut self, focus: Focus) {
        self.0.retain(|open| *open != focus);
    }

    pub fn contains(&self, focus: Focus) -> bool {
        self.0.contains(&focus)
    }

    pub fn iter(&self) -> impl Iterator<Item = Focus> + '_ {
        self.0.iter().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    Execute(OperationKind),
    BulkDelete(Vec<ResourceUrn>),
    Protect,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmModal {
    pub title: String,
    pub message: String,
    pub action: ConfirmAction,
}

/// A list picker that may still be loading.
#[derive(Debug, Clone)]
pub struct Selector<T> {
    pub items: Vec<T>,
    pub selected: usize,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for Selector<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            selected: 0,
            loading: false,
            error: None,
        }
    }
}

impl<T> Selector<T> {
    pub fn start_loading(&mut self) {
        self.loading = true;
        self.error = None;
    }

    pub fn set_items(&mut self, items: Vec<T>, selected: usize) {
        self.selected = selected.min(items.len().saturating_sub(1));
        self.items = items;
        self.loading = false;
        self.error = None;
    }

    pub fn set_error(&mut self, error: String) {
        self.loading = false;
        self.error = Some(error);
    }

    pub fn move_by(&mut self, delta: isize) {
        if self.items.is_empty() {
            self.selected = 0;
            return;
        }
        let last = self.items.len() - 1;
        self.selected = self.selected.saturating_add_signed(delta).min(last);
    }

    pub fn selected_item(&self) -> Option<&T> {
        self.items.get(self.selected)
    }
}

pub const IMPORT_FIELDS: [&str; 4] = ["type", "name", "id", "parent urn"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportForm {
    pub fields: [String; 4],
    pub focused: usize,
}

impl ImportForm {
    pub fn prefilled(item: Option<&ResourceItem>) -> Self {
        let mut form = Self::default();
        if let Some(item) = item {
            form.fields[0] = item.resource_type.clone();
            form.fields[1] = item.name.clone();
            form.fields[3] = item
                .parent
                .as_ref()
                .map(ResourceUrn::to_string)
                .unwrap_or_default();
            form.focused = 2;
        }
        form
    }

    pub fn next_field(&mut self) {
        self.focused = (self.focused + 1) % IMPORT_FIELDS.len();
    }

    pub fn previous_field(&mut self) {
        self.focused = (self.focused + IMPORT_FIELDS.len() - 1) % IMPORT_FIELDS.len();
    }

    pub fn input(&mut self, c: char) {
        self.fields[self.focused].push(c);
    }

    pub fn backspace(&mut self) {
        self.fields[self.focused].pop();
    }

    /// Type, name and id are required.
    pub fn is_complete(&self) -> bool {
        self.fields[..3].iter().all(|field| !field.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: u64,
    pub level: ToastLevel,
    pub message: String,
}

/// Everything the renderer needs besides [`crate::AppState`].
#[derive(Debug, Default)]
pub struct UiState {
    pub view: ViewMode,
    pub focus: FocusStack,
    pub resources: ResourceList,
    pub operation_items: ResourceList,
    pub operation_error: Option<String>,
    pub diagnostics: VecDeque<Diagnostic>,
    pub collapsed: HashSet<ResourceUrn>,
    pub cursor: usize,
    pub visual_anchor: Option<usize>,
    pub history: Vec<HistoryItem>,
    pub history_page: usize,
    pub history_cursor: usize,
    pub history_loading: bool,
    pub stacks: Selector<StackItem>,
    pub workspaces: Selector<WorkspaceInfo>,
    pub confirm: Option<ConfirmModal>,
    pub import: Option<ImportForm>,
    pub stack_name_input: String,
    pub toasts: Vec<Toast>,
    pub project: Option<ProjectInfo>,
    pub whoami: Option<WhoAmI>,
    next_toast_id: u64,
    spinner: usize,
}

impl UiState {
    pub fn set_view(&mut self, view: ViewMode) {
        if self.view != view {
            self.view = view;
            self.cursor = 0;
            self.visual_anchor = None;
        }
    }

    pub fn is_visual(&self) -> bool {
        self.visual_anchor.is_some()
    }

    /// The list behind the current view.
    pub fn current_list(&self) -> &ResourceList {
        match self.view {
            ViewMode::Preview | ViewMode::Execute => &self.operation_items,
            ViewMode::Stack | ViewMode::History => &self.resources,
        }
    }

    pub fn rows(&self) -> Vec<TreeRow> {
        self.current_list().rows(&self.collapsed)
    }

    pub fn item_at(&self, row: &TreeRow) -> Option<&ResourceItem> {
        self.current_list().get_index(row.index)
    }

    pub fn selected_item(&self) -> Option<&ResourceItem> {
        let rows = self.rows();
        let row = rows.get(self.cursor)?;
        self.item_at(row)
    }

    /// The visual range, or just the cursor row.
    pub fn selected_urns(&self) -> Vec<ResourceUrn> {
        let rows = self.rows();
        let (start, end) = self.selection_range();
        rows.iter()
            .enumerate()
            .filter(|(position, _)| (start..=end).contains(position))
            .filter_map(|(_, row)| self.item_at(row))
            .map(|item| item.urn.clone())
            .collect()
    }

    pub fn selection_range(&self) -> (usize, usize) {
        match self.visual_anchor {
            Some(anchor) => (anchor.min(self.cursor), anchor.max(self.cursor)),
            None => (self.cursor, self.cursor),
        }
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let len = match self.view {
            ViewMode::History => self.history.len(),
            _ => self.rows().len(),
        };
        let cursor = match self.view {
            ViewMode::History => &mut self.history_cursor,
            _ => &mut self.cursor,
        };
        *cursor = cursor
            .saturating_add_signed(delta)
            .min(len.saturating_sub(1));
    }

    pub fn clamp_cursor(&mut self) {
        let len = self.rows().len();
        self.cursor = self.cursor.min(len.saturating_sub(1));
        if let Some(anchor) = self.visual_anchor {
            self.visual_anchor = Some(anchor.min(len.saturating_sub(1)));
        }
    }

    pub fn toggle_collapsed(&mut self) {
        let Some(urn) = self.selected_item().map(|item| item.urn.clone()) else {
            return;
        };
        if !self.collapsed.remove(&urn) {
            self.collapsed.insert(urn);
        }
        self.clamp_cursor();
    }

    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        if self.diagnostics.len() == DIAGNOSTIC_LIMIT {
            self.diagnostics.pop_front();
        }
        self.diagnostics.push_back(diagnostic);
    }

    pub fn reset_operation(&mut self) {
        self.operation_items.clear();
        self.operation_error = None;
        self.diagnostics.clear();
    }

    pub fn push_toast(&mut self, level: ToastLevel, message: String) -> u64 {
        self.next_toast_id += 1;
        let id = self.next_toast_id;
        self.toasts.push(Toast { id, level, message });
        id
    }

    pub fn expire_toast(&mut self, id: u64) {
        self.toasts.retain(|toast| toast.id != id);
    }

    pub fn tick(&mut self) {
        self.spinner = (self.spinner + 1) % SPINNER.len();
    }

    pub fn spinner(&self) -> &'static str {
        SPINNER[self.spinner]
    }
}
