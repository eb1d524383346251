use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{self, Display},
};

use strata_engine::{OperationKind, ResourceUrn};
use tracing::debug;

/// Startup progress. Only ever moves forward, except that selecting another
/// workspace restarts at `LoadingPlugins`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum InitState {
    #[default]
    CheckingWorkspace,
    LoadingPlugins,
    LoadingStacks,
    SelectingStack,
    LoadingResources,
    Complete,
}

impl InitState {
    pub const ALL: [InitState; 6] = [
        InitState::CheckingWorkspace,
        InitState::LoadingPlugins,
        InitState::LoadingStacks,
        InitState::SelectingStack,
        InitState::LoadingResources,
        InitState::Complete,
    ];
}

impl Display for InitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InitState::CheckingWorkspace => "checking workspace",
            InitState::LoadingPlugins => "authenticating",
            InitState::LoadingStacks => "loading stacks",
            InitState::SelectingStack => "selecting stack",
            InitState::LoadingResources => "loading resources",
            InitState::Complete => "ready",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OperationState {
    #[default]
    Idle,
    Starting,
    Running,
    Cancelling,
    Complete,
    Error,
}

impl OperationState {
    pub const ALL: [OperationState; 6] = [
        OperationState::Idle,
        OperationState::Starting,
        OperationState::Running,
        OperationState::Cancelling,
        OperationState::Complete,
        OperationState::Error,
    ];

    pub fn is_active(self) -> bool {
        matches!(
            self,
            OperationState::Starting | OperationState::Running | OperationState::Cancelling
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagKind {
    Target,
    Replace,
    Exclude,
}

/// Per-resource markers narrowing the next operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceFlags {
    pub target: bool,
    pub replace: bool,
    pub exclude: bool,
}

impl ResourceFlags {
    pub fn is_empty(&self) -> bool {
        !(self.target || self.replace || self.exclude)
    }

    pub fn toggle(&mut self, kind: FlagKind) {
        let flag = match kind {
            FlagKind::Target => &mut self.target,
            FlagKind::Replace => &mut self.replace,
            FlagKind::Exclude => &mut self.exclude,
        };
        *flag = !*flag;
    }
}

/// Work deferred while the busy lock is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOperation {
    Preview(OperationKind),
    LoadResources,
    InitLoadResources,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectAction {
    pub urn: ResourceUrn,
    pub protect: bool,
}

#[derive(Debug)]
struct BusyLock {
    reason: String,
    ticket: u64,
}

#[derive(Debug, Default)]
pub struct AppState {
    pub init_state: InitState,
    pub op_state: OperationState,
    pub operation: Option<OperationKind>,
    /// Execution awaiting confirmation.
    pub pending_operation: Option<OperationKind>,
    pub pending_protect_action: Option<ProtectAction>,
    pub flags: BTreeMap<ResourceUrn, ResourceFlags>,
    pub err: Option<String>,
    busy_lock: Option<BusyLock>,
    last_ticket: u64,
    pending_ops: Vec<PendingOperation>,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lock, replacing any holder. The returned ticket is what the
    /// matching reply must present to [`AppState::holds_busy`].
    pub fn set_busy(&mut self, reason: impl Into<String>) -> u64 {
        let reason = reason.into();
        self.last_ticket += 1;
        let ticket = self.last_ticket;
        debug!(%reason, ticket, "busy");
        self.busy_lock = Some(BusyLock { reason, ticket });
        ticket
    }

    pub fn holds_busy(&self, ticket: u64) -> bool {
        self.busy_lock
            .as_ref()
            .is_some_and(|lock| lock.ticket == ticket)
    }

    #[cfg(test)]
    pub(crate) fn busy_ticket(&self) -> Option<u64> {
        self.busy_lock.as_ref().map(|lock| lock.ticket)
    }

    pub fn is_busy(&self) -> bool {
        self.busy_lock.is_some()
    }

    pub fn busy_reason(&self) -> Option<&str> {
        self.busy_lock.as_ref().map(|lock| lock.reason.as_str())
    }

    pub fn queue_operation(&mut self, op: PendingOperation) {
        if self.pending_ops.contains(&op) {
            debug!(?op, "operation already queued");
            return;
        }
        debug!(?op, queued = self.pending_ops.len() + 1, "operation queued while busy");
        self.pending_ops.push(op);
    }

    pub fn pending_ops(&self) -> &[PendingOperation] {
        &self.pending_ops
    }

    /// Release the lock and hand back everything queued under it, oldest
    /// first.
    pub fn clear_busy(&mut self) -> Vec<PendingOperation> {
        if let Some(BusyLock { reason, ticket }) = self.busy_lock.take() {
            debug!(%reason, ticket, drained = self.pending_ops.len(), "no longer busy");
        }
        std::mem::take(&mut self.pending_ops)
    }

    pub fn flags_for(&self, urn: &ResourceUrn) -> ResourceFlags {
        self.flags.get(urn).copied().unwrap_or_default()
    }

    pub fn toggle_flag(&mut self, urn: &ResourceUrn, kind: FlagKind) {
        let flags = self.flags.entry(urn.clone()).or_default();
        flags.toggle(kind);
        if flags.is_empty() {
            self.flags.remove(urn);
        }
    }

    pub fn clear_flags(&mut self, urn: &ResourceUrn) {
        self.flags.remove(urn);
    }

    /// Flags survive stack switches; only those on `stack`'s own urns (or
    /// on urns without a stack segment) feed an operation.
    fn flagged(
        &self,
        stack: Option<&str>,
        pick: impl Fn(&ResourceFlags) -> bool,
    ) -> BTreeSet<ResourceUrn> {
        self.flags
            .iter()
            .filter(|(urn, flags)| pick(flags) && flag_applies(urn, stack))
            .map(|(urn, _)| urn.clone())
            .collect()
    }

    pub fn targets(&self, stack: Option<&str>) -> BTreeSet<ResourceUrn> {
        self.flagged(stack, |flags| flags.target)
    }

    pub fn replaces(&self, stack: Option<&str>) -> BTreeSet<ResourceUrn> {
        self.flagged(stack, |flags| flags.replace)
    }

    pub fn excludes(&self, stack: Option<&str>) -> BTreeSet<ResourceUrn> {
        self.flagged(stack, |flags| flags.exclude)
    }
}

fn flag_applies(urn: &ResourceUrn, stack: Option<&str>) -> bool {
    match (urn.stack(), stack) {
        (Some(own), Some(current)) => own == current,
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_states() {
        let active: Vec<_> = OperationState::ALL
            .into_iter()
            .filter(|state| state.is_active())
            .collect();
        assert_eq!(
            active,
            vec![
                OperationState::Starting,
                OperationState::Running,
                OperationState::Cancelling
            ]
        );
    }

    #[test]
    fn test_busy_queue_drains_in_order() {
        let mut state = AppState::new();
        state.set_busy("authenticating");
        state.queue_operation(PendingOperation::LoadResources);
        state.queue_operation(PendingOperation::Preview(OperationKind::Destroy));
        state.queue_operation(PendingOperation::InitLoadResources);

        assert!(state.is_busy());
        assert_eq!(
            state.clear_busy(),
            vec![
                PendingOperation::LoadResources,
                PendingOperation::Preview(OperationKind::Destroy),
                PendingOperation::InitLoadResources,
            ]
        );
        assert!(!state.is_busy());
        assert!(state.clear_busy().is_empty());
    }

    #[test]
    fn test_retaking_the_lock_invalidates_old_ticket() {
        let mut state = AppState::new();
        let first = state.set_busy("authenticating");
        let second = state.set_busy("authenticating");

        assert_ne!(first, second);
        assert!(!state.holds_busy(first));
        assert!(state.holds_busy(second));

        state.clear_busy();
        assert!(!state.holds_busy(second));
    }

    #[test]
    fn test_flags_split_into_sets() {
        let bucket = ResourceUrn::from("urn:pulumi:dev::shop::aws:s3/bucket:Bucket::assets");
        let queue = ResourceUrn::from("urn:pulumi:dev::shop::aws:sqs/queue:Queue::jobs");
        let mut state = AppState::new();

        state.toggle_flag(&bucket, FlagKind::Target);
        state.toggle_flag(&bucket, FlagKind::Replace);
        state.toggle_flag(&queue, FlagKind::Exclude);

        assert_eq!(state.targets(Some("dev")), BTreeSet::from([bucket.clone()]));
        assert_eq!(state.replaces(Some("dev")), BTreeSet::from([bucket.clone()]));
        assert_eq!(state.excludes(Some("dev")), BTreeSet::from([queue.clone()]));
        assert!(state.targets(Some("prod")).is_empty());

        state.toggle_flag(&queue, FlagKind::Exclude);
        assert!(!state.flags.contains_key(&queue));

        state.clear_flags(&bucket);
        assert!(state.flags.is_empty());
    }
}
