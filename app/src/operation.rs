use strata_engine::{OperationEvent, OperationKind, OperationOptions, PreviewEvent};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    App,
    command::Command,
    events::{process_operation_event, process_preview_event},
    message::{Message, OperationMessage},
    state::{InitState, OperationState, PendingOperation},
    ui::{ConfirmAction, ConfirmModal, Focus, ToastLevel, ViewMode},
};

#[derive(Debug, Default)]
enum Stream {
    #[default]
    Closed,
    Preview(Receiver<PreviewEvent>),
    Execute(Receiver<OperationEvent>),
}

/// Holds the one in-flight operation: its event stream and its cancel
/// handle.
///
/// Only ever receives. The executor owns the sending side and closes it,
/// and a closed stream reads as `Done`.
#[derive(Debug)]
pub struct OperationController {
    root: CancellationToken,
    cancel: Option<CancellationToken>,
    stream: Stream,
    armed: bool,
    generation: u64,
}

impl OperationController {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            cancel: None,
            stream: Stream::Closed,
            armed: false,
            generation: 0,
        }
    }

    /// Identifies the current operation, so late messages about an earlier
    /// one can be told apart.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Drop whatever was running and hand out a fresh child token.
    pub fn begin(&mut self) -> CancellationToken {
        self.abandon();
        self.generation += 1;
        let token = self.root.child_token();
        self.cancel = Some(token.clone());
        token
    }

    pub fn attach_preview(&mut self, rx: Receiver<PreviewEvent>) {
        self.stream = Stream::Preview(rx);
    }

    pub fn attach_execute(&mut self, rx: Receiver<OperationEvent>) {
        self.stream = Stream::Execute(rx);
    }

    pub fn arm(&mut self) {
        self.armed = !matches!(self.stream, Stream::Closed);
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn has_cancel_handle(&self) -> bool {
        self.cancel.is_some()
    }

    /// Ask the executor to stop. The stream stays open for its final event.
    pub fn request_cancel(&mut self) -> bool {
        match &self.cancel {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// The stream ended on its own.
    pub fn finish(&mut self) {
        self.cancel = None;
        self.stream = Stream::Closed;
        self.armed = false;
    }

    /// Stop listening, cancelling the operation if it is still going.
    pub fn abandon(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.stream = Stream::Closed;
        self.armed = false;
    }

    pub async fn next_message(&mut self) -> Message {
        if !self.armed {
            return std::future::pending().await;
        }
        let generation = self.generation;
        let message = match &mut self.stream {
            Stream::Preview(rx) => OperationMessage::Preview {
                generation,
                event: rx.recv().await.unwrap_or(PreviewEvent::Done),
            },
            Stream::Execute(rx) => OperationMessage::Execute {
                generation,
                event: rx.recv().await.unwrap_or(OperationEvent::Done),
            },
            Stream::Closed => return std::future::pending().await,
        };
        self.armed = false;
        Message::Operation(message)
    }
}

impl App {
    fn operation_options(&self) -> OperationOptions {
        let stack = self.ctx.stack();
        OperationOptions {
            targets: self.state.targets(stack),
            replaces: self.state.replaces(stack),
            excludes: self.state.excludes(stack),
            env: OperationOptions::merge_env(self.ctx.base_env(), &self.deps.plugins.get_all_env()),
        }
    }

    pub(crate) fn set_op_state(&mut self, next: OperationState) {
        if self.state.op_state != next {
            debug!(from = ?self.state.op_state, to = ?next, "operation transition");
            self.state.op_state = next;
        }
    }

    fn prepare_operation(&mut self, kind: OperationKind, view: ViewMode) {
        self.set_op_state(OperationState::Starting);
        self.state.operation = Some(kind);
        self.ui.reset_operation();
        self.ui.set_view(view);
        self.ui.cursor = 0;
        self.ui.visual_anchor = None;
    }

    pub(crate) fn start_preview(&mut self, kind: OperationKind) -> Vec<Command> {
        if self.state.is_busy() {
            self.state.queue_operation(PendingOperation::Preview(kind));
            return Vec::new();
        }
        if self.state.op_state.is_active() {
            debug!(%kind, "preview refused while an operation is active");
            return Vec::new();
        }
        let Some(stack) = self.ctx.stack().map(str::to_owned) else {
            return vec![self.toast(ToastLevel::Warning, "select a stack first")];
        };

        info!(%kind, %stack, "starting preview");
        self.prepare_operation(kind, ViewMode::Preview);
        let options = self.operation_options();
        let cancel = self.operation.begin();
        let rx = self
            .deps
            .executor
            .preview(cancel, self.ctx.workdir(), &stack, kind, options);
        self.operation.attach_preview(rx);
        vec![Command::WaitPreview]
    }

    /// Execute right away when the user is looking at a finished preview of
    /// the same kind, otherwise ask first.
    pub(crate) fn maybe_confirm_execution(&mut self, kind: OperationKind) -> Vec<Command> {
        if self.state.op_state.is_active() {
            debug!(%kind, "execution refused while an operation is active");
            return Vec::new();
        }
        if self.ui.view == ViewMode::Preview
            && self.state.operation == Some(kind)
            && self.state.op_state == OperationState::Complete
        {
            return self.start_execution(kind);
        }

        let stack = self.ctx.stack().unwrap_or("(none)");
        let mut message = format!("Run {kind} on stack {stack}?");
        let narrowed = self.state.flags.len();
        if narrowed > 0 {
            message.push_str(&format!(" ({narrowed} flagged resources)"));
        }
        self.state.pending_operation = Some(kind);
        self.ui.confirm = Some(ConfirmModal {
            title: kind.to_string(),
            message,
            action: ConfirmAction::Execute(kind),
        });
        self.ui.focus.push(Focus::ConfirmModal);
        Vec::new()
    }

    pub(crate) fn start_execution(&mut self, kind: OperationKind) -> Vec<Command> {
        self.state.pending_operation = None;
        if self.state.op_state.is_active() {
            debug!(%kind, "execution refused while an operation is active");
            return Vec::new();
        }
        if self.state.is_busy() {
            return vec![self.toast(
                ToastLevel::Warning,
                "credentials are being refreshed, try again shortly",
            )];
        }
        let Some(stack) = self.ctx.stack().map(str::to_owned) else {
            return vec![self.toast(ToastLevel::Warning, "select a stack first")];
        };

        info!(%kind, %stack, "starting execution");
        self.prepare_operation(kind, ViewMode::Execute);
        let options = self.operation_options();
        let cancel = self.operation.begin();
        let rx = self
            .deps
            .executor
            .execute(kind, cancel, self.ctx.workdir(), &stack, options);
        self.operation.attach_execute(rx);
        vec![Command::WaitOperation]
    }

    pub(crate) fn cancel_operation(&mut self) -> Vec<Command> {
        if self.state.op_state != OperationState::Running {
            return Vec::new();
        }
        if !self.operation.request_cancel() {
            return Vec::new();
        }
        let generation = self.operation.generation();
        info!(generation, "cancelling operation");
        self.set_op_state(OperationState::Cancelling);
        vec![Command::CancelTimeout {
            generation,
            after: self.settings.cancel_timeout,
        }]
    }

    pub(crate) fn on_preview_event(&mut self, generation: u64, event: PreviewEvent) -> Vec<Command> {
        if generation != self.operation.generation() {
            debug!(generation, "ignoring event from an earlier preview");
            return Vec::new();
        }
        let terminal = matches!(event, PreviewEvent::Done | PreviewEvent::Error(_));
        let result = process_preview_event(&event, self.state.op_state, self.state.init_state);

        self.set_op_state(result.new_op_state);
        if let Some(item) = result.item {
            self.ui.operation_items.upsert(item);
        }
        if let Some(diagnostic) = result.diagnostic {
            self.ui.push_diagnostic(diagnostic);
        }

        let mut commands = Vec::new();
        if let Some(error) = result.error {
            warn!(%error, "preview failed");
            self.ui.operation_error = Some(error.clone());
            commands.push(self.toast(ToastLevel::Error, format!("preview failed: {error}")));
            if result.init_done {
                commands.extend(self.init_failed(format!("initial preview failed: {error}")));
            }
        }
        if result.init_done {
            self.set_init_state(InitState::Complete);
        }

        if terminal {
            info!(items = self.ui.operation_items.len(), "preview finished");
            self.operation.finish();
        } else {
            commands.push(Command::WaitPreview);
        }
        commands
    }

    pub(crate) fn on_execute_event(
        &mut self,
        generation: u64,
        event: OperationEvent,
    ) -> Vec<Command> {
        if generation != self.operation.generation() {
            debug!(generation, "ignoring event from an earlier operation");
            return Vec::new();
        }
        let terminal = matches!(event, OperationEvent::Done | OperationEvent::Error(_));
        let result = process_operation_event(&event, self.state.op_state);

        self.set_op_state(result.new_op_state);
        if let Some(item) = result.item {
            self.ui.operation_items.upsert(item);
        }
        if let Some(diagnostic) = result.diagnostic {
            self.ui.push_diagnostic(diagnostic);
        }

        let mut commands = Vec::new();
        let kind = self
            .state
            .operation
            .map(|kind| kind.to_string())
            .unwrap_or_default();
        if let Some(error) = result.error {
            warn!(%kind, %error, "operation failed");
            self.ui.operation_error = Some(error.clone());
            commands.push(self.toast(ToastLevel::Error, format!("{kind} failed: {error}")));
        }
        if result.done {
            info!(%kind, "operation complete");
            commands.push(self.toast(ToastLevel::Success, format!("{kind} complete")));
        }

        if terminal {
            self.operation.finish();
            // The stack changed, or may have.
            commands.extend(self.request_load_resources(false));
        } else {
            commands.push(Command::WaitOperation);
        }
        commands
    }

    pub(crate) fn on_cancel_timeout(&mut self, generation: u64) -> Vec<Command> {
        if generation != self.operation.generation()
            || self.state.op_state != OperationState::Cancelling
        {
            return Vec::new();
        }
        warn!(generation, "cancellation timed out, abandoning operation");
        self.operation.abandon();
        self.set_op_state(OperationState::Error);
        self.ui.operation_error = Some("cancellation timed out".to_string());
        vec![self.toast(ToastLevel::Error, "cancellation timed out")]
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeSet, time::Duration};

    use serde_json::json;
    use strata_engine::{OperationStep, PreviewStep, ResourceUrn, StepOp, StepStatus};

    use crate::{
        fakes::{Fakes, app_with},
        state::FlagKind,
    };

    use super::*;

    fn step(urn: &str, status: StepStatus) -> OperationEvent {
        OperationEvent::Step(OperationStep {
            urn: urn.into(),
            resource_type: "aws:s3/bucket:Bucket".into(),
            name: "assets".into(),
            parent: None,
            op: StepOp::Create,
            status,
            message: None,
        })
    }

    /// Drain the armed stream through `update`, like the event loop does.
    async fn pump(app: &mut App, mut commands: Vec<Command>) -> Vec<Command> {
        let mut seen = Vec::new();
        loop {
            let wait = commands
                .iter()
                .any(|command| matches!(command, Command::WaitPreview | Command::WaitOperation));
            seen.extend(commands.iter().cloned());
            if !wait {
                return seen;
            }
            app.arm_stream();
            let message = tokio::time::timeout(Duration::from_secs(5), app.next_stream_message())
                .await
                .unwrap();
            commands = app.update(message);
        }
    }

    #[tokio::test]
    async fn test_preview_runs_to_complete() {
        let fakes = Fakes::default();
        fakes.executor.push_preview(PreviewEvent::Step(PreviewStep {
            urn: "urn:bucket".into(),
            op: StepOp::Create,
            inputs: Some(json!({ "acl": "private" }).as_object().cloned().unwrap()),
            ..Default::default()
        }));
        let mut app = app_with(&fakes, Some("dev"));
        app.state.init_state = InitState::Complete;

        let commands = app.start_preview(OperationKind::Up);
        assert_eq!(app.state.op_state, OperationState::Starting);
        assert_eq!(commands, vec![Command::WaitPreview]);

        pump(&mut app, commands).await;

        assert_eq!(app.state.op_state, OperationState::Complete);
        assert_eq!(app.ui.view, ViewMode::Preview);
        assert_eq!(app.ui.operation_items.len(), 1);
        assert!(!app.operation.has_cancel_handle());
        assert!(!app.operation.is_armed());
    }

    #[tokio::test]
    async fn test_preview_options_carry_flags_and_env() {
        let fakes = Fakes::default();
        fakes.plugins.set_env([("AWS_PROFILE", "prod"), ("TOKEN", "t")]);
        let mut app = app_with(&fakes, Some("dev"));
        let bucket = ResourceUrn::from("urn:bucket");
        app.state.toggle_flag(&bucket, FlagKind::Target);
        app.state.toggle_flag(&bucket, FlagKind::Replace);

        app.start_preview(OperationKind::Up);

        let calls = fakes.executor.calls();
        let (label, options) = &calls[0];
        assert_eq!(label, "preview up");
        assert!(options.targets.contains(&bucket));
        assert!(options.replaces.contains(&bucket));
        assert_eq!(options.env["AWS_PROFILE"], "prod");
        assert_eq!(options.env["HOME"], "/home/me");
    }

    #[tokio::test]
    async fn test_flags_follow_their_stack_across_switches() {
        let fakes = Fakes::default();
        let mut app = app_with(&fakes, Some("dev"));
        app.state.init_state = InitState::Complete;
        let dev_bucket =
            ResourceUrn::from("urn:pulumi:dev::shop::aws:s3/bucket:Bucket::assets");
        let prod_bucket =
            ResourceUrn::from("urn:pulumi:prod::shop::aws:s3/bucket:Bucket::assets");
        app.state.toggle_flag(&dev_bucket, FlagKind::Target);

        app.select_stack("prod".to_string());
        app.state.clear_busy();
        app.state.toggle_flag(&prod_bucket, FlagKind::Exclude);
        let commands = app.start_preview(OperationKind::Up);
        pump(&mut app, commands).await;

        app.select_stack("dev".to_string());
        app.state.clear_busy();
        assert_eq!(app.state.flags.len(), 2);
        let commands = app.start_preview(OperationKind::Up);
        pump(&mut app, commands).await;

        let calls = fakes.executor.calls();
        let (_, on_prod) = &calls[0];
        assert!(on_prod.targets.is_empty());
        assert_eq!(on_prod.excludes, BTreeSet::from([prod_bucket.clone()]));
        let (_, on_dev) = &calls[1];
        assert_eq!(on_dev.targets, BTreeSet::from([dev_bucket]));
        assert!(on_dev.excludes.is_empty());
    }

    #[tokio::test]
    async fn test_preview_is_queued_while_busy() {
        let fakes = Fakes::default();
        let mut app = app_with(&fakes, Some("dev"));
        app.state.set_busy("authenticating");

        let commands = app.start_preview(OperationKind::Refresh);

        assert!(commands.is_empty());
        assert_eq!(app.state.op_state, OperationState::Idle);
        assert_eq!(
            app.state.pending_ops(),
            &[PendingOperation::Preview(OperationKind::Refresh)]
        );
        assert!(fakes.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_confirmation_gate() {
        let fakes = Fakes::default();
        let mut app = app_with(&fakes, Some("dev"));

        let commands = app.maybe_confirm_execution(OperationKind::Destroy);

        assert!(commands.is_empty());
        assert_eq!(app.state.pending_operation, Some(OperationKind::Destroy));
        assert_eq!(app.ui.focus.top(), Focus::ConfirmModal);
        assert!(fakes.executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_completed_preview_of_same_kind_executes_directly() {
        let fakes = Fakes::default();
        let mut app = app_with(&fakes, Some("dev"));
        let commands = app.start_preview(OperationKind::Up);
        pump(&mut app, commands).await;

        let commands = app.maybe_confirm_execution(OperationKind::Up);

        assert_eq!(commands, vec![Command::WaitOperation]);
        assert_eq!(app.ui.view, ViewMode::Execute);
        assert_eq!(app.state.pending_operation, None);

        let mut app2 = app_with(&fakes, Some("dev"));
        let commands = app2.start_preview(OperationKind::Up);
        pump(&mut app2, commands).await;
        assert!(app2.maybe_confirm_execution(OperationKind::Destroy).is_empty());
        assert_eq!(app2.state.pending_operation, Some(OperationKind::Destroy));
    }

    #[tokio::test]
    async fn test_execution_refused_while_active() {
        let fakes = Fakes::default();
        fakes.executor.hold_open();
        let mut app = app_with(&fakes, Some("dev"));
        app.start_preview(OperationKind::Up);

        assert!(app.maybe_confirm_execution(OperationKind::Up).is_empty());
        assert_eq!(app.state.pending_operation, None);
        assert_eq!(fakes.executor.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_execution_streams_statuses_and_reloads() {
        let fakes = Fakes::default();
        fakes.executor.push_operation(step("urn:bucket", StepStatus::Running));
        fakes.executor.push_operation(step("urn:bucket", StepStatus::Success));
        let mut app = app_with(&fakes, Some("dev"));
        app.state.init_state = InitState::Complete;

        let commands = app.start_execution(OperationKind::Up);
        let seen = pump(&mut app, commands).await;

        assert_eq!(app.state.op_state, OperationState::Complete);
        assert_eq!(app.ui.operation_items.len(), 1);
        assert_eq!(
            app.ui.operation_items.get_index(0).unwrap().status,
            crate::item::ItemStatus::Success
        );
        assert!(seen.iter().any(|command| matches!(
            command,
            Command::LoadResources { during_init: false, .. }
        )));
    }

    #[tokio::test]
    async fn test_cancel_then_done_completes() {
        let fakes = Fakes::default();
        fakes.executor.hold_open();
        fakes.executor.push_operation(step("urn:bucket", StepStatus::Running));
        let mut app = app_with(&fakes, Some("dev"));

        let commands = app.start_execution(OperationKind::Destroy);
        assert_eq!(commands, vec![Command::WaitOperation]);
        app.arm_stream();
        let message = app.next_stream_message().await;
        let commands = app.update(message);
        assert_eq!(commands, vec![Command::WaitOperation]);
        assert_eq!(app.state.op_state, OperationState::Running);

        let commands = app.cancel_operation();
        assert_eq!(app.state.op_state, OperationState::Cancelling);
        assert!(matches!(commands[..], [Command::CancelTimeout { generation: 1, .. }]));
        assert!(fakes.executor.cancelled());

        fakes.executor.release();
        app.arm_stream();
        let message = app.next_stream_message().await;
        app.update(message);

        assert_eq!(app.state.op_state, OperationState::Complete);
        assert!(!app.operation.has_cancel_handle());
        assert!(app.on_cancel_timeout(1).is_empty());
    }

    #[tokio::test]
    async fn test_cancel_only_while_running() {
        let fakes = Fakes::default();
        fakes.executor.hold_open();
        let mut app = app_with(&fakes, Some("dev"));
        app.start_execution(OperationKind::Up);

        assert_eq!(app.state.op_state, OperationState::Starting);
        assert!(app.cancel_operation().is_empty());
        assert!(!fakes.executor.cancelled());
    }

    #[tokio::test]
    async fn test_cancel_timeout_abandons_stuck_operation() {
        let fakes = Fakes::default();
        fakes.executor.hold_open();
        fakes.executor.push_operation(step("urn:bucket", StepStatus::Running));
        let mut app = app_with(&fakes, Some("dev"));
        app.start_execution(OperationKind::Up);
        app.arm_stream();
        let message = app.next_stream_message().await;
        app.update(message);
        app.cancel_operation();

        let commands = app.on_cancel_timeout(app.operation.generation());

        assert_eq!(app.state.op_state, OperationState::Error);
        assert_eq!(app.ui.operation_error.as_deref(), Some("cancellation timed out"));
        assert!(!app.operation.has_cancel_handle());
        assert!(matches!(commands[..], [Command::ExpireToast { .. }]));
    }

    #[tokio::test]
    async fn test_failed_initial_preview_shows_error_modal() {
        let fakes = Fakes::default();
        fakes
            .executor
            .push_preview(PreviewEvent::Error("quota exceeded".into()));
        let mut app = app_with(&fakes, Some("dev"));
        app.state.init_state = InitState::LoadingResources;

        let commands = app.start_preview(OperationKind::Up);
        pump(&mut app, commands).await;

        assert_eq!(app.state.init_state, InitState::Complete);
        assert_eq!(app.state.op_state, OperationState::Error);
        assert_eq!(
            app.state.err.as_deref(),
            Some("initial preview failed: quota exceeded")
        );
        assert_eq!(app.ui.focus.top(), Focus::ErrorModal);
    }

    #[tokio::test]
    async fn test_stale_events_are_ignored() {
        let fakes = Fakes::default();
        let mut app = app_with(&fakes, Some("dev"));
        app.start_preview(OperationKind::Up);

        let commands = app.on_preview_event(0, PreviewEvent::Error("old".into()));

        assert!(commands.is_empty());
        assert_eq!(app.state.op_state, OperationState::Starting);
    }
}
