use tokio::sync::mpsc::Sender;
use tracing::{debug, error};

use crate::{
    App,
    bulk::bulk_state_delete,
    command::{Command, Invalidate, StackListFor},
    deps::Dependencies,
    message::{InitMessage, Message, OperationMessage, SelectionMessage, UiMessage},
};

/// Carries out [`Command`]s.
///
/// Each command runs on its own task and answers with one message on the
/// app's channel. Waits are not tasks: they arm the app's stream instead.
#[derive(Clone)]
pub struct Runtime {
    deps: Dependencies,
    tx: Sender<Message>,
}

impl Runtime {
    pub fn new(deps: Dependencies, tx: Sender<Message>) -> Self {
        Self { deps, tx }
    }

    pub fn run(&self, app: &mut App, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::WaitPreview | Command::WaitOperation => app.arm_stream(),
                command => self.spawn(command),
            }
        }
    }

    fn spawn(&self, command: Command) {
        let deps = self.deps.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let Some(message) = perform(&deps, command).await else {
                return;
            };
            if tx.send(message).await.is_err() {
                debug!("app closed before command finished");
            }
        });
    }
}

fn stringify<T, E: ToString>(result: Result<T, E>) -> Result<T, String> {
    result.map_err(|error| error.to_string())
}

async fn perform(deps: &Dependencies, command: Command) -> Option<Message> {
    let message = match command {
        Command::CheckWorkspace { workdir } => Message::Init(InitMessage::WorkspaceChecked {
            valid: deps.reader.is_workspace(&workdir),
        }),
        Command::Authenticate {
            workdir,
            program_name,
            stack,
            purpose,
            invalidate,
            ticket,
        } => {
            match invalidate {
                Invalidate::Nothing => {}
                Invalidate::Context => deps.plugins.invalidate_credentials_for_context(
                    &workdir,
                    stack.as_deref(),
                    &program_name,
                ),
                Invalidate::All => deps.plugins.invalidate_all_credentials(),
            }
            let result = deps
                .plugins
                .initialize(&workdir, &program_name, stack.as_deref())
                .await;
            Message::Init(InitMessage::PluginsLoaded {
                purpose,
                ticket,
                result: stringify(result),
            })
        }
        Command::FetchStacks { workdir, purpose } => {
            let result = stringify(deps.reader.get_stacks(&workdir).await);
            match purpose {
                StackListFor::Init => Message::Init(InitMessage::StacksLoaded(result)),
                StackListFor::Selector => Message::Selection(SelectionMessage::StacksLoaded(result)),
            }
        }
        Command::FetchWorkspaces { cwd, workdir } => {
            let result = deps.reader.find_workspaces(&cwd, &workdir).await;
            Message::Selection(SelectionMessage::WorkspacesLoaded(stringify(result)))
        }
        Command::FetchProjectInfo { workdir } => {
            let result = deps.reader.get_project_info(&workdir).await;
            Message::Init(InitMessage::ProjectInfoLoaded(stringify(result)))
        }
        Command::FetchWhoAmI { workdir } => {
            let result = deps.reader.get_whoami(&workdir).await;
            Message::Init(InitMessage::WhoAmILoaded(stringify(result)))
        }
        Command::LoadResources {
            workdir,
            stack,
            during_init,
        } => {
            let result = deps.reader.get_resources(&workdir, &stack).await;
            Message::Init(InitMessage::ResourcesLoaded {
                during_init,
                result: stringify(result),
            })
        }
        Command::FetchHistory {
            workdir,
            stack,
            page_size,
            page,
        } => {
            let result = deps
                .reader
                .get_history(&workdir, &stack, page_size, page)
                .await;
            Message::Operation(OperationMessage::HistoryLoaded {
                page,
                result: stringify(result),
            })
        }
        Command::InitStack { workdir, name } => {
            let result = deps.initializer.init_stack(&workdir, &name).await;
            Message::Selection(SelectionMessage::StackInitialized { name, result })
        }
        Command::BulkStateDelete {
            workdir,
            stack,
            urns,
        } => {
            let report = bulk_state_delete(deps.mutator.as_ref(), &workdir, &stack, &urns).await;
            Message::Operation(OperationMessage::BulkDeleteFinished(report))
        }
        Command::SetProtect {
            workdir,
            stack,
            urn,
            protect,
        } => {
            let result = match protect {
                true => deps.mutator.protect(&workdir, &stack, &urn).await,
                false => deps.mutator.unprotect(&workdir, &stack, &urn).await,
            };
            Message::Operation(OperationMessage::ProtectFinished {
                urn,
                protect,
                result,
            })
        }
        Command::Import {
            workdir,
            stack,
            request,
        } => {
            let result = deps
                .mutator
                .import(
                    &workdir,
                    &stack,
                    &request.resource_type,
                    &request.name,
                    &request.id,
                    request.parent.as_ref(),
                )
                .await;
            Message::Operation(OperationMessage::ImportFinished {
                name: request.name,
                result,
            })
        }
        Command::CopyToClipboard(text) => {
            let clipboard = deps.clipboard.clone();
            let copied =
                tokio::task::spawn_blocking(move || clipboard.copy(&text).map(|()| text)).await;
            let result = match copied {
                Ok(result) => result,
                Err(join) => {
                    error!(error = %join, "clipboard task failed");
                    Err(join.to_string())
                }
            };
            Message::Ui(UiMessage::Copied(result))
        }
        Command::ExpireToast { id, after } => {
            tokio::time::sleep(after).await;
            Message::Ui(UiMessage::ToastExpired(id))
        }
        Command::CancelTimeout { generation, after } => {
            tokio::time::sleep(after).await;
            Message::Operation(OperationMessage::CancelTimedOut { generation })
        }
        Command::WaitPreview | Command::WaitOperation => return None,
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use strata_engine::{
        OperationEvent, OperationKind, OperationStep, ResourceInfo, StepOp, StepStatus,
    };
    use tokio::sync::mpsc::{self, Receiver};

    use crate::{
        fakes::{Fakes, app_with},
        state::{InitState, OperationState},
    };

    use super::*;

    async fn settle(
        app: &mut App,
        runtime: &Runtime,
        rx: &mut Receiver<Message>,
        done: impl Fn(&App) -> bool,
    ) {
        let wait = async {
            while !done(app) {
                let message = tokio::select! {
                    Some(message) = rx.recv() => message,
                    message = app.next_stream_message() => message,
                };
                if matches!(message, Message::Ui(UiMessage::ToastExpired(_))) {
                    continue;
                }
                let commands = app.update(message);
                runtime.run(app, commands);
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .unwrap();
    }

    fn runtime(fakes: &Fakes) -> (Runtime, Receiver<Message>) {
        let (tx, rx) = mpsc::channel(64);
        (Runtime::new(fakes.deps(), tx), rx)
    }

    #[tokio::test]
    async fn test_startup_end_to_end() {
        let fakes = Fakes::default();
        *fakes.reader.resources.lock().unwrap() = Ok(vec![ResourceInfo {
            urn: "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::assets".into(),
            resource_type: "aws:s3/bucket:Bucket".into(),
            ..Default::default()
        }]);
        let (runtime, mut rx) = runtime(&fakes);
        let mut app = app_with(&fakes, None);

        let commands = app.start();
        runtime.run(&mut app, commands);
        settle(&mut app, &runtime, &mut rx, |app| {
            app.state().init_state == InitState::Complete
                && !app.state().is_busy()
                && app.ui().project.is_some()
        })
        .await;

        assert_eq!(app.context().stack(), Some("dev"));
        assert_eq!(app.context().program_name(), "shop");
        assert_eq!(app.ui().resources.len(), 1);
        assert_eq!(fakes.plugins.log(), vec!["initialize -", "initialize dev"]);
    }

    #[tokio::test]
    async fn test_execution_reloads_through_runtime() {
        let fakes = Fakes::default();
        fakes.executor.push_operation(OperationEvent::Step(OperationStep {
            urn: "urn:pulumi:dev::shop::aws:s3/bucket:Bucket::assets".into(),
            resource_type: "aws:s3/bucket:Bucket".into(),
            name: "assets".into(),
            parent: None,
            op: StepOp::Create,
            status: StepStatus::Success,
            message: None,
        }));
        let (runtime, mut rx) = runtime(&fakes);
        let mut app = app_with(&fakes, Some("dev"));
        app.state.init_state = InitState::Complete;

        let commands = app.start_execution(OperationKind::Up);
        runtime.run(&mut app, commands);
        settle(&mut app, &runtime, &mut rx, |app| {
            app.state().op_state == OperationState::Complete
        })
        .await;

        assert_eq!(app.ui().operation_items.len(), 1);
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();
        assert!(matches!(
            message,
            Some(Message::Init(InitMessage::ResourcesLoaded {
                during_init: false,
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_explicit_reauth_invalidates_context() {
        let fakes = Fakes::default();
        let (runtime, mut rx) = runtime(&fakes);
        let mut app = app_with(&fakes, Some("dev"));
        app.state.init_state = InitState::Complete;

        let commands = app.reauthenticate();
        runtime.run(&mut app, commands);
        settle(&mut app, &runtime, &mut rx, |app| !app.state().is_busy()).await;

        assert_eq!(fakes.plugins.log(), vec!["invalidate dev", "initialize dev"]);
    }

    #[tokio::test]
    async fn test_bulk_delete_through_runtime() {
        let fakes = Fakes::default();
        let (runtime, mut rx) = runtime(&fakes);
        let mut app = app_with(&fakes, Some("dev"));
        app.state.init_state = InitState::Complete;

        runtime.run(
            &mut app,
            vec![Command::BulkStateDelete {
                workdir: "/src/infra".into(),
                stack: "dev".to_string(),
                urns: vec!["urn:pulumi:dev::shop::aws:s3/bucket:Bucket::assets".into()],
            }],
        );
        let message = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap();

        let Some(Message::Operation(OperationMessage::BulkDeleteFinished(report))) = message else {
            panic!("unexpected message: {message:?}");
        };
        assert_eq!(report.succeeded.len(), 1);
        assert_eq!(fakes.mutator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_timers_answer_after_delay() {
        let fakes = Fakes::default();
        let (runtime, mut rx) = runtime(&fakes);
        let mut app = app_with(&fakes, Some("dev"));

        runtime.run(
            &mut app,
            vec![Command::CancelTimeout {
                generation: 3,
                after: Duration::from_millis(10),
            }],
        );

        assert_eq!(
            rx.recv().await,
            Some(Message::Operation(OperationMessage::CancelTimedOut { generation: 3 }))
        );
    }

    #[tokio::test]
    async fn test_copy_reports_text() {
        let fakes = Fakes::default();
        let (runtime, mut rx) = runtime(&fakes);
        let mut app = app_with(&fakes, Some("dev"));

        runtime.run(&mut app, vec![Command::CopyToClipboard("urn:x".to_string())]);

        assert_eq!(
            rx.recv().await,
            Some(Message::Ui(UiMessage::Copied(Ok("urn:x".to_string()))))
        );
        assert_eq!(*fakes.clipboard.copied.lock().unwrap(), vec!["urn:x"]);
    }
}
