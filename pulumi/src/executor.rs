use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
    process::ExitStatus,
    time::Duration,
};

use strata_cmd::Command;
use strata_engine::{
    OperationEvent, OperationExecutor, OperationKind, OperationOptions, PreviewEvent,
};
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncRead, BufReader},
    sync::mpsc::{self, Receiver, Sender},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    PulumiCli, PulumiError,
    events::{StreamEvent, decode_line, error_message},
};

const EVENT_BUFFER: usize = 256;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_TAIL: usize = 20;

impl OperationExecutor for PulumiCli {
    fn preview(
        &self,
        cancel: CancellationToken,
        workdir: &Path,
        stack: &str,
        kind: OperationKind,
        options: OperationOptions,
    ) -> Receiver<PreviewEvent> {
        let args = preview_args(kind, stack, &options);
        self.stream(cancel, workdir, args, &options)
    }

    fn up(
        &self,
        cancel: CancellationToken,
        workdir: &Path,
        stack: &str,
        options: OperationOptions,
    ) -> Receiver<OperationEvent> {
        let args = execute_args(OperationKind::Up, stack, &options);
        self.stream(cancel, workdir, args, &options)
    }

    fn refresh(
        &self,
        cancel: CancellationToken,
        workdir: &Path,
        stack: &str,
        options: OperationOptions,
    ) -> Receiver<OperationEvent> {
        let args = execute_args(OperationKind::Refresh, stack, &options);
        self.stream(cancel, workdir, args, &options)
    }

    fn destroy(
        &self,
        cancel: CancellationToken,
        workdir: &Path,
        stack: &str,
        options: OperationOptions,
    ) -> Receiver<OperationEvent> {
        let args = execute_args(OperationKind::Destroy, stack, &options);
        self.stream(cancel, workdir, args, &options)
    }
}

impl PulumiCli {
    fn stream<E: StreamEvent>(
        &self,
        cancel: CancellationToken,
        workdir: &Path,
        args: Vec<String>,
        options: &OperationOptions,
    ) -> Receiver<E> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let log_path = self
            .event_dir
            .join(format!("events-{}.jsonl", cuid2::create_id()));

        let mut command = self.command(workdir);
        command
            .envs(&options.env)
            .args(&args)
            .arg("--event-log")
            .arg(&log_path);

        tokio::spawn(async move {
            let outcome = match run_streaming(command, &log_path, cancel, &tx).await {
                Ok(outcome) => outcome,
                Err(error) => Some(E::error(error.to_string())),
            };
            match outcome {
                Some(outcome) => {
                    if tx.send(outcome).await.is_err() {
                        debug!("event receiver dropped before the final event");
                    }
                }
                None => debug!("event receiver dropped, abandoning operation"),
            }
            if let Err(error) = tokio::fs::remove_file(&log_path).await {
                debug!(path = %log_path.display(), %error, "failed to remove event log");
            }
        });

        rx
    }
}

/// Run the engine and forward decoded events until it exits.
///
/// Returns the terminal event, or `None` once the receiver is gone (the child
/// is killed on drop).
async fn run_streaming<E: StreamEvent>(
    mut command: Command,
    log_path: &Path,
    cancel: CancellationToken,
    tx: &Sender<E>,
) -> Result<Option<E>, PulumiError> {
    if let Some(dir) = log_path.parent() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|source| PulumiError::Io {
                path: dir.to_owned(),
                source,
            })?;
    }

    info!(command = %command, "starting operation");
    let mut child = command.spawn()?;
    let stderr = child.stderr.take().map(|stderr| tokio::spawn(tail_lines(stderr)));
    if let Some(mut stdout) = child.stdout.take() {
        tokio::spawn(async move { tokio::io::copy(&mut stdout, &mut tokio::io::sink()).await });
    }

    let mut tail = LogTail::new(log_path.to_owned());
    let mut last_error = None;
    let mut interrupted = false;
    let mut poll = tokio::time::interval(POLL_INTERVAL);

    let status: ExitStatus = loop {
        tokio::select! {
            _ = cancel.cancelled(), if !interrupted => {
                interrupted = true;
                info!("interrupting operation");
                if let Err(error) = strata_cmd::interrupt(&mut child) {
                    warn!(%error, "failed to interrupt operation");
                }
            }
            _ = poll.tick() => {}
        }

        if !forward(&mut tail, tx, &mut last_error).await? {
            return Ok(None);
        }
        if let Some(status) = child.try_wait().map_err(PulumiError::Wait)? {
            break status;
        }
    };

    if !forward(&mut tail, tx, &mut last_error).await? {
        return Ok(None);
    }

    let stderr = match stderr {
        Some(task) => task.await?,
        None => VecDeque::new(),
    };

    info!(%status, interrupted, "operation exited");
    if status.success() || interrupted {
        return Ok(Some(E::done()));
    }

    let message = last_error
        .or_else(|| {
            stderr
                .iter()
                .rev()
                .map(|line| line.trim())
                .find(|line| !line.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| format!("engine exited with {status}"));
    Ok(Some(E::error(message)))
}

/// Send every complete new line. `false` once the receiver is gone.
async fn forward<E: StreamEvent>(
    tail: &mut LogTail,
    tx: &Sender<E>,
    last_error: &mut Option<String>,
) -> Result<bool, PulumiError> {
    for line in tail.read_lines().await? {
        let event = match decode_line(&line) {
            Ok(Some(event)) => event,
            Ok(None) => continue,
            Err(error) => {
                warn!(%error, "skipping undecodable engine event");
                continue;
            }
        };
        if let Some(message) = error_message(&event) {
            *last_error = Some(message);
        }
        let Some(event) = E::decode(&event) else {
            continue;
        };
        if tx.send(event).await.is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Follows a file the engine appends JSON lines to.
struct LogTail {
    path: PathBuf,
    reader: Option<BufReader<File>>,
    partial: Vec<u8>,
}

impl LogTail {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            reader: None,
            partial: Vec::new(),
        }
    }

    async fn read_lines(&mut self) -> Result<Vec<String>, PulumiError> {
        if self.reader.is_none() {
            match File::open(&self.path).await {
                Ok(file) => self.reader = Some(BufReader::new(file)),
                // Not created yet.
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(Vec::new());
                }
                Err(source) => {
                    return Err(PulumiError::Io {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }
        let Some(reader) = self.reader.as_mut() else {
            return Ok(Vec::new());
        };

        let mut lines = Vec::new();
        loop {
            let read = reader
                .read_until(b'\n', &mut self.partial)
                .await
                .map_err(|source| PulumiError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            if read == 0 {
                break;
            }
            if self.partial.ends_with(b"\n") {
                let line = std::mem::take(&mut self.partial);
                lines.push(String::from_utf8_lossy(&line).into_owned());
            }
        }
        Ok(lines)
    }
}

async fn tail_lines<R: AsyncRead + Unpin>(reader: R) -> VecDeque<String> {
    let mut lines = BufReader::new(reader).lines();
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == STDERR_TAIL {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail
}

fn preview_args(kind: OperationKind, stack: &str, options: &OperationOptions) -> Vec<String> {
    let mut args: Vec<String> = match kind {
        OperationKind::Up => vec!["preview".into()],
        OperationKind::Refresh | OperationKind::Destroy => {
            vec![kind.command().into(), "--preview-only".into()]
        }
    };
    push_common_args(&mut args, kind, stack, options);
    args
}

fn execute_args(kind: OperationKind, stack: &str, options: &OperationOptions) -> Vec<String> {
    let mut args = vec![
        kind.command().to_string(),
        "--yes".into(),
        "--skip-preview".into(),
    ];
    push_common_args(&mut args, kind, stack, options);
    args
}

fn push_common_args(
    args: &mut Vec<String>,
    kind: OperationKind,
    stack: &str,
    options: &OperationOptions,
) {
    args.extend([
        "--stack".into(),
        stack.into(),
        "--non-interactive".into(),
        "--color".into(),
        "never".into(),
    ]);
    for urn in &options.targets {
        args.extend(["--target".into(), urn.to_string()]);
    }
    // Only updates can force replacement.
    if kind == OperationKind::Up {
        for urn in &options.replaces {
            args.extend(["--replace".into(), urn.to_string()]);
        }
    }
    for urn in &options.excludes {
        args.extend(["--exclude".into(), urn.to_string()]);
    }
}
