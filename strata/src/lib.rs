mod config;
mod draw;
mod tui;

use std::{collections::BTreeMap, path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, ValueEnum};
use strata_app::{App, AppSettings, Clipboard, Dependencies};
use strata_ctx::{AppContext, ContextError};
use strata_engine::{OperationKind, PluginProvider};
use strata_plugins::CommandPlugins;
use strata_pulumi::PulumiCli;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub use crate::config::{Config, ConfigError};
pub use crate::tui::TuiError;

#[derive(Parser, Debug)]
#[command(name = "strata", version, about = "Browse and operate on infrastructure stacks")]
pub struct Cli {
    /// What to open with.
    #[arg(value_enum, default_value_t = StartCommand::Stack)]
    pub command: StartCommand,

    /// Start in this directory instead of the current one.
    #[arg(short = 'C', long = "cwd", value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Stack to select on startup.
    #[arg(short = 's', long = "stack", value_name = "NAME")]
    pub stack: Option<String>,

    /// Log at debug level.
    #[arg(long)]
    pub debug: bool,

    #[arg(long = "config", env = "STRATA_CONFIG", value_name = "PATH")]
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum StartCommand {
    /// Show the stack's resources.
    #[default]
    Stack,
    /// Preview an update.
    Up,
    /// Preview a refresh.
    Refresh,
    /// Preview a destroy.
    Destroy,
}

impl StartCommand {
    pub fn initial_operation(self) -> Option<OperationKind> {
        match self {
            StartCommand::Stack => None,
            StartCommand::Up => Some(OperationKind::Up),
            StartCommand::Refresh => Some(OperationKind::Refresh),
            StartCommand::Destroy => Some(OperationKind::Destroy),
        }
    }
}

impl Cli {
    /// `--debug` wins over `STRATA_LOG`.
    pub fn log_filter(&self, env: &BTreeMap<String, String>) -> String {
        if self.debug {
            return "debug".to_string();
        }
        env.get("STRATA_LOG")
            .filter(|filter| !filter.is_empty())
            .cloned()
            .unwrap_or_else(|| "info".to_string())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tui(#[from] TuiError),

    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The process environment, skipping entries that are not unicode.
pub fn capture_env() -> BTreeMap<String, String> {
    std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect()
}

pub fn create_context(cli: &Cli, env: BTreeMap<String, String>) -> Result<AppContext, AppError> {
    let cwd = cli.cwd.clone().unwrap_or_else(|| PathBuf::from("."));
    Ok(AppContext::create(&cwd, cli.stack.clone(), env)?)
}

struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn copy(&self, text: &str) -> Result<(), String> {
        let mut clipboard = arboard::Clipboard::new().map_err(|error| error.to_string())?;
        clipboard
            .set_text(text.to_owned())
            .map_err(|error| error.to_string())
    }
}

pub async fn run(cli: Cli, ctx: AppContext) -> Result<(), AppError> {
    let config = Config::locate(cli.config_path.as_deref(), ctx.paths()).await?;
    info!(
        workdir = %ctx.workdir().display(),
        stack = ?ctx.stack(),
        plugins = config.plugins.len(),
        "starting"
    );

    let cancel = CancellationToken::new();
    spawn_signal_handler(cancel.clone());

    let plugins: Arc<dyn PluginProvider> = Arc::new(CommandPlugins::new(config.plugins.clone()));
    let pulumi = Arc::new(PulumiCli::new(
        &config.pulumi,
        plugins.clone(),
        ctx.paths().runtime_dir().join("events"),
    ));
    let deps = Dependencies {
        executor: pulumi.clone(),
        reader: pulumi.clone(),
        mutator: pulumi.clone(),
        initializer: pulumi,
        plugins,
        clipboard: Arc::new(SystemClipboard),
    };
    let settings = AppSettings {
        history_page_size: config.history_page_size,
        cancel_timeout: Duration::from_secs(config.cancel_timeout_secs),
        initial_operation: cli.command.initial_operation(),
        ..AppSettings::default()
    };

    let app = App::new(ctx, deps.clone(), settings, cancel.clone());
    tui::run(app, deps, cancel).await?;
    info!("exited");
    Ok(())
}

fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("signal received, shutting down");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(error) => {
            tracing::warn!(%error, "cannot listen for SIGTERM");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        Ok(()) = tokio::signal::ctrl_c() => {}
        Some(()) = terminate.recv() => {}
        else => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}
