use std::{fs::OpenOptions, path::Path, sync::Mutex};

use clap::Parser;
use strata::{AppError, Cli, capture_env, create_context, run};
use tracing::{debug, error};
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let env = capture_env();
    let filter = cli.log_filter(&env);

    let ctx = match create_context(&cli, env) {
        Ok(ctx) => ctx,
        Err(err) => {
            eprintln!("strata: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = install_tracing(&filter, &ctx.paths().log_file()) {
        eprintln!("strata: {err}");
        std::process::exit(1);
    }
    debug!(cli = ?cli, "parsed cli");

    if let Err(err) = run(cli, ctx).await {
        error!("{err}");
        eprintln!("strata: {err}");
        std::process::exit(1);
    }
}

/// The terminal belongs to the UI, so logs go to a file.
fn install_tracing(level: &str, path: &Path) -> Result<(), AppError> {
    let log_error = |source| AppError::LogFile {
        path: path.to_owned(),
        source,
    };
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(log_error)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(log_error)?;

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}
