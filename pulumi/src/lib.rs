mod events;
mod executor;
mod mutator;
mod reader;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use strata_cmd::{Command, CommandError};
use strata_engine::{EngineError, PluginProvider};
use thiserror::Error;

pub use crate::events::{EngineEvent, StreamEvent, decode_line, error_message};

#[derive(Error, Debug)]
pub enum PulumiError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("failed to decode {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Yaml { path: PathBuf, message: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to wait for engine process: {0}")]
    Wait(#[source] std::io::Error),

    #[error("no project file in {0}")]
    NoProject(PathBuf),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl PulumiError {
    fn into_engine(self, operation: &'static str) -> EngineError {
        match self {
            PulumiError::Json { what, source } => EngineError::Decode { what, source },
            PulumiError::Io { path, source } => EngineError::Io {
                path: path.display().to_string(),
                source,
            },
            PulumiError::Command(error) => EngineError::Backend {
                operation,
                message: error.summary(),
            },
            other => EngineError::Backend {
                operation,
                message: other.to_string(),
            },
        }
    }
}

/// The engine CLI as a backend.
///
/// Every invocation runs in the workspace directory with the credential
/// plugins' environment merged over the inherited one.
pub struct PulumiCli {
    binary: PathBuf,
    plugins: Arc<dyn PluginProvider>,
    event_dir: PathBuf,
}

impl PulumiCli {
    /// `event_dir` holds the per-operation event logs while they stream.
    pub fn new(
        binary: impl Into<PathBuf>,
        plugins: Arc<dyn PluginProvider>,
        event_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary: binary.into(),
            plugins,
            event_dir: event_dir.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, workdir: &Path) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .current_dir(workdir)
            .envs(self.plugins.get_all_env())
            .env("PULUMI_SKIP_UPDATE_CHECK", "true");
        command
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(
    what: &'static str,
    text: &str,
) -> Result<T, PulumiError> {
    serde_json::from_str(text).map_err(|source| PulumiError::Json { what, source })
}
