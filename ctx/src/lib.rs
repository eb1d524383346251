mod paths;

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::debug;

pub use crate::paths::{Paths, PathsError};

#[derive(Error, Debug)]
pub enum ContextError {
    #[error(transparent)]
    Paths(#[from] PathsError),

    #[error("failed to resolve working directory {path}: {source}")]
    Workdir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Where the app is pointed: the workspace, the stack, and the environment
/// operations start from.
#[derive(Debug, Clone)]
pub struct AppContext {
    cwd: PathBuf,
    workdir: PathBuf,
    stack: Option<String>,
    program_name: String,
    base_env: BTreeMap<String, String>,
    paths: Paths,
}

impl AppContext {
    /// Build a context from a start directory and a captured environment.
    ///
    /// The start directory is canonicalized; it becomes both the discovery
    /// root and the initial workspace.
    pub fn create(
        cwd: &Path,
        stack: Option<String>,
        base_env: BTreeMap<String, String>,
    ) -> Result<Self, ContextError> {
        let cwd = cwd
            .canonicalize()
            .map_err(|source| ContextError::Workdir {
                path: cwd.to_owned(),
                source,
            })?;
        let paths = Paths::from_env(&base_env)?;
        debug!(cwd = %cwd.display(), ?stack, "context created");
        Ok(Self::new(cwd.clone(), cwd, stack, base_env, paths))
    }

    pub fn new(
        cwd: PathBuf,
        workdir: PathBuf,
        stack: Option<String>,
        base_env: BTreeMap<String, String>,
        paths: Paths,
    ) -> Self {
        let program_name = dir_name(&workdir);
        Self {
            cwd,
            workdir,
            stack,
            program_name,
            base_env,
            paths,
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// Project name, falling back to the workspace directory name until the
    /// project file has been read.
    pub fn program_name(&self) -> &str {
        &self.program_name
    }

    pub fn base_env(&self) -> &BTreeMap<String, String> {
        &self.base_env
    }

    pub fn paths(&self) -> &Paths {
        &self.paths
    }

    /// Point at another workspace. The stack is forgotten because stacks are
    /// per-workspace.
    pub fn set_workdir(&mut self, workdir: PathBuf) {
        self.program_name = dir_name(&workdir);
        self.workdir = workdir;
        self.stack = None;
    }

    pub fn set_stack(&mut self, stack: impl Into<String>) {
        self.stack = Some(stack.into());
    }

    pub fn set_program_name(&mut self, name: impl Into<String>) {
        self.program_name = name.into();
    }
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
