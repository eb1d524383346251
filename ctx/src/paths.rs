use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};
use thiserror::Error;

const PROJECT_NAME: &str = "strata";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    config_dir: PathBuf,
    data_dir: PathBuf,
    runtime_dir: PathBuf,
}

#[derive(Error, Debug, Clone)]
pub enum PathsError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),
}

impl Paths {
    pub fn new(config_dir: PathBuf, data_dir: PathBuf, runtime_dir: PathBuf) -> Self {
        Self {
            config_dir,
            data_dir,
            runtime_dir,
        }
    }

    /// Resolve directories from a captured environment.
    #[cfg(not(target_os = "windows"))]
    pub fn from_env(env: &BTreeMap<String, String>) -> Result<Paths, PathsError> {
        let home = Self::var(env, "HOME");

        let config_dir: PathBuf = match Self::var(env, "XDG_CONFIG_HOME") {
            Ok(dir) => dir.into(),
            Err(_) => PathBuf::from(home.clone()?).join(".config"),
        };
        let data_dir: PathBuf = match Self::var(env, "XDG_DATA_HOME") {
            Ok(dir) => dir.into(),
            Err(_) => PathBuf::from(home?).join(".local").join("share"),
        };
        let runtime_dir: PathBuf = Self::var(env, "XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());

        Ok(Paths::new(
            config_dir.join(PROJECT_NAME),
            data_dir.join(PROJECT_NAME),
            runtime_dir.join(PROJECT_NAME),
        ))
    }

    #[cfg(target_os = "windows")]
    pub fn from_env(env: &BTreeMap<String, String>) -> Result<Paths, PathsError> {
        let app_data_dir: PathBuf = Self::var(env, "APPDATA").map(From::from)?;
        let local_app_data_dir: PathBuf = Self::var(env, "LOCALAPPDATA").map(From::from)?;
        Ok(Paths::new(
            app_data_dir.join(PROJECT_NAME),
            local_app_data_dir.join(PROJECT_NAME),
            std::env::temp_dir().join(PROJECT_NAME),
        ))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
    pub fn runtime_dir(&self) -> &Path {
        &self.runtime_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("strata.toml")
    }

    pub fn log_file(&self) -> PathBuf {
        self.data_dir.join("strata.log")
    }

    fn var(env: &BTreeMap<String, String>, var: &'static str) -> Result<String, PathsError> {
        env.get(var)
            .filter(|value| !value.is_empty())
            .cloned()
            .ok_or(PathsError::MissingVar(var))
    }
}
