use std::path::{Path, PathBuf};

use serde::Deserialize;
use strata_ctx::Paths;
use strata_plugins::PluginConfig;
use thiserror::Error;
use tokio::fs::{read_to_string, try_exists};
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config file {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Engine binary, looked up on `PATH` unless absolute.
    pub pulumi: PathBuf,
    pub history_page_size: usize,
    pub cancel_timeout_secs: u64,
    pub plugins: Vec<PluginConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pulumi: PathBuf::from("pulumi"),
            history_page_size: 20,
            cancel_timeout_secs: 60,
            plugins: Vec::new(),
        }
    }
}

impl Config {
    /// An explicit path must exist. The default one may not.
    pub async fn locate(explicit: Option<&Path>, paths: &Paths) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path).await;
        }
        let path = paths.config_file();
        if try_exists(&path).await.unwrap_or(false) {
            return Self::load(&path).await;
        }
        debug!(path = %path.display(), "no config file, using defaults");
        Ok(Self::default())
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })?;
        config.validate(path)?;
        debug!(path = %path.display(), plugins = config.plugins.len(), "config loaded");
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::Invalid {
            path: path.to_owned(),
            message,
        };
        if self.history_page_size == 0 {
            return Err(invalid("history_page_size must be at least 1".to_string()));
        }
        for (index, plugin) in self.plugins.iter().enumerate() {
            if plugin.name.is_empty() || plugin.command.is_empty() {
                return Err(invalid(format!("plugin {index} needs a name and a command")));
            }
        }
        Ok(())
    }
}
