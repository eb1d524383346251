//! Credential plugins: external commands that print environment variables.
//!
//! A plugin is run once per workspace and stack. Whatever it prints is cached
//! and merged into the environment of every engine invocation for that
//! context.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use serde::Deserialize;
use strata_cmd::{Command, CommandError};
use strata_engine::{AuthenticateResult, EngineError, PluginProvider};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PluginError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error("invalid output line {line}: expected KEY=VALUE")]
    Line { line: usize },

    #[error("invalid JSON output: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Stack name prefixes this plugin applies to. Empty means every stack.
    #[serde(default)]
    pub stacks: Vec<String>,
    /// Extra environment for the plugin process itself.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl PluginConfig {
    fn applies_to(&self, stack: Option<&str>) -> bool {
        if self.stacks.is_empty() {
            return true;
        }
        stack.is_some_and(|stack| self.stacks.iter().any(|prefix| stack.starts_with(prefix)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ContextKey {
    workdir: PathBuf,
    stack: Option<String>,
}

impl ContextKey {
    fn new(workdir: &Path, stack: Option<&str>) -> Self {
        Self {
            workdir: workdir.to_owned(),
            stack: stack.map(str::to_owned),
        }
    }
}

type Env = BTreeMap<String, String>;

#[derive(Debug, Default)]
struct Cache {
    active: Option<ContextKey>,
    entries: BTreeMap<(String, ContextKey), Env>,
}

/// Runs the configured plugin commands and caches what they print.
#[derive(Debug, Default)]
pub struct CommandPlugins {
    plugins: Vec<PluginConfig>,
    cache: Mutex<Cache>,
}

impl CommandPlugins {
    pub fn new(plugins: Vec<PluginConfig>) -> Self {
        Self {
            plugins,
            cache: Mutex::new(Cache::default()),
        }
    }

    pub fn plugins(&self) -> &[PluginConfig] {
        &self.plugins
    }

    fn with_cache<T>(&self, f: impl FnOnce(&mut Cache) -> T) -> T {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut cache)
    }

    async fn authenticate(
        plugin: &PluginConfig,
        workdir: &Path,
        program_name: &str,
        stack_name: Option<&str>,
    ) -> Result<Env, PluginError> {
        let stdout = Command::new(&plugin.command)
            .args(&plugin.args)
            .current_dir(workdir)
            .envs(&plugin.env)
            .env("STRATA_WORKDIR", workdir)
            .env("STRATA_PROJECT", program_name)
            .env("STRATA_STACK", stack_name.unwrap_or_default())
            .run_stdout()
            .await?;
        parse_env(&stdout)
    }
}

#[async_trait]
impl PluginProvider for CommandPlugins {
    async fn initialize(
        &self,
        workdir: &Path,
        program_name: &str,
        stack_name: Option<&str>,
    ) -> Result<Vec<AuthenticateResult>, EngineError> {
        let context = ContextKey::new(workdir, stack_name);
        self.with_cache(|cache| cache.active = Some(context.clone()));

        let mut results = Vec::new();
        for plugin in &self.plugins {
            if !plugin.applies_to(stack_name) {
                debug!(plugin = %plugin.name, ?stack_name, "plugin does not apply to stack");
                continue;
            }

            let key = (plugin.name.clone(), context.clone());
            let cached = self.with_cache(|cache| cache.entries.get(&key).cloned());
            if let Some(env) = cached {
                results.push(AuthenticateResult {
                    plugin: plugin.name.clone(),
                    cached: true,
                    env_keys: env.into_keys().collect(),
                    error: None,
                });
                continue;
            }

            match Self::authenticate(plugin, workdir, program_name, stack_name).await {
                Ok(env) => {
                    info!(plugin = %plugin.name, keys = env.len(), "plugin authenticated");
                    let env_keys = env.keys().cloned().collect();
                    self.with_cache(|cache| cache.entries.insert(key, env));
                    results.push(AuthenticateResult {
                        plugin: plugin.name.clone(),
                        cached: false,
                        env_keys,
                        error: None,
                    });
                }
                Err(error) => {
                    let message = match &error {
                        PluginError::Command(error) => error.summary(),
                        other => other.to_string(),
                    };
                    warn!(plugin = %plugin.name, error = %message, "plugin failed");
                    results.push(AuthenticateResult {
                        plugin: plugin.name.clone(),
                        cached: false,
                        env_keys: Vec::new(),
                        error: Some(message),
                    });
                }
            }
        }
        Ok(results)
    }

    fn get_all_env(&self) -> BTreeMap<String, String> {
        self.with_cache(|cache| {
            let mut env = BTreeMap::new();
            let Some(active) = &cache.active else {
                return env;
            };
            for plugin in &self.plugins {
                if let Some(values) = cache.entries.get(&(plugin.name.clone(), active.clone())) {
                    env.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
            }
            env
        })
    }

    fn invalidate_all_credentials(&self) {
        info!("invalidating all plugin credentials");
        self.with_cache(|cache| cache.entries.clear());
    }

    fn invalidate_credentials_for_context(
        &self,
        workdir: &Path,
        stack_name: Option<&str>,
        program_name: &str,
    ) {
        let context = ContextKey::new(workdir, stack_name);
        info!(workdir = %workdir.display(), ?stack_name, program_name, "invalidating plugin credentials");
        self.with_cache(|cache| cache.entries.retain(|(_, key), _| *key != context));
    }
}

/// Parse plugin output: a JSON object, or `KEY=VALUE` lines.
///
/// Blank lines and `#` comments are skipped, a leading `export ` is allowed,
/// and matching surrounding quotes are removed from values.
pub fn parse_env(text: &str) -> Result<BTreeMap<String, String>, PluginError> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        let values: BTreeMap<String, serde_json::Value> = serde_json::from_str(trimmed)?;
        return Ok(values
            .into_iter()
            .map(|(key, value)| match value {
                serde_json::Value::String(value) => (key, value),
                other => (key, other.to_string()),
            })
            .collect());
    }

    let mut env = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            return Err(PluginError::Line { line: index + 1 });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(PluginError::Line { line: index + 1 });
        }
        env.insert(key.to_owned(), unquote(value.trim()).to_owned());
    }
    Ok(env)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}
