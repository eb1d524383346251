use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{PropertyMap, ResourceUrn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackInfo {
    pub name: String,
    #[serde(default)]
    pub current: bool,
    #[serde(default)]
    pub update_in_progress: bool,
    #[serde(default)]
    pub last_update: Option<String>,
    #[serde(default)]
    pub resource_count: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl StackInfo {
    pub fn new(name: impl Into<String>, current: bool) -> Self {
        Self {
            name: name.into(),
            current,
            ..Default::default()
        }
    }
}

/// A directory holding a program definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub path: PathBuf,
    pub name: String,
    pub current: bool,
}

/// One past update of a stack. `version` is zero when the backend omits it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub resource_changes: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectInfo {
    pub name: String,
    pub runtime: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoAmI {
    pub user: String,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A resource as recorded in the stack's current state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceInfo {
    pub urn: ResourceUrn,
    pub resource_type: String,
    pub id: Option<String>,
    pub parent: Option<ResourceUrn>,
    pub protect: bool,
    pub inputs: Option<PropertyMap>,
    pub outputs: Option<PropertyMap>,
}

/// Outcome of a single request/response state command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    pub error: Option<String>,
    pub output: String,
}

impl CommandResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            output: output.into(),
        }
    }

    pub fn failed(error: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            output: output.into(),
        }
    }
}
