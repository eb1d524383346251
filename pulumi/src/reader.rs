use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use strata_engine::{
    EngineError, HistoryEntry, ProjectInfo, PropertyMap, ResourceInfo, ResourceUrn, StackInfo,
    StackReader, WhoAmI, WorkspaceInfo,
};
use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::{PulumiCli, PulumiError, parse_json};

const PROJECT_FILES: [&str; 2] = ["Pulumi.yaml", "Pulumi.yml"];
const SKIP_DIRS: [&str; 5] = ["node_modules", "target", "venv", "__pycache__", "vendor"];
const MAX_SEARCH_DEPTH: usize = 5;

#[derive(Debug, Deserialize)]
struct StackExport {
    #[serde(default)]
    deployment: Deployment,
}

#[derive(Debug, Default, Deserialize)]
struct Deployment {
    #[serde(default)]
    resources: Vec<ExportedResource>,
}

#[derive(Debug, Deserialize)]
struct ExportedResource {
    urn: String,
    #[serde(default, rename = "type")]
    resource_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    protect: bool,
    #[serde(default)]
    inputs: Option<PropertyMap>,
    #[serde(default)]
    outputs: Option<PropertyMap>,
}

impl From<ExportedResource> for ResourceInfo {
    fn from(resource: ExportedResource) -> Self {
        ResourceInfo {
            urn: ResourceUrn::new(resource.urn),
            resource_type: resource.resource_type,
            id: resource.id.filter(|id| !id.is_empty()),
            parent: resource
                .parent
                .filter(|parent| !parent.is_empty())
                .map(ResourceUrn::new),
            protect: resource.protect,
            inputs: resource.inputs,
            outputs: resource.outputs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectFile {
    name: String,
    #[serde(default)]
    runtime: Option<Runtime>,
    #[serde(default)]
    description: Option<String>,
}

/// `runtime: nodejs` or `runtime: { name: nodejs, options: ... }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Runtime {
    Name(String),
    Detailed { name: String },
}

impl Runtime {
    fn into_name(self) -> String {
        match self {
            Runtime::Name(name) | Runtime::Detailed { name } => name,
        }
    }
}

fn parse_resources(text: &str) -> Result<Vec<ResourceInfo>, PulumiError> {
    let export: StackExport = parse_json("stack export", text)?;
    Ok(export
        .deployment
        .resources
        .into_iter()
        .map(ResourceInfo::from)
        .collect())
}

fn parse_project(path: &Path, text: &str) -> Result<ProjectInfo, PulumiError> {
    let project: ProjectFile = serde_saphyr::from_str(text).map_err(|error| PulumiError::Yaml {
        path: path.to_owned(),
        message: error.to_string(),
    })?;
    Ok(ProjectInfo {
        name: project.name,
        runtime: project.runtime.map(Runtime::into_name).unwrap_or_default(),
        description: project.description,
    })
}

fn project_file(dir: &Path) -> Option<PathBuf> {
    PROJECT_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// `Pulumi.<stack>.yaml` names a stack config file. The project file itself
/// does not count.
fn stack_file_name(file_name: &str) -> Option<&str> {
    let rest = file_name.strip_prefix("Pulumi.")?;
    let stack = rest
        .strip_suffix(".yaml")
        .or_else(|| rest.strip_suffix(".yml"))?;
    (!stack.is_empty()).then_some(stack)
}

fn skip_dir(name: &str) -> bool {
    name.starts_with('.') || SKIP_DIRS.contains(&name)
}

fn find_workspaces(root: &Path, workdir: &Path) -> Vec<WorkspaceInfo> {
    let mut found: Vec<WorkspaceInfo> = WalkDir::new(root)
        .max_depth(MAX_SEARCH_DEPTH)
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !skip_dir(&entry.file_name().to_string_lossy())
        })
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(error) => {
                debug!(%error, "skipping unreadable path");
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir() && project_file(entry.path()).is_some())
        .map(|entry| {
            let path = entry.into_path();
            let name = path
                .strip_prefix(root)
                .ok()
                .filter(|relative| !relative.as_os_str().is_empty())
                .unwrap_or(&path)
                .display()
                .to_string();
            WorkspaceInfo {
                current: path == workdir,
                name,
                path,
            }
        })
        .collect();

    if !found.iter().any(|workspace| workspace.current) && project_file(workdir).is_some() {
        found.push(WorkspaceInfo {
            path: workdir.to_owned(),
            name: workdir.display().to_string(),
            current: true,
        });
    }

    found.sort_by(|a, b| a.path.cmp(&b.path));
    found
}

#[async_trait]
impl StackReader for PulumiCli {
    #[instrument(skip(self))]
    async fn get_resources(
        &self,
        workdir: &Path,
        stack: &str,
    ) -> Result<Vec<ResourceInfo>, EngineError> {
        let stdout = self
            .command(workdir)
            .args(["stack", "export", "--stack", stack])
            .run_stdout()
            .await
            .map_err(|error| PulumiError::from(error).into_engine("stack export"))?;
        parse_resources(&stdout).map_err(|error| error.into_engine("stack export"))
    }

    #[instrument(skip(self))]
    async fn get_history(
        &self,
        workdir: &Path,
        stack: &str,
        page_size: usize,
        page: usize,
    ) -> Result<Vec<HistoryEntry>, EngineError> {
        let stdout = self
            .command(workdir)
            .args(["stack", "history", "--json", "--show-secrets=false"])
            .args(["--stack", stack])
            .args(["--page-size", &page_size.to_string()])
            .args(["--page", &page.to_string()])
            .run_stdout()
            .await
            .map_err(|error| PulumiError::from(error).into_engine("stack history"))?;
        parse_json("stack history", &stdout).map_err(|error| error.into_engine("stack history"))
    }

    #[instrument(skip(self))]
    async fn get_stacks(&self, workdir: &Path) -> Result<Vec<StackInfo>, EngineError> {
        let stdout = self
            .command(workdir)
            .args(["stack", "ls", "--json"])
            .run_stdout()
            .await
            .map_err(|error| PulumiError::from(error).into_engine("stack ls"))?;
        parse_json("stack ls", &stdout).map_err(|error| error.into_engine("stack ls"))
    }

    #[instrument(skip(self))]
    async fn get_whoami(&self, workdir: &Path) -> Result<WhoAmI, EngineError> {
        let stdout = self
            .command(workdir)
            .args(["whoami", "--json"])
            .run_stdout()
            .await
            .map_err(|error| PulumiError::from(error).into_engine("whoami"))?;
        parse_json("whoami", &stdout).map_err(|error| error.into_engine("whoami"))
    }

    async fn get_project_info(&self, workdir: &Path) -> Result<ProjectInfo, EngineError> {
        let path = project_file(workdir)
            .ok_or_else(|| PulumiError::NoProject(workdir.to_owned()).into_engine("project"))?;
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| EngineError::Io {
                path: path.display().to_string(),
                source,
            })?;
        parse_project(&path, &text).map_err(|error| error.into_engine("project"))
    }

    async fn list_stack_files(&self, workdir: &Path) -> Result<Vec<String>, EngineError> {
        let io_error = |source| EngineError::Io {
            path: workdir.display().to_string(),
            source,
        };
        let mut entries = tokio::fs::read_dir(workdir).await.map_err(io_error)?;
        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_error)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if stack_file_name(&name).is_some() {
                files.push(name);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn find_workspaces(
        &self,
        cwd: &Path,
        workdir: &Path,
    ) -> Result<Vec<WorkspaceInfo>, EngineError> {
        let (cwd, workdir) = (cwd.to_owned(), workdir.to_owned());
        tokio::task::spawn_blocking(move || find_workspaces(&cwd, &workdir))
            .await
            .map_err(|error| PulumiError::from(error).into_engine("workspace search"))
    }

    fn is_workspace(&self, path: &Path) -> bool {
        project_file(path).is_some()
    }
}
