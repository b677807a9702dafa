//! Host tool discovery and execution

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{HostToolsConfig, HostToolsMode};
use crate::error::{GatewayError, GatewayResult};
use crate::host::{run_with_timeout, ProcessOutput};
use crate::platform_dirs;
use crate::tools::header::{read_header, ScriptKind};
use crate::tools::name::validate_name;
use crate::tools::project::{absolute_workspace, project_id, COMMON_DIR};

/// Kind of directory a tool was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    /// Workspace staging directory, only consulted in dev mode
    Staging,
    /// Approved directory of the current project
    Project,
    /// Approved directory shared by all projects
    Common,
    /// Configured directory read without approval
    Legacy,
}

/// A discovered tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,
    pub extension: String,
    pub path: PathBuf,
    pub source: ToolSource,
}

/// One entry of the directory priority chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDirectory {
    pub path: PathBuf,
    pub source: ToolSource,
}

/// Root of the approved store: configured, or the platform data directory
pub fn approved_root(config: &HostToolsConfig) -> GatewayResult<PathBuf> {
    match &config.approved_dir {
        Some(dir) => Ok(dir.clone()),
        None => platform_dirs::approved_tools_dir()
            .map_err(|e| GatewayError::invalid_config(e.to_string())),
    }
}

/// Read-only view over the tool directories of one workspace
#[derive(Debug, Clone)]
pub struct HostToolRegistry {
    config: HostToolsConfig,
    workspace: PathBuf,
    directories: Vec<ToolDirectory>,
}

impl HostToolRegistry {
    /// Create a registry, resolving the directory chain for `workspace`
    pub fn new(config: HostToolsConfig, workspace: &Path) -> GatewayResult<Self> {
        let workspace = absolute_workspace(workspace)?;
        let directories = resolve_directories(&config, &workspace)?;

        if config.enabled {
            info!(
                mode = ?config.mode,
                directories = directories.len(),
                workspace = %workspace.display(),
                "Host tools enabled"
            );
        }

        Ok(Self {
            config,
            workspace,
            directories,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn mode(&self) -> HostToolsMode {
        self.config.mode
    }

    /// Directories in priority order
    pub fn directories(&self) -> &[ToolDirectory] {
        &self.directories
    }

    /// Every tool, one per name; the first directory in the chain wins.
    ///
    /// Files with a malformed header are skipped with a warning.
    pub fn list_tools(&self) -> GatewayResult<Vec<ToolInfo>> {
        self.ensure_enabled()?;

        let mut seen = HashSet::new();
        let mut tools = Vec::new();

        for directory in &self.directories {
            let entries = match fs::read_dir(&directory.path) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!(dir = %directory.path.display(), error = %e, "Skipping tool directory");
                    continue;
                }
            };

            let mut names: Vec<String> = entries
                .filter_map(Result::ok)
                .filter(|entry| entry.path().is_file())
                .filter_map(|entry| entry.file_name().into_string().ok())
                .filter(|name| !name.starts_with('.'))
                .collect();
            names.sort();

            for name in names {
                if validate_name(&name).is_err() || !self.extension_allowed(&name) {
                    continue;
                }
                if !seen.insert(name.clone()) {
                    debug!(tool = %name, dir = %directory.path.display(), "Shadowed by higher priority tool");
                    continue;
                }

                match load_tool(&name, directory) {
                    Ok(tool) => tools.push(tool),
                    Err(e) => warn!(tool = %name, error = %e, "Skipping tool with invalid header"),
                }
            }
        }

        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tools)
    }

    /// Resolve a single tool by file name, following the priority chain
    pub fn get_tool(&self, name: &str) -> GatewayResult<ToolInfo> {
        self.ensure_enabled()?;
        validate_name(name)?;

        if !self.extension_allowed(name) {
            return Err(GatewayError::denied(format!(
                "tool '{}' does not have an allowed extension",
                name
            )));
        }

        for directory in &self.directories {
            if directory.path.join(name).is_file() {
                return load_tool(name, directory);
            }
        }
        Err(GatewayError::not_found("Tool", name))
    }

    /// Run a tool with `args`, in the workspace, bounded by the configured timeout
    pub async fn run_tool(&self, name: &str, args: &[String]) -> GatewayResult<ProcessOutput> {
        let tool = self.get_tool(name)?;
        let kind = ScriptKind::from_extension(&tool.extension).ok_or_else(|| {
            GatewayError::InvalidInput(format!("no interpreter for '.{}' tools", tool.extension))
        })?;

        let (program, leading) = kind.interpreter();
        let mut cmd = Command::new(program);
        cmd.args(leading);
        cmd.arg(&tool.path);
        cmd.args(args);
        cmd.current_dir(&self.workspace);

        info!(tool = %name, source = ?tool.source, ?args, "Running host tool");
        run_with_timeout(cmd, name, Duration::from_secs(self.config.timeout_secs)).await
    }

    fn ensure_enabled(&self) -> GatewayResult<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(GatewayError::denied("host tools are disabled"))
        }
    }

    fn extension_allowed(&self, name: &str) -> bool {
        extension_of(name).is_some_and(|ext| self.config.allowed_extensions.iter().any(|a| a == ext))
    }
}

fn resolve_directories(
    config: &HostToolsConfig,
    workspace: &Path,
) -> GatewayResult<Vec<ToolDirectory>> {
    if !config.enabled {
        return Ok(Vec::new());
    }

    match config.mode {
        HostToolsMode::Legacy => Ok(configured(config, workspace, ToolSource::Legacy).collect()),
        HostToolsMode::Secure => {
            let root = approved_root(config)?;
            let mut directories = Vec::new();
            if config.dev_mode {
                directories.extend(configured(config, workspace, ToolSource::Staging));
            }
            directories.push(ToolDirectory {
                path: root.join(project_id(workspace)?),
                source: ToolSource::Project,
            });
            if config.common {
                directories.push(ToolDirectory {
                    path: root.join(COMMON_DIR),
                    source: ToolSource::Common,
                });
            }
            Ok(directories)
        }
    }
}

/// Configured directories, relative ones resolved against the workspace
fn configured<'a>(
    config: &'a HostToolsConfig,
    workspace: &'a Path,
    source: ToolSource,
) -> impl Iterator<Item = ToolDirectory> + 'a {
    config.directories.iter().map(move |dir| ToolDirectory {
        path: workspace.join(dir),
        source,
    })
}

fn load_tool(name: &str, directory: &ToolDirectory) -> GatewayResult<ToolInfo> {
    let path = directory.path.join(name);
    let header = read_header(&path)?;
    Ok(ToolInfo {
        name: name.to_string(),
        description: header.description,
        usage: header.usage,
        examples: header.examples,
        extension: extension_of(name).unwrap_or_default().to_string(),
        path,
        source: directory.source,
    })
}

fn extension_of(name: &str) -> Option<&str> {
    Path::new(name).extension().and_then(|ext| ext.to_str())
}
