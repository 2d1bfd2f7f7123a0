//! Companion configuration file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use sonarlint_bridge::config::BridgeSection;
use sonarlint_bridge::model::{BoundProject, Connection, Credentials, ProjectBinding, ProjectRef};
use sonarlint_bridge::BridgeConfig;
use tracing::warn;

/// Default config file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "sonarlint-companion.toml";

const DEFAULT_WORKSPACE_NAME: &str = "workspace";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct CompanionToml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bridge: Option<BridgeSection>,
    #[serde(default)]
    workspace: WorkspaceToml,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    connections: Vec<ConnectionToml>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    bindings: Vec<BindingToml>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkspaceToml {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    editor: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    projects: Vec<ProjectToml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProjectToml {
    name: String,
    path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConnectionToml {
    id: String,
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct BindingToml {
    connection: String,
    project_key: String,
    project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    server_path_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    local_path_prefix: Option<String>,
}

/// Validated companion settings, plus the document they came from so that
/// additions can be written back.
#[derive(Debug, Clone)]
pub struct Settings {
    path: PathBuf,
    raw: CompanionToml,
    pub bridge: BridgeConfig,
    pub workspace_name: String,
    pub editor: Option<String>,
    pub projects: Vec<ProjectRef>,
    pub connections: Vec<Connection>,
    pub bindings: Vec<BoundProject>,
}

impl Settings {
    /// Load `path`; a missing file yields an empty workspace.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!(
                path = %path.display(),
                "config file not found, starting with an empty workspace"
            );
            return Self::from_toml_str("", path);
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text, path)
    }

    pub fn from_toml_str(text: &str, path: &Path) -> anyhow::Result<Self> {
        let raw: CompanionToml = toml::from_str(text)
            .with_context(|| format!("invalid config {}", path.display()))?;
        Self::from_raw(raw, path.to_path_buf())
    }

    fn from_raw(raw: CompanionToml, path: PathBuf) -> anyhow::Result<Self> {
        let bridge = raw.bridge.clone().unwrap_or_default().into_config()?;
        let base = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let mut names: HashSet<String> = HashSet::new();
        let mut projects = Vec::with_capacity(raw.workspace.projects.len());
        for project in &raw.workspace.projects {
            if project.name.trim().is_empty() {
                bail!("workspace.projects: name must not be empty");
            }
            if !names.insert(project.name.clone()) {
                bail!("workspace.projects: duplicate project '{}'", project.name);
            }
            projects.push(ProjectRef::new(project.name.clone(), base.join(&project.path)));
        }

        let mut ids: HashSet<String> = HashSet::new();
        let mut connections = Vec::with_capacity(raw.connections.len());
        for connection in &raw.connections {
            if connection.id.trim().is_empty() {
                bail!("connections: id must not be empty");
            }
            if !ids.insert(connection.id.clone()) {
                bail!("connections: duplicate id '{}'", connection.id);
            }
            if !connection.url.starts_with("http://") && !connection.url.starts_with("https://") {
                bail!(
                    "connections.{}: url must start with http:// or https://",
                    connection.id
                );
            }
            if connection.token.is_some() && connection.token_env.is_some() {
                bail!(
                    "connections.{}: set either token or token_env, not both",
                    connection.id
                );
            }
            connections.push(
                Connection::new(connection.id.clone(), connection.url.clone())
                    .with_credentials(credentials(connection)),
            );
        }

        let mut bindings = Vec::with_capacity(raw.bindings.len());
        for binding in &raw.bindings {
            if !ids.contains(&binding.connection) {
                bail!(
                    "bindings: unknown connection '{}' for project key '{}'",
                    binding.connection,
                    binding.project_key
                );
            }
            let Some(project) = projects.iter().find(|project| project.name == binding.project)
            else {
                bail!(
                    "bindings: unknown project '{}' for project key '{}'",
                    binding.project,
                    binding.project_key
                );
            };
            bindings.push(BoundProject {
                project: project.clone(),
                binding: ProjectBinding {
                    server_path_prefix: binding.server_path_prefix.clone(),
                    local_path_prefix: binding.local_path_prefix.clone(),
                    ..ProjectBinding::new(binding.connection.clone(), binding.project_key.clone())
                },
            });
        }

        let workspace_name = raw
            .workspace
            .name
            .clone()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_WORKSPACE_NAME.to_string());
        let editor = raw
            .workspace
            .editor
            .clone()
            .filter(|editor| !editor.trim().is_empty());

        Ok(Self {
            path,
            raw,
            bridge,
            workspace_name,
            editor,
            projects,
            connections,
            bindings,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Add a connection whose token is read from `token_env` at startup.
    pub fn add_connection(
        &mut self,
        id: &str,
        url: &str,
        token_env: Option<&str>,
    ) -> anyhow::Result<Connection> {
        let mut raw = self.raw.clone();
        raw.connections.push(ConnectionToml {
            id: id.to_string(),
            url: url.trim_end_matches('/').to_string(),
            token: None,
            token_env: token_env.map(str::to_owned),
        });
        *self = Self::from_raw(raw, self.path.clone())?;
        self.connections
            .iter()
            .find(|connection| connection.id == id)
            .cloned()
            .with_context(|| format!("connection '{id}' missing after insert"))
    }

    /// Bind `project` to `project_key` through `connection_id`.
    pub fn add_binding(
        &mut self,
        connection_id: &str,
        project: &ProjectRef,
        project_key: &str,
    ) -> anyhow::Result<()> {
        if self.bindings.iter().any(|bound| {
            bound.project == *project
                && bound.binding.connection_id == connection_id
                && bound.binding.project_key == project_key
        }) {
            return Ok(());
        }
        let mut raw = self.raw.clone();
        raw.bindings.push(BindingToml {
            connection: connection_id.to_string(),
            project_key: project_key.to_string(),
            project: project.name.clone(),
            server_path_prefix: None,
            local_path_prefix: None,
        });
        *self = Self::from_raw(raw, self.path.clone())?;
        Ok(())
    }

    /// Write the current document back to its file.
    pub fn save(&self) -> anyhow::Result<()> {
        let text = toml::to_string_pretty(&self.raw).context("failed to render config")?;
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))
    }
}

fn credentials(connection: &ConnectionToml) -> Credentials {
    if let Some(token) = &connection.token {
        return Credentials::Token(token.clone());
    }
    let Some(var) = &connection.token_env else {
        return Credentials::None;
    };
    match std::env::var(var) {
        Ok(token) if !token.is_empty() => Credentials::Token(token),
        _ => {
            warn!(
                connection = %connection.id,
                var = %var,
                "token variable is not set, connecting anonymously"
            );
            Credentials::None
        }
    }
}
