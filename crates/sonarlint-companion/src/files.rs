//! Server path to local file mapping.

use std::path::{Component, Path, PathBuf};

use sonarlint_bridge::model::{BoundProject, LocalFile, ProjectBinding};
use sonarlint_bridge::services::FileResolver;
use tracing::debug;

/// Resolves server paths against project roots on disk.
#[derive(Debug, Default)]
pub struct WorkspaceFiles;

impl FileResolver for WorkspaceFiles {
    fn resolve_server_path(&self, bound: &BoundProject, server_path: &str) -> Option<LocalFile> {
        let relative = relative_path(&bound.binding, server_path)?;
        let path = bound.project.root.join(relative);
        if !path.is_file() {
            debug!(
                project = %bound.project.name,
                path = %path.display(),
                "server path has no local file"
            );
            return None;
        }
        Some(LocalFile {
            project: bound.project.clone(),
            path,
        })
    }
}

/// Project-relative path for `server_path`, with the binding's prefixes applied.
///
/// Only plain relative paths come out: absolute paths and `..` are refused.
#[must_use]
pub fn relative_path(binding: &ProjectBinding, server_path: &str) -> Option<PathBuf> {
    let mut rest = server_path;
    if let Some(prefix) = non_empty(binding.server_path_prefix.as_deref()) {
        rest = rest.strip_prefix(prefix)?.strip_prefix('/')?;
    }
    let mut relative = PathBuf::new();
    if let Some(local) = non_empty(binding.local_path_prefix.as_deref()) {
        relative.push(local);
    }
    relative.push(rest);
    is_plain_relative(&relative).then_some(relative)
}

fn non_empty(prefix: Option<&str>) -> Option<&str> {
    prefix
        .map(|prefix| prefix.trim_matches('/'))
        .filter(|prefix| !prefix.is_empty())
}

fn is_plain_relative(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
