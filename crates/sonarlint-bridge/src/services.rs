//! Collaborator interfaces consumed by the bridge.
//!
//! The bridge owns none of the IDE state it works with. Connections, bindings,
//! files, dialogs and editors all live behind these traits and are injected
//! through [`Services`] when the bridge is built.

use std::io;
use std::sync::Arc;

use crate::error::{FetchError, PresentationError};
use crate::model::{
    BoundProject, Connection, FetchedFinding, LocalFile, Marker, MarkerOffsets, Notification,
    ProjectRef,
};
use crate::task::TaskHandle;

/// Configured server connections.
pub trait ConnectionRegistry: Send + Sync {
    /// Connections whose host matches `url`, in a stable order.
    fn find_by_url(&self, url: &str) -> Vec<Connection>;

    /// Every configured connection.
    fn all(&self) -> Vec<Connection>;
}

/// Remote lookup of finding details.
pub trait FindingFetcher: Send + Sync {
    /// Details of `finding_key` as reported by `connection`'s server.
    fn fetch_finding(
        &self,
        connection: &Connection,
        finding_key: &str,
        project_key: &str,
    ) -> Result<FetchedFinding, FetchError>;
}

/// Project bindings between server projects and local projects.
pub trait BindingService: Send + Sync {
    /// Local projects bound to `project_key` through `connection_id`.
    fn find_bound_projects(&self, connection_id: &str, project_key: &str) -> Vec<BoundProject>;

    /// Bind `projects` to `project_key`. The returned handle completes once the
    /// binding is in place.
    fn create_binding(
        &self,
        connection_id: &str,
        projects: &[ProjectRef],
        project_key: &str,
    ) -> TaskHandle<Result<(), String>>;
}

/// Mapping between server paths and local files.
pub trait FileResolver: Send + Sync {
    /// Local file of `bound` that corresponds to the server-relative `server_path`.
    fn resolve_server_path(&self, bound: &BoundProject, server_path: &str) -> Option<LocalFile>;

    /// Current text of a local file.
    fn read_contents(&self, file: &LocalFile) -> io::Result<String> {
        std::fs::read_to_string(&file.path)
    }
}

/// Interactive prompts. Always called on the UI thread.
pub trait Prompts: Send + Sync {
    /// Offer to create a connection to `server_url`.
    fn create_connection(&self, server_url: &str) -> Option<Connection>;

    /// Ask which local project should be bound to `project_key`.
    fn pick_project(&self, connection: &Connection, project_key: &str) -> Option<ProjectRef>;
}

/// Editors, markers and notifications. Always called on the UI thread.
pub trait Presenter: Send + Sync {
    /// Raise the IDE window above the browser.
    fn bring_to_front(&self);

    /// Place a marker on `file`, spanning `offsets` when they are known.
    fn create_marker(
        &self,
        file: &LocalFile,
        message: &str,
        line: Option<u32>,
        offsets: Option<MarkerOffsets>,
    ) -> Result<Marker, PresentationError>;

    /// Remove a marker created earlier.
    fn delete_marker(&self, marker: &Marker) -> Result<(), PresentationError>;

    /// Open an editor positioned on `marker`.
    fn open_editor_at(&self, marker: &Marker) -> Result<(), PresentationError>;

    /// Show the finding details panel.
    fn show_details(&self, finding: &FetchedFinding, marker: Option<&Marker>);

    /// Non-modal notification.
    fn notify(&self, notification: Notification);
}

/// Identity of the running workspace.
pub trait WorkspaceIdentity: Send + Sync {
    /// Opaque token disclosed to trusted origins.
    fn workspace_token(&self) -> String;
}

/// Every collaborator the bridge needs, injected at construction.
#[derive(Clone)]
pub struct Services {
    /// Server connections.
    pub connections: Arc<dyn ConnectionRegistry>,
    /// Remote finding lookup.
    pub fetcher: Arc<dyn FindingFetcher>,
    /// Project bindings.
    pub bindings: Arc<dyn BindingService>,
    /// Server path to local file mapping.
    pub files: Arc<dyn FileResolver>,
    /// Dialogs.
    pub prompts: Arc<dyn Prompts>,
    /// Editors, markers and notifications.
    pub presenter: Arc<dyn Presenter>,
    /// Workspace token for the status endpoint.
    pub workspace: Arc<dyn WorkspaceIdentity>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}
