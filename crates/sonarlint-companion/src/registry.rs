//! Connections and bindings backed by the config file.

use parking_lot::Mutex;
use sonarlint_bridge::model::{BoundProject, Connection, ProjectRef};
use sonarlint_bridge::services::{BindingService, ConnectionRegistry};
use sonarlint_bridge::task::TaskHandle;
use tracing::{info, warn};

use crate::settings::Settings;

const BIND_TASK: &str = "create-binding";

/// Shared view of [`Settings`]; additions are written back to disk.
#[derive(Debug)]
pub struct ConfigRegistry {
    settings: Mutex<Settings>,
}

impl ConfigRegistry {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }

    /// Workspace projects a binding can target.
    #[must_use]
    pub fn projects(&self) -> Vec<ProjectRef> {
        self.settings.lock().projects.clone()
    }

    /// Add and persist a connection.
    pub fn add_connection(
        &self,
        id: &str,
        url: &str,
        token_env: Option<&str>,
    ) -> anyhow::Result<Connection> {
        let mut settings = self.settings.lock();
        let mut updated = settings.clone();
        let connection = updated.add_connection(id, url, token_env)?;
        updated.save()?;
        *settings = updated;
        info!(connection = %connection.id, url = %connection.host, "connection saved");
        Ok(connection)
    }
}

impl ConnectionRegistry for ConfigRegistry {
    fn find_by_url(&self, url: &str) -> Vec<Connection> {
        self.settings
            .lock()
            .connections
            .iter()
            .filter(|connection| connection.matches_url(url))
            .cloned()
            .collect()
    }

    fn all(&self) -> Vec<Connection> {
        self.settings.lock().connections.clone()
    }
}

impl BindingService for ConfigRegistry {
    fn find_bound_projects(&self, connection_id: &str, project_key: &str) -> Vec<BoundProject> {
        self.settings
            .lock()
            .bindings
            .iter()
            .filter(|bound| {
                bound.binding.connection_id == connection_id
                    && bound.binding.project_key == project_key
            })
            .cloned()
            .collect()
    }

    fn create_binding(
        &self,
        connection_id: &str,
        projects: &[ProjectRef],
        project_key: &str,
    ) -> TaskHandle<Result<(), String>> {
        let mut settings = self.settings.lock();
        let mut updated = settings.clone();
        let outcome = projects
            .iter()
            .try_for_each(|project| updated.add_binding(connection_id, project, project_key))
            .and_then(|()| updated.save());
        let outcome = match outcome {
            Ok(()) => {
                *settings = updated;
                info!(connection = connection_id, project_key, "binding saved");
                Ok(())
            }
            Err(err) => {
                warn!(connection = connection_id, project_key, "binding failed: {err:#}");
                Err(format!("{err:#}"))
            }
        };
        TaskHandle::ready(BIND_TASK, outcome)
    }
}
