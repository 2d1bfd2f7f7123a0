//! Finding resolution pipeline.
//!
//! Runs on a background task once the HTTP request has been acknowledged:
//! connections → fetch → local file → marker → editor and details panel. Every
//! step that touches prompts or presentation goes through the UI dispatcher.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dispatch::UiDispatcher;
use crate::error::ResolutionError;
use crate::marker::{verified_offsets, ActiveMarkerSlot};
use crate::model::{
    BoundProject, Connection, FetchedFinding, LocalFile, Marker, MarkerOffsets, Notification,
    ProjectBinding, ShowFindingRequest,
};
use crate::services::Services;
use crate::task::CancellationToken;

const FAILURE_TITLE: &str = "Unable to open finding";

/// Where a request ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    /// Finding as fetched from the first connection that answered.
    pub finding: FetchedFinding,
    /// Local file the finding was mapped to.
    pub file: LocalFile,
    /// `None` when marker creation failed; the details panel is shown anyway.
    pub marker: Option<Marker>,
}

/// Turns show-finding requests into on-screen markers.
pub struct FindingResolver {
    services: Services,
    ui: UiDispatcher,
    markers: Arc<ActiveMarkerSlot>,
}

impl std::fmt::Debug for FindingResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FindingResolver")
            .field("active_marker", &self.markers.current().map(|marker| marker.id))
            .finish_non_exhaustive()
    }
}

impl FindingResolver {
    /// Resolver with an empty marker slot.
    #[must_use]
    pub fn new(services: Services, ui: UiDispatcher) -> Self {
        Self {
            services,
            ui,
            markers: Arc::new(ActiveMarkerSlot::new()),
        }
    }

    /// The single-slot marker shared by every request.
    #[must_use]
    pub fn markers(&self) -> &Arc<ActiveMarkerSlot> {
        &self.markers
    }

    /// Background task body: resolve `request` and notify the user on failure.
    pub fn run(&self, request: &ShowFindingRequest, cancel: &CancellationToken) {
        match self.resolve(request, cancel) {
            Ok(presentation) => info!(
                finding = %presentation.finding.key,
                file = %presentation.file.path.display(),
                "finding presented"
            ),
            Err(err) if err.is_user_visible() => {
                warn!(finding = %request.finding_key, "unable to open finding: {err}");
                let presenter = self.services.presenter.clone();
                let notification = Notification {
                    title: FAILURE_TITLE.to_string(),
                    message: err.to_string(),
                };
                if let Err(dispatch) = self.ui.run_async(move || presenter.notify(notification)) {
                    warn!("could not show notification: {dispatch}");
                }
            }
            Err(err) => debug!(finding = %request.finding_key, "resolution stopped: {err}"),
        }
    }

    /// Every step after parameter validation.
    pub fn resolve(
        &self,
        request: &ShowFindingRequest,
        cancel: &CancellationToken,
    ) -> Result<Presentation, ResolutionError> {
        checkpoint(cancel)?;
        let connections = self.resolve_connections(&request.server_url)?;
        checkpoint(cancel)?;
        let finding = self.fetch_first(&connections, request)?;
        checkpoint(cancel)?;
        let file = self.resolve_file(&finding, &request.project_key)?;
        checkpoint(cancel)?;
        let marker = self.present(&finding, &file)?;
        Ok(Presentation {
            finding,
            file,
            marker,
        })
    }

    fn resolve_connections(&self, server_url: &str) -> Result<Vec<Connection>, ResolutionError> {
        let connections = self.services.connections.find_by_url(server_url);
        if !connections.is_empty() {
            return Ok(connections);
        }
        debug!(server_url, "no connection for server, asking the user");
        let presenter = self.services.presenter.clone();
        let prompts = self.services.prompts.clone();
        let url = server_url.to_string();
        let created = self.ui.run_blocking(move || {
            presenter.bring_to_front();
            prompts.create_connection(&url)
        })?;
        created
            .map(|connection| vec![connection])
            .ok_or_else(|| ResolutionError::NoConnection {
                url: server_url.to_string(),
            })
    }

    fn fetch_first(
        &self,
        connections: &[Connection],
        request: &ShowFindingRequest,
    ) -> Result<FetchedFinding, ResolutionError> {
        for connection in connections {
            match self.services.fetcher.fetch_finding(
                connection,
                &request.finding_key,
                &request.project_key,
            ) {
                Ok(finding) => return Ok(finding),
                Err(err) => warn!(
                    connection = %connection.id,
                    finding = %request.finding_key,
                    "fetch failed, trying next connection: {err}"
                ),
            }
        }
        Err(ResolutionError::FetchExhausted)
    }

    fn resolve_file(
        &self,
        finding: &FetchedFinding,
        project_key: &str,
    ) -> Result<LocalFile, ResolutionError> {
        let connection = &finding.origin;
        let bound = self
            .services
            .bindings
            .find_bound_projects(&connection.id, project_key);
        if let Some(file) = bound
            .iter()
            .find_map(|project| self.services.files.resolve_server_path(project, &finding.file_path))
        {
            return Ok(file);
        }
        debug!(
            project_key,
            bound = bound.len(),
            "no bound project contains the file, asking the user"
        );

        let presenter = self.services.presenter.clone();
        let prompts = self.services.prompts.clone();
        let prompt_connection = connection.clone();
        let key = project_key.to_string();
        let picked = self.ui.run_blocking(move || {
            presenter.bring_to_front();
            prompts.pick_project(&prompt_connection, &key)
        })?;
        let Some(project) = picked else {
            return Err(ResolutionError::BindingDeclined {
                project_key: project_key.to_string(),
            });
        };

        let job = self.services.bindings.create_binding(
            &connection.id,
            std::slice::from_ref(&project),
            project_key,
        );
        match job.wait() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                return Err(ResolutionError::BindingFailed {
                    project_key: project_key.to_string(),
                    reason,
                })
            }
            Err(err) => {
                return Err(ResolutionError::BindingFailed {
                    project_key: project_key.to_string(),
                    reason: format!("{err:?}"),
                })
            }
        }

        let bound = self
            .services
            .bindings
            .find_bound_projects(&connection.id, project_key)
            .into_iter()
            .find(|bound| bound.project == project)
            .unwrap_or_else(|| BoundProject {
                binding: ProjectBinding::new(connection.id.clone(), project_key),
                project,
            });
        self.services
            .files
            .resolve_server_path(&bound, &finding.file_path)
            .ok_or_else(|| ResolutionError::FileNotFound {
                path: finding.file_path.clone(),
                project_key: project_key.to_string(),
            })
    }

    fn present(
        &self,
        finding: &FetchedFinding,
        file: &LocalFile,
    ) -> Result<Option<Marker>, ResolutionError> {
        let offsets = self.local_offsets(finding, file);
        let presenter = self.services.presenter.clone();
        let markers = self.markers.clone();
        let finding = finding.clone();
        let file = file.clone();
        let marker = self.ui.run_blocking(move || {
            let marker = markers.replace(presenter.as_ref(), |presenter| {
                presenter.create_marker(&file, &finding.message, finding.line(), offsets)
            });
            if let Some(marker) = &marker {
                if let Err(err) = presenter.open_editor_at(marker) {
                    debug!(marker = marker.id.0, "failed to open editor: {err}");
                }
            }
            presenter.show_details(&finding, marker.as_ref());
            marker
        })?;
        Ok(marker)
    }

    fn local_offsets(&self, finding: &FetchedFinding, file: &LocalFile) -> Option<MarkerOffsets> {
        let range = finding.text_range?;
        let expected = finding.code_snippet.as_deref()?;
        let text = match self.services.files.read_contents(file) {
            Ok(text) => text,
            Err(err) => {
                debug!(file = %file.path.display(), "cannot read local file: {err}");
                return None;
            }
        };
        let offsets = verified_offsets(&text, &range, expected);
        if offsets.is_none() {
            debug!(
                file = %file.path.display(),
                "local code differs from the server snippet, marking the line only"
            );
        }
        offsets
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), ResolutionError> {
    if cancel.is_cancelled() {
        Err(ResolutionError::Cancelled)
    } else {
        Ok(())
    }
}
