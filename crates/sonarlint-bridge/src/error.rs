//! Bridge errors.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

/// Errors raised while configuring or running the bridge itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// Configuration could not be read or failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(SmolStr),

    /// A worker or background thread could not be started.
    #[error("failed to spawn thread '{name}': {reason}")]
    Spawn { name: SmolStr, reason: SmolStr },
}

/// Failures of the UI dispatch bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The UI loop is gone, or the job was dropped before producing a result.
    #[error("UI thread unavailable")]
    Unavailable,

    /// The UI thread did not run the job within the allowed wait.
    #[error("timed out waiting for the UI thread")]
    TimedOut,

    /// A blocking dispatch was attempted from the UI thread itself.
    #[error("blocking dispatch from the UI thread")]
    Reentrant,
}

/// Reasons a show-finding request could not be brought on screen.
///
/// These never reach the HTTP caller; the response has already been sent by the
/// time resolution runs. They end up in a user notification instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("no connections found for URL {url}")]
    NoConnection { url: String },

    #[error("unable to fetch finding details using configured connections")]
    FetchExhausted,

    #[error("no local project was bound to '{project_key}'")]
    BindingDeclined { project_key: String },

    #[error("binding a local project to '{project_key}' failed: {reason}")]
    BindingFailed { project_key: String, reason: String },

    #[error("file '{path}' was not found in projects bound to '{project_key}'")]
    FileNotFound { path: String, project_key: String },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("request cancelled")]
    Cancelled,
}

impl ResolutionError {
    /// Whether the user should be told about this outcome.
    #[must_use]
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ResolutionError::Cancelled)
    }
}

/// Errors returned by a finding fetcher for one connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("finding '{0}' not found")]
    NotFound(String),

    #[error("not authorized")]
    Unauthorized,

    #[error("finding belongs to project '{actual}', expected '{expected}'")]
    ProjectMismatch { expected: String, actual: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),
}

/// Marker or editor failures. Always degrade to partial presentation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("presentation failed: {0}")]
pub struct PresentationError(pub String);

impl PresentationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}
