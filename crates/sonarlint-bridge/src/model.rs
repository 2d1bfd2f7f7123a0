//! Requests, connections, findings and bindings.

#![allow(missing_docs)]

use std::fmt;
use std::path::PathBuf;

use crate::web::query_param;

/// Query parameter carrying the server project key.
pub const PARAM_PROJECT: &str = "project";
/// Query parameter carrying the finding (hotspot) key.
pub const PARAM_FINDING: &str = "hotspot";
/// Query parameter carrying the server base URL.
pub const PARAM_SERVER: &str = "server";

/// "Open this finding" request handed over by the web UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShowFindingRequest {
    pub project_key: String,
    pub finding_key: String,
    pub server_url: String,
}

/// A required query parameter was absent or empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MissingParameter(pub &'static str);

impl fmt::Display for MissingParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Missing parameter: {}", self.0)
    }
}

impl std::error::Error for MissingParameter {}

impl ShowFindingRequest {
    /// Build a request from a raw query string, checking `project`, `hotspot` and
    /// `server` in that order.
    pub fn from_query(query: &str) -> Result<Self, MissingParameter> {
        let required = |name: &'static str| {
            query_param(query, name)
                .filter(|value| !value.is_empty())
                .ok_or(MissingParameter(name))
        };
        let project_key = required(PARAM_PROJECT)?;
        let finding_key = required(PARAM_FINDING)?;
        let server_url = required(PARAM_SERVER)?;
        Ok(Self {
            project_key,
            finding_key,
            server_url,
        })
    }
}

/// Credentials attached to a connection. Never printed.
#[derive(Clone, Default, PartialEq, Eq)]
pub enum Credentials {
    #[default]
    None,
    /// Bearer token.
    Token(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::None => f.write_str("None"),
            Credentials::Token(_) => f.write_str("Token(***)"),
        }
    }
}

/// A configured analysis server connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: String,
    pub host: String,
    pub credentials: Credentials,
}

impl Connection {
    pub fn new(id: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            credentials: Credentials::None,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Host without trailing slashes, used to build API URLs.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.host.trim_end_matches('/')
    }

    /// Whether this connection points at the server `url`.
    #[must_use]
    pub fn matches_url(&self, url: &str) -> bool {
        self.base_url()
            .eq_ignore_ascii_case(url.trim_end_matches('/'))
    }
}

/// Range of a finding in its file. Lines are 1-based, line offsets are 0-based
/// character columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    pub start_line: u32,
    pub start_line_offset: u32,
    pub end_line: u32,
    pub end_line_offset: u32,
}

impl TextRange {
    #[must_use]
    pub fn new(start_line: u32, start_line_offset: u32, end_line: u32, end_line_offset: u32) -> Self {
        Self {
            start_line,
            start_line_offset,
            end_line,
            end_line_offset,
        }
    }
}

/// Finding details as fetched from one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFinding {
    pub origin: Connection,
    pub key: String,
    /// Server-relative path of the file, as reported by the server.
    pub file_path: String,
    pub message: String,
    pub text_range: Option<TextRange>,
    /// Server-side source at `text_range`, when it could be read.
    pub code_snippet: Option<String>,
    pub rule_key: Option<String>,
    pub rule_name: Option<String>,
    pub status: Option<String>,
    pub vulnerability_probability: Option<String>,
}

impl FetchedFinding {
    /// Line the marker is anchored to.
    #[must_use]
    pub fn line(&self) -> Option<u32> {
        self.text_range.map(|range| range.start_line)
    }
}

/// A local project in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectRef {
    pub name: String,
    pub root: PathBuf,
}

impl ProjectRef {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
        }
    }
}

/// Association between a server project and local projects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectBinding {
    pub connection_id: String,
    pub project_key: String,
    /// Leading server path segment that has no local counterpart.
    pub server_path_prefix: Option<String>,
    /// Local directory, relative to the project root, that mirrors the server root.
    pub local_path_prefix: Option<String>,
}

impl ProjectBinding {
    pub fn new(connection_id: impl Into<String>, project_key: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            project_key: project_key.into(),
            server_path_prefix: None,
            local_path_prefix: None,
        }
    }
}

/// A local project together with the binding that ties it to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundProject {
    pub project: ProjectRef,
    pub binding: ProjectBinding,
}

/// A file of a local project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub project: ProjectRef,
    pub path: PathBuf,
}

/// Identifier handed out by the presenter for a created marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u64);

/// Character offsets from the start of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerOffsets {
    pub start: usize,
    pub end: usize,
}

/// A marker as created by the presenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub id: MarkerId,
    pub file: LocalFile,
    pub message: String,
    pub line: Option<u32>,
    pub offsets: Option<MarkerOffsets>,
}

/// Dismissable, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
}
