//! Finding lookups against the analysis server's web API.

use std::time::Duration;

use serde::Deserialize;
use sonarlint_bridge::error::FetchError;
use sonarlint_bridge::marker::snippet;
use sonarlint_bridge::model::{Connection, Credentials, FetchedFinding, TextRange};
use sonarlint_bridge::services::FindingFetcher;
use tracing::debug;

const HOTSPOT_API: &str = "/api/hotspots/show";
const SOURCE_API: &str = "/api/sources/raw";
const USER_AGENT: &str = concat!("sonarlint-companion/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HotspotJson {
    key: String,
    message: String,
    component: ComponentJson,
    project: ProjectJson,
    #[serde(default)]
    rule: Option<RuleJson>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    text_range: Option<TextRangeJson>,
}

#[derive(Debug, Deserialize)]
struct ComponentJson {
    key: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct ProjectJson {
    key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleJson {
    key: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    vulnerability_probability: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextRangeJson {
    start_line: u32,
    start_offset: u32,
    end_line: u32,
    end_offset: u32,
}

/// Blocking HTTP client for the analysis server.
#[derive(Debug)]
pub struct ServerClient {
    agent: ureq::Agent,
}

impl ServerClient {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }

    fn get_text(
        &self,
        connection: &Connection,
        url: &str,
        subject: &str,
    ) -> Result<String, FetchError> {
        let mut request = self.agent.get(url).header("User-Agent", USER_AGENT);
        if let Credentials::Token(token) = &connection.credentials {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        let mut response = request
            .call()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        if let Some(err) = status_error(response.status().as_u16(), subject) {
            return Err(err);
        }
        response
            .body_mut()
            .read_to_string()
            .map_err(|err| FetchError::Transport(err.to_string()))
    }

    fn source_snippet(
        &self,
        connection: &Connection,
        component: &str,
        range: &TextRange,
    ) -> Option<String> {
        let url = format!(
            "{}{SOURCE_API}?key={}",
            connection.base_url(),
            urlencoding::encode(component)
        );
        match self.get_text(connection, &url, component) {
            Ok(source) => snippet(&source, range).map(str::to_owned),
            Err(err) => {
                debug!(connection = %connection.id, component, "cannot read server source: {err}");
                None
            }
        }
    }
}

impl FindingFetcher for ServerClient {
    fn fetch_finding(
        &self,
        connection: &Connection,
        finding_key: &str,
        project_key: &str,
    ) -> Result<FetchedFinding, FetchError> {
        let url = format!(
            "{}{HOTSPOT_API}?hotspot={}",
            connection.base_url(),
            urlencoding::encode(finding_key)
        );
        let body = self.get_text(connection, &url, finding_key)?;
        let (mut finding, component) = parse_hotspot(&body, connection, project_key)?;
        if let Some(range) = finding.text_range {
            finding.code_snippet = self.source_snippet(connection, &component, &range);
        }
        Ok(finding)
    }
}

fn status_error(status: u16, subject: &str) -> Option<FetchError> {
    match status {
        200..=299 => None,
        401 | 403 => Some(FetchError::Unauthorized),
        404 => Some(FetchError::NotFound(subject.to_string())),
        other => Some(FetchError::Transport(format!("HTTP {other}"))),
    }
}

/// Decode a hotspot document; returns the finding and its component key.
fn parse_hotspot(
    body: &str,
    connection: &Connection,
    project_key: &str,
) -> Result<(FetchedFinding, String), FetchError> {
    let raw: HotspotJson =
        serde_json::from_str(body).map_err(|err| FetchError::Decode(err.to_string()))?;
    if raw.project.key != project_key {
        return Err(FetchError::ProjectMismatch {
            expected: project_key.to_string(),
            actual: raw.project.key,
        });
    }
    let (rule_key, rule_name, vulnerability_probability) = match raw.rule {
        Some(rule) => (Some(rule.key), rule.name, rule.vulnerability_probability),
        None => (None, None, None),
    };
    let finding = FetchedFinding {
        origin: connection.clone(),
        key: raw.key,
        file_path: raw.component.path,
        message: raw.message,
        text_range: raw.text_range.map(|range| {
            TextRange::new(
                range.start_line,
                range.start_offset,
                range.end_line,
                range.end_offset,
            )
        }),
        code_snippet: None,
        rule_key,
        rule_name,
        status: raw.status,
        vulnerability_probability,
    };
    Ok((finding, raw.component.key))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOTSPOT: &str = r#"{
        "key": "AXhotspot1",
        "component": {"key": "org:app:src/Main.java", "path": "src/Main.java", "qualifier": "FIL"},
        "project": {"key": "org:app", "name": "App"},
        "rule": {
            "key": "java:S2068",
            "name": "Hard-coded credentials are security-sensitive",
            "securityCategory": "others",
            "vulnerabilityProbability": "HIGH"
        },
        "status": "TO_REVIEW",
        "line": 2,
        "message": "Make sure this password is not hard-coded.",
        "textRange": {"startLine": 2, "endLine": 2, "startOffset": 11, "endOffset": 19},
        "changelog": [],
        "comment": []
    }"#;

    fn connection() -> Connection {
        Connection::new("sq", "https://sonar.example.com")
    }

    #[test]
    fn parses_hotspot_document() {
        let (finding, component) =
            parse_hotspot(HOTSPOT, &connection(), "org:app").expect("parse hotspot");
        assert_eq!(component, "org:app:src/Main.java");
        assert_eq!(finding.key, "AXhotspot1");
        assert_eq!(finding.origin.id, "sq");
        assert_eq!(finding.file_path, "src/Main.java");
        assert_eq!(finding.text_range, Some(TextRange::new(2, 11, 2, 19)));
        assert_eq!(finding.line(), Some(2));
        assert_eq!(finding.rule_key.as_deref(), Some("java:S2068"));
        assert_eq!(finding.vulnerability_probability.as_deref(), Some("HIGH"));
        assert_eq!(finding.code_snippet, None);
    }

    #[test]
    fn rejects_hotspot_of_another_project() {
        let err = parse_hotspot(HOTSPOT, &connection(), "org:other").unwrap_err();
        assert_eq!(
            err,
            FetchError::ProjectMismatch {
                expected: "org:other".to_string(),
                actual: "org:app".to_string(),
            }
        );
    }

    #[test]
    fn malformed_body_is_a_decode_error() {
        let err = parse_hotspot("<html>", &connection(), "org:app").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn maps_http_status() {
        assert_eq!(status_error(200, "k"), None);
        assert_eq!(status_error(401, "k"), Some(FetchError::Unauthorized));
        assert_eq!(status_error(403, "k"), Some(FetchError::Unauthorized));
        assert_eq!(status_error(404, "k"), Some(FetchError::NotFound("k".to_string())));
        assert_eq!(
            status_error(502, "k"),
            Some(FetchError::Transport("HTTP 502".to_string()))
        );
    }
}
