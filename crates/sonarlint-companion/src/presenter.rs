//! Terminal presentation of findings.
//!
//! Markers are kept in memory; "opening an editor" runs the configured editor
//! command, or just prints the location when none is set.

use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use sonarlint_bridge::error::PresentationError;
use sonarlint_bridge::model::{
    FetchedFinding, LocalFile, Marker, MarkerId, MarkerOffsets, Notification,
};
use sonarlint_bridge::services::{Presenter, WorkspaceIdentity};
use tracing::{debug, warn};

use crate::style;

/// Prints findings to stdout and drives an external editor.
#[derive(Debug)]
pub struct TerminalPresenter {
    workspace: String,
    editor: Option<String>,
    next_id: AtomicU64,
    markers: Mutex<Vec<Marker>>,
}

impl TerminalPresenter {
    #[must_use]
    pub fn new(workspace: impl Into<String>, editor: Option<String>) -> Self {
        Self {
            workspace: workspace.into(),
            editor,
            next_id: AtomicU64::new(1),
            markers: Mutex::new(Vec::new()),
        }
    }
}

impl Presenter for TerminalPresenter {
    fn bring_to_front(&self) {
        // BEL
        print!("\x07");
        println!();
    }

    fn create_marker(
        &self,
        file: &LocalFile,
        message: &str,
        line: Option<u32>,
        offsets: Option<MarkerOffsets>,
    ) -> Result<Marker, PresentationError> {
        if !file.path.is_file() {
            return Err(PresentationError::new(format!(
                "{} is not a file",
                file.path.display()
            )));
        }
        let marker = Marker {
            id: MarkerId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            file: file.clone(),
            message: message.to_string(),
            line,
            offsets,
        };
        self.markers.lock().push(marker.clone());
        debug!(marker = marker.id.0, file = %file.path.display(), "marker created");
        Ok(marker)
    }

    fn delete_marker(&self, marker: &Marker) -> Result<(), PresentationError> {
        let mut markers = self.markers.lock();
        let before = markers.len();
        markers.retain(|existing| existing.id != marker.id);
        if markers.len() == before {
            return Err(PresentationError::new(format!(
                "marker {} does not exist",
                marker.id.0
            )));
        }
        Ok(())
    }

    fn open_editor_at(&self, marker: &Marker) -> Result<(), PresentationError> {
        let line = marker.line.unwrap_or(1);
        let column = marker_column(marker);
        let location = format!("{}:{line}:{column}", marker.file.path.display());
        let Some(template) = &self.editor else {
            println!("{} {}", style::dim("at"), style::accent(location));
            return Ok(());
        };
        let argv = editor_command(template, &marker.file.path, line, column);
        let Some((program, args)) = argv.split_first() else {
            return Err(PresentationError::new("editor command is empty"));
        };
        let mut child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|err| PresentationError::new(format!("failed to run {program}: {err}")))?;
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        println!("{} {}", style::dim("opened"), style::accent(location));
        Ok(())
    }

    fn show_details(&self, finding: &FetchedFinding, marker: Option<&Marker>) {
        let rule = match (&finding.rule_key, &finding.rule_name) {
            (Some(key), Some(name)) => format!("{name} ({key})"),
            (Some(key), None) => key.clone(),
            (None, Some(name)) => name.clone(),
            (None, None) => "unknown rule".to_string(),
        };
        println!("{}", style::accent(format!("Security hotspot {}", finding.key)));
        println!("  {} {}", style::dim("rule:    "), rule);
        if let Some(level) = &finding.vulnerability_probability {
            println!("  {} {}", style::dim("risk:    "), style::probability(level));
        }
        if let Some(status) = &finding.status {
            println!("  {} {status}", style::dim("status:  "));
        }
        println!("  {} {}", style::dim("server:  "), finding.origin.base_url());
        let location = match finding.line() {
            Some(line) => format!("{}:{line}", finding.file_path),
            None => finding.file_path.clone(),
        };
        println!("  {} {location}", style::dim("file:    "));
        println!("  {} {}", style::dim("message: "), finding.message);
        if let Some(snippet) = &finding.code_snippet {
            for line in snippet.lines() {
                println!("  {} {line}", style::dim("|"));
            }
        }
        if marker.is_none() {
            println!("  {}", style::warning("no marker could be placed for this finding"));
        }
    }

    fn notify(&self, notification: Notification) {
        warn!(title = %notification.title, "{}", notification.message);
        println!(
            "{} {}",
            style::warning(format!("{}:", notification.title)),
            notification.message
        );
    }
}

impl WorkspaceIdentity for TerminalPresenter {
    fn workspace_token(&self) -> String {
        self.workspace.clone()
    }
}

/// Editor argv with `{file}`, `{line}` and `{column}` filled in.
fn editor_command(template: &str, file: &Path, line: u32, column: u32) -> Vec<String> {
    let file = file.display().to_string();
    template
        .split_whitespace()
        .map(|part| {
            part.replace("{file}", &file)
                .replace("{line}", &line.to_string())
                .replace("{column}", &column.to_string())
        })
        .collect()
}

/// 1-based column of the marker start, 1 when only the line is known.
fn marker_column(marker: &Marker) -> u32 {
    let Some(offsets) = marker.offsets else {
        return 1;
    };
    let Ok(text) = std::fs::read_to_string(&marker.file.path) else {
        return 1;
    };
    let before: Vec<char> = text.chars().take(offsets.start).collect();
    let column = before.iter().rev().take_while(|ch| **ch != '\n').count() + 1;
    u32::try_from(column).unwrap_or(1)
}
