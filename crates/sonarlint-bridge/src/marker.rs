//! Active marker slot and text range helpers.

use std::ops::Range;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::PresentationError;
use crate::model::{Marker, MarkerOffsets, TextRange};
use crate::services::Presenter;

/// A text range located in a concrete file text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Byte range into the text.
    pub bytes: Range<usize>,
    /// Character offsets from the start of the text.
    pub chars: MarkerOffsets,
}

/// Locate `range` in `text`. `None` when the range does not fit the text.
#[must_use]
pub fn locate(text: &str, range: &TextRange) -> Option<Span> {
    let lines = line_bounds(text);
    let start = byte_at(text, &lines, range.start_line, range.start_line_offset)?;
    let end = byte_at(text, &lines, range.end_line, range.end_line_offset)?;
    if start > end {
        return None;
    }
    let char_start = text[..start].chars().count();
    let char_end = char_start + text[start..end].chars().count();
    Some(Span {
        bytes: start..end,
        chars: MarkerOffsets {
            start: char_start,
            end: char_end,
        },
    })
}

/// Text covered by `range`.
#[must_use]
pub fn snippet<'a>(text: &'a str, range: &TextRange) -> Option<&'a str> {
    locate(text, range).map(|span| &text[span.bytes])
}

/// Offsets of `range` in `text`, only when the text there is exactly `expected`.
///
/// The server's range describes the server's copy of the file; when the local
/// copy has drifted the marker falls back to the line alone.
#[must_use]
pub fn verified_offsets(text: &str, range: &TextRange, expected: &str) -> Option<MarkerOffsets> {
    let span = locate(text, range)?;
    (text.as_bytes()[span.bytes.clone()] == *expected.as_bytes()).then_some(span.chars)
}

/// Byte bounds of each line, without its terminator.
fn line_bounds(text: &str) -> Vec<Range<usize>> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (index, byte) in text.bytes().enumerate() {
        if byte == b'\n' {
            let end = if index > start && text.as_bytes()[index - 1] == b'\r' {
                index - 1
            } else {
                index
            };
            lines.push(start..end);
            start = index + 1;
        }
    }
    lines.push(start..text.len());
    lines
}

fn byte_at(text: &str, lines: &[Range<usize>], line: u32, column: u32) -> Option<usize> {
    let index = usize::try_from(line).ok()?.checked_sub(1)?;
    let bounds = lines.get(index)?;
    let content = &text[bounds.clone()];
    let column = usize::try_from(column).ok()?;
    if column == content.chars().count() {
        return Some(bounds.end);
    }
    content
        .char_indices()
        .nth(column)
        .map(|(offset, _)| bounds.start + offset)
}

/// The single marker currently on screen.
///
/// Replacing goes through one lock so that deleting the previous marker and
/// storing the new one can't interleave with another replacement.
#[derive(Debug, Default)]
pub struct ActiveMarkerSlot {
    current: Mutex<Option<Marker>>,
}

impl ActiveMarkerSlot {
    /// Empty slot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marker currently on screen, if any.
    #[must_use]
    pub fn current(&self) -> Option<Marker> {
        self.current.lock().clone()
    }

    /// Delete the active marker, then store whatever `create` produces.
    ///
    /// Failures on either side are logged and leave the slot empty.
    pub fn replace<F>(&self, presenter: &dyn Presenter, create: F) -> Option<Marker>
    where
        F: FnOnce(&dyn Presenter) -> Result<Marker, PresentationError>,
    {
        let mut current = self.current.lock();
        if let Some(previous) = current.take() {
            if let Err(err) = presenter.delete_marker(&previous) {
                debug!(marker = previous.id.0, "failed to delete previous marker: {err}");
            }
        }
        match create(presenter) {
            Ok(marker) => {
                *current = Some(marker.clone());
                Some(marker)
            }
            Err(err) => {
                debug!("failed to create marker: {err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "fn main() {\n    let password = \"hunter2\";\n}\n";

    #[test]
    fn locates_single_line_range() {
        let range = TextRange::new(2, 8, 2, 16);
        assert_eq!(snippet(SOURCE, &range), Some("password"));
        let span = locate(SOURCE, &range).expect("locate range");
        assert_eq!(span.chars, MarkerOffsets { start: 20, end: 28 });
    }

    #[test]
    fn locates_multi_line_range_and_line_end() {
        let range = TextRange::new(1, 10, 2, 7);
        assert_eq!(snippet(SOURCE, &range), Some("{\n    let"));
        let whole_line = TextRange::new(3, 0, 3, 1);
        assert_eq!(snippet(SOURCE, &whole_line), Some("}"));
        let line_end = TextRange::new(1, 11, 1, 11);
        assert_eq!(snippet(SOURCE, &line_end), Some(""));
    }

    #[test]
    fn handles_crlf_and_multibyte_text() {
        let text = "a\r\nlet é = \"ü\";\r\n";
        let range = TextRange::new(2, 4, 2, 5);
        assert_eq!(snippet(text, &range), Some("é"));
        let span = locate(text, &range).expect("locate");
        assert_eq!(span.chars, MarkerOffsets { start: 7, end: 8 });
        assert_eq!(snippet(text, &TextRange::new(1, 0, 1, 1)), Some("a"));
        assert_eq!(snippet(text, &TextRange::new(1, 2, 1, 2)), None);
    }

    #[test]
    fn rejects_ranges_outside_the_text() {
        assert_eq!(locate(SOURCE, &TextRange::new(0, 0, 1, 1)), None);
        assert_eq!(locate(SOURCE, &TextRange::new(9, 0, 9, 1)), None);
        assert_eq!(locate(SOURCE, &TextRange::new(2, 50, 2, 51)), None);
        assert_eq!(locate(SOURCE, &TextRange::new(2, 9, 2, 3)), None);
    }

    #[test]
    fn offsets_only_when_snippet_matches() {
        let range = TextRange::new(2, 8, 2, 16);
        assert_eq!(
            verified_offsets(SOURCE, &range, "password"),
            Some(MarkerOffsets { start: 20, end: 28 })
        );
        assert_eq!(verified_offsets(SOURCE, &range, "passw0rd"), None);
        let edited = SOURCE.replace("password", "secret_pw");
        assert_eq!(verified_offsets(&edited, &range, "password"), None);
    }
}
