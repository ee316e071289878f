//! Native preedit string
//!
//! What an input method context reports as its current composition: the
//! text, attribute runs over UTF-8 byte offsets, and a caret in characters.

use imbridge_core::{AttributeRun, TextRangeArray, build_text_ranges, plain_text_ranges};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Preedit string with cursor position and attribute runs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreeditString {
    /// The preedit text
    text: String,
    /// Caret (cursor) position in characters
    #[serde(default)]
    cursor: usize,
    /// Attribute runs, byte offsets into `text`
    #[serde(default)]
    runs: Vec<AttributeRun>,
}

impl PreeditString {
    /// Create a new empty preedit
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a preedit with the given text and the caret at its end
    pub fn with_text(text: impl Into<String>) -> Self {
        let text = text.into();
        let len = text.chars().count();
        Self {
            text,
            cursor: len,
            runs: Vec::new(),
        }
    }

    /// Create a preedit from text, runs and caret
    pub fn with_runs(text: impl Into<String>, runs: Vec<AttributeRun>, cursor: usize) -> Self {
        let mut preedit = Self::with_text(text);
        preedit.runs = runs;
        preedit.set_cursor(cursor);
        preedit
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn runs(&self) -> &[AttributeRun] {
        &self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Set the caret position, clamped to the text
    pub fn set_cursor(&mut self, cursor: usize) {
        self.cursor = cursor.min(self.len());
    }

    /// Editor-facing clauses and caret.
    ///
    /// Runs that do not sit on character boundaries are dropped in favour of
    /// a single raw-input clause.
    pub fn to_ranges(&self) -> TextRangeArray {
        build_text_ranges(&self.text, &self.runs, self.cursor).unwrap_or_else(|e| {
            warn!("preedit attributes unusable ({}), using a plain clause", e);
            plain_text_ranges(&self.text, self.cursor)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imbridge_core::{RangeKind, Rgba};

    #[test]
    fn test_with_text_puts_cursor_at_end() {
        let preedit = PreeditString::with_text("かな");
        assert_eq!(preedit.len(), 2);
        assert_eq!(preedit.cursor(), 2);
    }

    #[test]
    fn test_cursor_is_clamped() {
        let mut preedit = PreeditString::with_text("ab");
        preedit.set_cursor(10);
        assert_eq!(preedit.cursor(), 2);
    }

    #[test]
    fn test_to_ranges_uses_runs() {
        let preedit = PreeditString::with_runs(
            "変換",
            vec![AttributeRun::highlighted(0, 6, Rgba::rgb(0, 0, 0xff))],
            0,
        );
        let ranges = preedit.to_ranges();
        assert_eq!(ranges.target(), Some((0, 2)));
    }

    #[test]
    fn test_to_ranges_falls_back_on_bad_runs() {
        let preedit = PreeditString::with_runs("あい", vec![AttributeRun::underlined(1, 2)], 2);
        let ranges = preedit.to_ranges();
        let clauses: Vec<_> = ranges.clauses().collect();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].kind, RangeKind::RawInput);
        assert_eq!(clauses[0].length, 2);
        assert_eq!(ranges.caret(), Some(2));
    }
}
