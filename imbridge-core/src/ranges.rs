//! Composition text range building
//!
//! Input methods describe their preedit string as attribute runs over UTF-8
//! byte offsets (underline, foreground, background). Editors want clauses in
//! character offsets with a kind (raw input, converted, selected) and a caret.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{CoreError, Result};

/// Underline style of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnderlineStyle {
    #[default]
    None,
    Single,
    Double,
    Low,
    Error,
}

/// 8-bit RGBA color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    #[serde(default = "opaque")]
    pub a: u8,
}

fn opaque() -> u8 {
    0xff
}

impl Rgba {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }
}

/// One attribute run of a native preedit string. Offsets are UTF-8 bytes,
/// `end` exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRun {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub underline: UnderlineStyle,
    #[serde(default)]
    pub underline_color: Option<Rgba>,
    #[serde(default)]
    pub foreground: Option<Rgba>,
    #[serde(default)]
    pub background: Option<Rgba>,
}

impl AttributeRun {
    pub fn underlined(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            underline: UnderlineStyle::Single,
            ..Self::default()
        }
    }

    pub fn highlighted(start: usize, end: usize, background: Rgba) -> Self {
        Self {
            start,
            end,
            background: Some(background),
            ..Self::default()
        }
    }
}

/// What a range of the composition string is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeKind {
    /// Not converted yet
    RawInput,
    /// Converted, not the clause being edited
    Converted,
    /// The clause the user is converting
    Selected,
    /// Zero-length caret marker
    Caret,
}

/// Presentation hints carried along with a range
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeStyle {
    pub underline: UnderlineStyle,
    pub underline_color: Option<Rgba>,
    pub foreground: Option<Rgba>,
    pub background: Option<Rgba>,
}

/// One annotated range, in character (code point) offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextRange {
    pub offset: usize,
    pub length: usize,
    pub kind: RangeKind,
    #[serde(default)]
    pub style: RangeStyle,
}

impl TextRange {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// Clauses sorted by offset, non-overlapping, plus one caret marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextRangeArray(Vec<TextRange>);

impl TextRangeArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_slice(&self) -> &[TextRange] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TextRange> {
        self.0.iter()
    }

    /// Every range except the caret.
    pub fn clauses(&self) -> impl Iterator<Item = &TextRange> {
        self.0.iter().filter(|r| r.kind != RangeKind::Caret)
    }

    /// Caret offset in characters
    pub fn caret(&self) -> Option<usize> {
        self.0
            .iter()
            .find(|r| r.kind == RangeKind::Caret)
            .map(|r| r.offset)
    }

    /// Offset and length of the clause being converted, falling back to the
    /// caret position.
    pub fn target(&self) -> Option<(usize, usize)> {
        self.0
            .iter()
            .find(|r| r.kind == RangeKind::Selected)
            .map(|r| (r.offset, r.length))
            .or_else(|| self.caret().map(|offset| (offset, 0)))
    }

    /// Ranges are sorted by offset and clauses do not overlap. The caret
    /// has no extent and may sit inside a clause.
    pub fn is_well_formed(&self) -> bool {
        let sorted = self.0.windows(2).all(|pair| pair[0].offset <= pair[1].offset);
        let clauses: Vec<_> = self.clauses().collect();
        sorted && clauses.windows(2).all(|pair| pair[0].end() <= pair[1].offset)
    }
}

impl<'a> IntoIterator for &'a TextRangeArray {
    type Item = &'a TextRange;
    type IntoIter = std::slice::Iter<'a, TextRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

fn classify(run: &AttributeRun) -> RangeKind {
    if run.background.is_some() {
        RangeKind::Selected
    } else {
        match run.underline {
            UnderlineStyle::Double | UnderlineStyle::Low => RangeKind::Converted,
            UnderlineStyle::None | UnderlineStyle::Single | UnderlineStyle::Error => {
                RangeKind::RawInput
            }
        }
    }
}

fn raw_clause(offset: usize, length: usize) -> TextRange {
    TextRange {
        offset,
        length,
        kind: RangeKind::RawInput,
        style: RangeStyle {
            underline: UnderlineStyle::Single,
            ..RangeStyle::default()
        },
    }
}

fn char_offset(text: &str, byte: usize) -> Result<usize> {
    if byte > text.len() {
        return Err(CoreError::RunOutOfBounds {
            offset: byte,
            len: text.len(),
        });
    }
    if !text.is_char_boundary(byte) {
        return Err(CoreError::NotCharBoundary(byte));
    }
    Ok(text[..byte].chars().count())
}

/// Build the range array for `text` from native attribute runs.
///
/// Runs are clipped so they never overlap an earlier run, gaps are filled
/// with raw-input clauses, and a zero-length caret range is placed at
/// `caret` (characters, clamped to the text). Fails when a run does not sit
/// on character boundaries.
pub fn build_text_ranges(text: &str, runs: &[AttributeRun], caret: usize) -> Result<TextRangeArray> {
    let len = text.chars().count();
    let mut sorted: Vec<&AttributeRun> = runs.iter().collect();
    sorted.sort_by_key(|run| run.start);

    let mut ranges = Vec::with_capacity(sorted.len() + 2);
    let mut cursor = 0usize;
    for run in sorted {
        let start = char_offset(text, run.start)?.max(cursor);
        let end = char_offset(text, run.end.max(run.start))?;
        if end <= start {
            trace!("ranges: skipping empty or shadowed run {:?}", run);
            continue;
        }
        if start > cursor {
            ranges.push(raw_clause(cursor, start - cursor));
        }
        ranges.push(TextRange {
            offset: start,
            length: end - start,
            kind: classify(run),
            style: RangeStyle {
                underline: run.underline,
                underline_color: run.underline_color,
                foreground: run.foreground,
                background: run.background,
            },
        });
        cursor = end;
    }
    if cursor < len {
        ranges.push(raw_clause(cursor, len - cursor));
    }

    let caret = caret.min(len);
    let at = ranges.partition_point(|r| r.offset < caret);
    ranges.insert(
        at,
        TextRange {
            offset: caret,
            length: 0,
            kind: RangeKind::Caret,
            style: RangeStyle::default(),
        },
    );

    Ok(TextRangeArray(ranges))
}

/// Fallback used when the native runs are unusable: the whole string as one
/// raw clause with the caret at `caret`.
pub fn plain_text_ranges(text: &str, caret: usize) -> TextRangeArray {
    build_text_ranges(text, &[], caret).unwrap_or_default()
}
