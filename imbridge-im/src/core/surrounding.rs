//! Surrounding-text cache
//!
//! Input methods ask for the text around the caret on almost every key. The
//! cache keeps one snapshot of the focused editor's text and caret until the
//! host reports a selection change the bridge did not cause itself.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Text of the focused editable and the caret, in characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurroundingTextSnapshot {
    pub text: String,
    pub caret: usize,
}

impl SurroundingTextSnapshot {
    pub fn new(text: impl Into<String>, caret: usize) -> Self {
        let text = text.into();
        let caret = caret.min(text.chars().count());
        Self { text, caret }
    }

    /// Length in characters
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Caret as a UTF-8 byte offset into `text`
    pub fn caret_byte(&self) -> usize {
        byte_index(&self.text, self.caret)
    }

    /// The snapshot with `len` characters at `start` cut out.
    pub fn without(&self, start: usize, len: usize) -> Self {
        let total = self.len();
        let start = start.min(total);
        let end = start.saturating_add(len).min(total);
        let mut text = String::with_capacity(self.text.len());
        text.push_str(&self.text[..byte_index(&self.text, start)]);
        text.push_str(&self.text[byte_index(&self.text, end)..]);
        let caret = if self.caret >= end {
            self.caret - (end - start)
        } else {
            self.caret.min(start)
        };
        Self { text, caret }
    }

    /// The caret's paragraph, at most `max_chars` characters on each side.
    pub fn paragraph(&self, max_chars: usize) -> Self {
        let chars: Vec<char> = self.text.chars().collect();
        let caret = self.caret.min(chars.len());
        let para_start = chars[..caret]
            .iter()
            .rposition(|&c| c == '\n')
            .map_or(0, |i| i + 1);
        let para_end = chars[caret..]
            .iter()
            .position(|&c| c == '\n')
            .map_or(chars.len(), |i| caret + i);
        let start = para_start.max(caret.saturating_sub(max_chars));
        let end = para_end.min(caret.saturating_add(max_chars));
        Self {
            text: chars[start..end].iter().collect(),
            caret: caret - start,
        }
    }
}

fn byte_index(text: &str, chars: usize) -> usize {
    text.char_indices()
        .nth(chars)
        .map_or(text.len(), |(index, _)| index)
}

#[derive(Debug, Clone)]
struct CachedSnapshot {
    snapshot: SurroundingTextSnapshot,
    /// Composition string present in `snapshot` (start, length)
    composition: Option<(usize, usize)>,
}

/// At most one snapshot, valid until the next external selection change.
#[derive(Debug, Clone, Default)]
pub struct SurroundingTextCache {
    cached: Option<CachedSnapshot>,
    queries: usize,
}

impl SurroundingTextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the snapshot through `query` unless one is already valid.
    ///
    /// `composition` is the composition string the host text contains right
    /// now, if any. Returns whether a snapshot exists afterwards.
    pub fn ensure_cached<F>(&mut self, query: F, composition: Option<(usize, usize)>) -> bool
    where
        F: FnOnce() -> Option<SurroundingTextSnapshot>,
    {
        if self.cached.is_some() {
            return true;
        }
        self.queries += 1;
        match query() {
            Some(snapshot) => {
                trace!(
                    "surrounding: cached {} chars, caret {}",
                    snapshot.len(),
                    snapshot.caret
                );
                self.cached = Some(CachedSnapshot {
                    snapshot,
                    composition: composition.filter(|&(_, len)| len > 0),
                });
                true
            }
            None => {
                trace!("surrounding: host has no selection");
                false
            }
        }
    }

    /// The snapshot as the host reported it.
    pub fn snapshot(&self) -> Option<&SurroundingTextSnapshot> {
        self.cached.as_ref().map(|c| &c.snapshot)
    }

    /// The snapshot with any composition string cut out.
    pub fn without_composition(&self) -> Option<SurroundingTextSnapshot> {
        self.cached.as_ref().map(|c| match c.composition {
            Some((start, len)) => c.snapshot.without(start, len),
            None => c.snapshot.clone(),
        })
    }

    /// Clear the snapshot unless the change was caused by our own dispatch.
    /// Returns whether the snapshot was dropped.
    pub fn invalidate_on_external_change(&mut self, self_caused: bool) -> bool {
        if self_caused {
            trace!("surrounding: absorbed self-caused selection change");
            return false;
        }
        self.invalidate()
    }

    /// Returns whether a snapshot was dropped.
    pub fn invalidate(&mut self) -> bool {
        self.cached.take().is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.cached.is_some()
    }

    /// Number of host queries performed so far
    pub fn query_count(&self) -> usize {
        self.queries
    }
}
