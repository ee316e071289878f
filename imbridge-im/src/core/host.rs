//! Host editor collaborator
//!
//! Every dispatch may run arbitrary host code, which can move focus or
//! destroy the widget. Callers must check [`DispatchOutcome::widget_still_valid`]
//! before continuing a sequence.

use imbridge_core::{Keysym, ModifierState, TextRangeArray};
use serde::{Deserialize, Serialize};

use super::context::WindowId;
use super::surrounding::SurroundingTextSnapshot;

/// What happened to a dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// The host called preventDefault (or its equivalent)
    pub consumed: bool,
    /// Focus is still where it was and the widget is alive
    pub widget_still_valid: bool,
}

impl DispatchOutcome {
    pub fn ok() -> Self {
        Self {
            consumed: false,
            widget_still_valid: true,
        }
    }

    pub fn consumed() -> Self {
        Self {
            consumed: true,
            widget_still_valid: true,
        }
    }

    pub fn widget_gone() -> Self {
        Self {
            consumed: false,
            widget_still_valid: false,
        }
    }
}

/// Keyboard event kind for synthetic dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntheticKeyKind {
    KeyDown,
    KeyUp,
}

/// A keyboard event telling the host that a key was processed by the IME.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticKeyEvent {
    pub kind: SyntheticKeyKind,
    /// `None` when the input method snoops keys and we never saw the key
    pub keysym: Option<Keysym>,
    pub hardware_keycode: u16,
    pub state: ModifierState,
}

/// Selection change notification from the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionChange {
    /// Caused by a composition event this bridge dispatched
    #[serde(default)]
    pub caused_by_composition: bool,
    /// The change happened while a composition was active
    #[serde(default)]
    pub occurred_during_composition: bool,
}

impl SelectionChange {
    pub fn external() -> Self {
        Self::default()
    }

    pub fn self_caused() -> Self {
        Self {
            caused_by_composition: true,
            occurred_during_composition: true,
        }
    }
}

/// Caret rectangle in window coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaretRect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Editor-facing side of the bridge.
pub trait HostEditor {
    fn dispatch_composition_start(&mut self) -> DispatchOutcome;

    fn dispatch_composition_update(&mut self, text: &str, ranges: &TextRangeArray) -> DispatchOutcome;

    fn dispatch_composition_commit(&mut self, text: &str) -> DispatchOutcome;

    fn dispatch_synthetic_key(&mut self, key: &SyntheticKeyEvent) -> DispatchOutcome;

    /// Text and caret of the focused editable, `None` when nothing editable
    /// has focus.
    fn query_selection(&mut self, window: WindowId) -> Option<SurroundingTextSnapshot>;

    /// Delete `len` characters starting at character offset `start`.
    fn delete_content(&mut self, start: usize, len: usize) -> DispatchOutcome;

    /// Caret rectangle at a character offset, for the candidate window.
    fn caret_rect(&mut self, _window: WindowId, _offset: usize) -> Option<CaretRect> {
        None
    }
}
