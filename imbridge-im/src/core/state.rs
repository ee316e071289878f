//! Composition state machine
//!
//! Tracks what the host editor has been told about the current composition.
//! The state only moves forward: start, any number of updates, then commit.

use imbridge_core::TextRangeArray;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::context::WindowId;
use super::native::NativeHandle;

/// Which composition events the host has seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionState {
    /// No composition, waiting for the input method
    #[default]
    NotComposing,
    /// Composition start dispatched, no update yet
    StartDispatched,
    /// At least one update dispatched
    ChangeDispatched,
}

impl CompositionState {
    pub fn is_composing(self) -> bool {
        !matches!(self, Self::NotComposing)
    }
}

/// The composition the host is showing.
#[derive(Debug, Clone, Default)]
pub struct Composition {
    state: CompositionState,
    /// Context the composition belongs to
    context: Option<NativeHandle>,
    /// Window the composition was started in
    window: Option<WindowId>,
    /// Character offset in the document where the composition starts
    start: usize,
    /// Last string sent with an update
    dispatched: String,
    ranges: TextRangeArray,
}

impl Composition {
    pub fn state(&self) -> CompositionState {
        self.state
    }

    pub fn is_composing(&self) -> bool {
        self.state.is_composing()
    }

    pub fn context(&self) -> Option<NativeHandle> {
        self.context
    }

    pub fn window(&self) -> Option<WindowId> {
        self.window
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Last string dispatched with an update, empty right after a start
    pub fn dispatched(&self) -> &str {
        &self.dispatched
    }

    pub fn dispatched_len(&self) -> usize {
        self.dispatched.chars().count()
    }

    pub fn ranges(&self) -> &TextRangeArray {
        &self.ranges
    }

    /// NotComposing to StartDispatched
    pub fn begin(&mut self, context: NativeHandle, window: Option<WindowId>, start: usize) {
        debug_assert!(!self.is_composing(), "composition started twice");
        *self = Self {
            state: CompositionState::StartDispatched,
            context: Some(context),
            window,
            start,
            ..Self::default()
        };
        trace!("composition: start at {} on {}", start, context);
    }

    /// StartDispatched or ChangeDispatched to ChangeDispatched
    pub fn update(&mut self, text: &str, ranges: TextRangeArray) {
        debug_assert!(self.is_composing(), "update without a composition");
        self.state = CompositionState::ChangeDispatched;
        self.dispatched.clear();
        self.dispatched.push_str(text);
        self.ranges = ranges;
    }

    /// Back to NotComposing, returning the last dispatched string.
    pub fn finish(&mut self) -> String {
        let dispatched = std::mem::take(&mut self.dispatched);
        *self = Self::default();
        dispatched
    }
}
