//! Native input method collaborator
//!
//! The native toolkit owns the real input method contexts. The bridge only
//! sees opaque handles, the signals a context emits, and a handful of calls
//! it may make on a context.

use std::collections::VecDeque;
use std::fmt;

use imbridge_core::NativeKeyEvent;
use serde::{Deserialize, Serialize};

use super::context::{InputHints, InputPurpose};
use super::host::CaretRect;
use super::preedit::PreeditString;

/// Opaque handle of a native input method context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeHandle(pub u64);

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

/// The three contexts a bridge owns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    /// The user's input method
    Primary,
    /// Dead keys only, for password fields and editors that disable the IME
    Simple,
    /// Always closed
    Dummy,
}

/// A signal emitted by a native context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NativeSignal {
    PreeditStart,
    /// `preedit` is the preedit as of emission when the signal was queued;
    /// `None` means ask the context.
    PreeditChanged {
        #[serde(default)]
        preedit: Option<PreeditString>,
    },
    PreeditEnd,
    /// `text: None` commits the last dispatched composition string.
    Commit {
        #[serde(default)]
        text: Option<String>,
    },
    RetrieveSurrounding,
    DeleteSurrounding { offset: i32, n_chars: u32 },
}

impl NativeSignal {
    pub fn commit(text: impl Into<String>) -> Self {
        NativeSignal::Commit {
            text: Some(text.into()),
        }
    }

    pub fn changed() -> Self {
        NativeSignal::PreeditChanged { preedit: None }
    }

    pub fn changed_to(preedit: PreeditString) -> Self {
        NativeSignal::PreeditChanged {
            preedit: Some(preedit),
        }
    }
}

/// Signals collected while the bridge is inside a native call or a signal
/// handler. They are handled in order once the current work returns.
#[derive(Debug, Clone, Default)]
pub struct SignalQueue {
    signals: VecDeque<(NativeHandle, NativeSignal)>,
}

impl SignalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, handle: NativeHandle, signal: NativeSignal) {
        self.signals.push_back((handle, signal));
    }

    pub fn pop(&mut self) -> Option<(NativeHandle, NativeSignal)> {
        self.signals.pop_front()
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn clear(&mut self) {
        self.signals.clear();
    }
}

/// Operations the bridge performs on native contexts.
///
/// Calls that make the input method emit signals synchronously take a
/// [`SignalQueue`] instead of calling back into the bridge.
pub trait NativeInputMethod {
    /// Create a context of the given kind; `None` when no display or seat is
    /// available.
    fn create_context(&mut self, kind: ContextKind) -> Option<NativeHandle>;

    fn release_context(&mut self, handle: NativeHandle);

    /// Module id of the input method behind `handle` (e.g. "ibus").
    fn module_id(&self, handle: NativeHandle) -> String;

    /// Offer a key event to the input method. Returns whether it consumed it.
    fn filter_keypress(
        &mut self,
        handle: NativeHandle,
        event: &NativeKeyEvent,
        signals: &mut SignalQueue,
    ) -> bool;

    /// Current preedit string of the context.
    fn preedit(&self, handle: NativeHandle) -> PreeditString;

    fn focus_in(&mut self, handle: NativeHandle);

    fn focus_out(&mut self, handle: NativeHandle);

    /// Drop any composition the input method holds.
    fn reset(&mut self, handle: NativeHandle, signals: &mut SignalQueue);

    /// Answer a retrieve-surrounding request. `cursor` is a byte offset.
    fn set_surrounding(&mut self, handle: NativeHandle, text: &str, cursor: usize);

    /// Candidate window anchor
    fn set_cursor_location(&mut self, handle: NativeHandle, rect: CaretRect);

    fn set_input_purpose(&mut self, handle: NativeHandle, purpose: InputPurpose, hints: InputHints);
}
