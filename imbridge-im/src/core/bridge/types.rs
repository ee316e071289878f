//! Type definitions for the composition bridge

use imbridge_core::{DetectOptions, NativeKeyEvent};
use serde::{Deserialize, Serialize};

use crate::config::Settings;

/// What `on_key_event` did with a raw key event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyHandlingState {
    /// The host should handle the key as usual
    NotHandled,
    /// The input method consumed the key
    Handled,
    /// A keyboard event for this key already reached the host; do not
    /// dispatch another one
    NotHandledButDispatched,
    /// Like `NotHandledButDispatched`, and the host consumed it
    NotHandledButConsumed,
}

impl KeyHandlingState {
    pub fn is_handled(self) -> bool {
        matches!(self, Self::Handled)
    }

    /// The host already saw a keyboard event for this key.
    pub fn was_dispatched(self) -> bool {
        matches!(
            self,
            Self::NotHandledButDispatched | Self::NotHandledButConsumed
        )
    }
}

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Password fields use the simple context instead of the dummy one
    pub use_simple_context_on_password_field: bool,
    /// Backend detection options
    pub detect: DetectOptions,
    /// Characters served on each side of the caret
    pub max_paragraph_chars: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            use_simple_context_on_password_field: true,
            detect: DetectOptions::default(),
            max_paragraph_chars: 1024,
        }
    }
}

impl From<&Settings> for BridgeConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            use_simple_context_on_password_field: settings
                .context
                .use_simple_context_on_password_field,
            detect: settings.detect_options(),
            max_paragraph_chars: settings.surrounding.max_paragraph_chars,
        }
    }
}

/// Per-tick key bookkeeping.
///
/// A tick is one `on_key_event` call, or one delivery of native signals
/// from outside key handling.
#[derive(Debug, Clone, Default)]
pub(super) struct KeyTick {
    /// The raw key being filtered
    pub processing: Option<NativeKeyEvent>,
    /// The host has seen a keyboard event in this tick
    pub keyboard_event_dispatched: bool,
    /// ...and consumed it
    pub keyboard_event_consumed: bool,
    /// The input method committed exactly the key's character
    pub fallback_to_key_event: bool,
}

/// Composition event guarded by a synthetic key dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FollowingEvent {
    CompositionStart,
    CompositionUpdate,
    CompositionCommit,
}
