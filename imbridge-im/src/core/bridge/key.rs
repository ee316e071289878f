//! Raw key event handling and synthetic "processed by IME" key dispatch

use imbridge_core::{KeyEventKind, NativeKeyEvent};
use tracing::{debug, trace, warn};

use super::{CompositionBridge, FollowingEvent, KeyHandlingState, KeyTick};
use crate::core::context::WindowId;
use crate::core::host::{HostEditor, SyntheticKeyEvent, SyntheticKeyKind};
use crate::core::native::{NativeInputMethod, SignalQueue};

impl<H: HostEditor, N: NativeInputMethod> CompositionBridge<H, N> {
    /// Offer a raw key event to the current input method context.
    ///
    /// `already_dispatched` tells whether the host has already seen a
    /// keyboard event for this key. When the result is one of the
    /// `NotHandledBut*` variants the caller must not dispatch the key again.
    pub fn on_key_event(
        &mut self,
        window: WindowId,
        event: &NativeKeyEvent,
        already_dispatched: bool,
    ) -> KeyHandlingState {
        if self.contexts.is_destroyed() {
            return KeyHandlingState::NotHandled;
        }
        if self.contexts.last_focused() != Some(window) {
            trace!("{}: key event for an unfocused window", window);
            return KeyHandlingState::NotHandled;
        }
        if !self.contexts.input_context().enabled.is_editable() {
            return KeyHandlingState::NotHandled;
        }
        if self.in_native_signal {
            warn!("{}: key event while handling a native signal, not filtering", window);
            return KeyHandlingState::NotHandled;
        }
        let Some(current) = self.contexts.current() else {
            return KeyHandlingState::NotHandled;
        };

        trace!(
            "{}: {:?} {} (time={}, state={:#x}, dispatched={})",
            window,
            event.kind,
            event.keysym,
            event.time,
            event.state.bits(),
            already_dispatched
        );

        if event.is_press() && self.cursor_position_stale {
            self.cursor_position_stale = false;
            self.update_cursor_location(current);
        }

        let async_mode = self.quirks.supports_async_key_handling();
        let mut redelivered = false;
        if async_mode && let Some(pending) = self.ledger.remove_through_match(event) {
            // A press the input method handed back, or the release of a
            // press it already answered.
            redelivered = event.is_press();
            debug!(
                "{}: {} matches pending {:?} (time={})",
                window, event.keysym, pending.kind, pending.time
            );
        }
        // The release of a press the input method still holds belongs to
        // the input method too.
        let press_pending = async_mode
            && !event.is_press()
            && self.ledger.corresponding_press(event).is_some();

        self.key = KeyTick {
            processing: Some(event.clone()),
            keyboard_event_dispatched: already_dispatched,
            ..KeyTick::default()
        };
        let mut signals = SignalQueue::new();
        let filtered = self.native.filter_keypress(current, event, &mut signals);
        self.absorb(signals);

        if press_pending && !filtered {
            debug!("{}: release of a pending press, treated as filtered", window);
        }
        let filter_this_event = (filtered || press_pending) && !self.key.fallback_to_key_event;
        if filter_this_event
            && !async_mode
            && event.is_press()
            && self.composition.is_composing()
            && !self.key.keyboard_event_dispatched
        {
            // Consumed without any signal, e.g. a cursor key inside the
            // composition: the host still needs to know a key went by.
            self.maybe_dispatch_processed_key(FollowingEvent::CompositionUpdate);
        }
        let tick = std::mem::take(&mut self.key);

        self.track_dead_key(event, filtered);

        if filter_this_event
            && async_mode
            && event.is_press()
            && !redelivered
            && !tick.keyboard_event_dispatched
        {
            self.ledger.record_press(event);
        }

        let state = if filter_this_event {
            KeyHandlingState::Handled
        } else if tick.keyboard_event_dispatched {
            if tick.keyboard_event_consumed {
                KeyHandlingState::NotHandledButConsumed
            } else {
                KeyHandlingState::NotHandledButDispatched
            }
        } else {
            KeyHandlingState::NotHandled
        };
        trace!(
            "{}: {} -> {:?} (filtered={}, fallback={})",
            window, event.keysym, state, filtered, tick.fallback_to_key_event
        );
        state
    }

    /// Dead-key sequences cannot be observed exactly: a dead key press the
    /// input method consumes starts one, and commit, reset or a key the
    /// input method lets through end it. Keys it consumes without a signal,
    /// Escape included, look the same as modifiers and keep it going.
    fn track_dead_key(&mut self, event: &NativeKeyEvent, filtered: bool) {
        if !event.is_press() || event.is_modifier_key() {
            return;
        }
        if event.keysym.is_dead_key() {
            if filtered && !self.maybe_in_dead_key_sequence {
                debug!("dead key {} starts a sequence", event.keysym);
                self.maybe_in_dead_key_sequence = true;
            }
            return;
        }
        if !self.maybe_in_dead_key_sequence {
            return;
        }
        if !filtered && !self.composition.is_composing() {
            debug!("{} ends the dead-key sequence", event.keysym);
            self.maybe_in_dead_key_sequence = false;
        }
    }

    /// Tell the host a key was processed by the input method, at most once
    /// per tick and always before the composition event it guards.
    ///
    /// The source key is the key being filtered, else the oldest press an
    /// asynchronous input method still holds. Snooping input methods never
    /// show us their keys, so an anonymous key down/up pair is sent instead.
    /// Returns false when the host lost the widget.
    pub(super) fn maybe_dispatch_processed_key(&mut self, following: FollowingEvent) -> bool {
        if self.contexts.is_destroyed() {
            return false;
        }
        if self.key.keyboard_event_dispatched {
            return true;
        }

        let keys = if let Some(event) = &self.key.processing {
            let kind = match event.kind {
                KeyEventKind::Press => SyntheticKeyKind::KeyDown,
                KeyEventKind::Release => SyntheticKeyKind::KeyUp,
            };
            vec![SyntheticKeyEvent {
                kind,
                keysym: Some(event.keysym),
                hardware_keycode: event.hardware_keycode,
                state: event.state,
            }]
        } else if let Some(pending) = self.ledger.remove_first() {
            vec![SyntheticKeyEvent {
                kind: SyntheticKeyKind::KeyDown,
                keysym: Some(pending.keysym),
                hardware_keycode: pending.hardware_keycode,
                state: pending.state,
            }]
        } else if self.quirks.uses_key_snooping() {
            [SyntheticKeyKind::KeyDown, SyntheticKeyKind::KeyUp]
                .into_iter()
                .map(|kind| SyntheticKeyEvent {
                    kind,
                    keysym: None,
                    hardware_keycode: 0,
                    state: Default::default(),
                })
                .collect()
        } else {
            return true;
        };

        self.key.keyboard_event_dispatched = true;
        for key in keys {
            trace!("dispatching {:?} {:?} before {:?}", key.kind, key.keysym, following);
            let outcome = self.host.dispatch_synthetic_key(&key);
            self.key.keyboard_event_consumed |= outcome.consumed;
            if !outcome.widget_still_valid {
                warn!("widget lost while dispatching a processed key before {:?}", following);
                return false;
            }
        }
        true
    }
}
