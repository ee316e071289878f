//! Focus, lifecycle and input context changes

use tracing::{debug, trace};

use super::CompositionBridge;
use crate::core::context::{ImeFocusState, InputContext, WindowId};
use crate::core::host::HostEditor;
use crate::core::native::{NativeHandle, NativeInputMethod};

impl<H: HostEditor, N: NativeInputMethod> CompositionBridge<H, N> {
    /// A window of this bridge got native focus.
    pub fn on_focus_window(&mut self, window: WindowId) {
        if self.contexts.is_destroyed() {
            return;
        }
        debug!("{}: focus", window);
        if self.composition.is_composing() && self.composition.window() != Some(window) {
            debug!(
                "finalizing the composition of {:?} before focusing {}",
                self.composition.window(),
                window
            );
            self.commit_as_is();
        }
        let same_window = self.contexts.last_focused() == Some(window);
        self.contexts.set_last_focused(Some(window));
        self.focus_native(same_window);
    }

    /// A window of this bridge lost native focus.
    pub fn on_blur_window(&mut self, window: WindowId) {
        if self.contexts.is_destroyed() {
            return;
        }
        if self.contexts.last_focused() != Some(window) {
            trace!("{}: blur of a window that is not focused", window);
            return;
        }
        debug!("{}: blur", window);
        self.blur_native();
    }

    /// A window of this bridge is going away. Destroying the owner releases
    /// every native context; nothing is emitted afterwards.
    pub fn on_destroy_window(&mut self, window: WindowId) {
        if self.contexts.is_destroyed() {
            return;
        }
        if window == self.contexts.owner() {
            debug!("{}: owner destroyed", window);
            self.commit_as_is();
            self.contexts.release_all(&mut self.native);
            self.ledger.clear();
            self.surrounding.invalidate();
            self.deferred.clear();
            self.pending_reset = false;
            self.maybe_in_dead_key_sequence = false;
            return;
        }
        if self.composition.window() == Some(window) {
            debug!("{}: destroyed while composing", window);
            self.commit_as_is();
        }
        if self.contexts.last_focused() == Some(window) {
            self.blur_native();
            self.contexts.set_last_focused(None);
        }
    }

    /// Focus moved inside the host. Losing it keeps the native focus so that
    /// a following focus on the same window is cheap.
    pub fn on_focus_change_in_host(&mut self, focused: bool) {
        if self.contexts.is_destroyed() {
            return;
        }
        self.surrounding.invalidate();
        self.cursor_position_stale = true;
        if focused {
            match self.contexts.focus() {
                ImeFocusState::Blurred => {
                    trace!("host focus inside a blurred window");
                }
                ImeFocusState::BlurredWithoutFocusChange | ImeFocusState::Focused => {
                    self.contexts.set_focus(ImeFocusState::Focused);
                    if let Some(current) = self.contexts.current() {
                        self.push_input_purpose(current);
                    }
                }
            }
            return;
        }
        if !self.contexts.is_focused() {
            return;
        }
        if let Some(active) = self.contexts.active() {
            self.finalize_for_blur(active);
        }
        self.contexts.set_focus(ImeFocusState::BlurredWithoutFocusChange);
    }

    /// The focused editor changed its enabled state, purpose or hints.
    pub fn set_input_context(&mut self, window: WindowId, context: InputContext) {
        if self.contexts.is_destroyed() {
            return;
        }
        if self.contexts.last_focused().is_some_and(|w| w != window) {
            debug!("{}: input context from an unfocused window, ignored", window);
            return;
        }
        if self.composition.is_composing() && self.contexts.switches_context(&context) {
            debug!("{}: deferring the context switch until the composition ends", window);
            self.contexts.defer_input_context(context);
            return;
        }
        self.apply_input_context(context);
    }

    /// Cached purpose and hints are re-sent on the next focus.
    pub fn on_theme_changed(&mut self) {
        if self.contexts.is_destroyed() {
            return;
        }
        debug!("theme changed, input purpose will be sent again");
        self.contexts.mark_purpose_stale();
    }

    /// Application-level reset: commit the composition as is and drop
    /// whatever the input method still holds.
    pub fn reset_ime(&mut self) {
        if self.contexts.is_destroyed() {
            return;
        }
        let Some(active) = self.contexts.active() else {
            return;
        };
        self.commit_as_is();
        self.maybe_in_dead_key_sequence = false;
        self.pending_reset = false;
        self.reset_native(active);
    }

    /// The host re-laid out the editor; the candidate window may need to
    /// move.
    pub fn on_layout_change(&mut self) {
        if self.contexts.is_destroyed() {
            return;
        }
        match self.composition.context() {
            Some(handle) => self.update_cursor_location(handle),
            None => self.cursor_position_stale = true,
        }
    }

    pub(super) fn apply_input_context(&mut self, context: InputContext) {
        let old = self.contexts.current();
        let previous = self.contexts.replace_input_context(context);
        let new = self.contexts.current();
        debug!(
            "input context {:?} -> {:?} ({:?} -> {:?})",
            previous.enabled, context.enabled, old, new
        );
        if !self.contexts.is_focused() {
            return;
        }
        if old != new {
            if let Some(old) = old {
                self.reset_native(old);
                self.native.focus_out(old);
            }
            if let Some(new) = new {
                self.native.focus_in(new);
            }
        }
        if let Some(new) = new {
            self.push_input_purpose(new);
        }
    }

    fn focus_native(&mut self, same_window: bool) {
        let Some(current) = self.contexts.current() else {
            return;
        };
        match self.contexts.focus() {
            ImeFocusState::Focused if same_window => return,
            ImeFocusState::BlurredWithoutFocusChange if same_window => {
                trace!("{}: focus without a native focus change", current);
            }
            _ => self.native.focus_in(current),
        }
        self.contexts.set_focus(ImeFocusState::Focused);
        self.push_input_purpose(current);
        self.cursor_position_stale = true;
    }

    fn blur_native(&mut self) {
        if self.contexts.focus() == ImeFocusState::Blurred {
            return;
        }
        // Presses the input method has not answered yet will not be
        // answered to us.
        if !self.ledger.is_empty() {
            trace!("dropping {} unanswered press(es) on blur", self.ledger.len());
            self.ledger.clear();
        }
        let Some(active) = self.contexts.active() else {
            self.contexts.set_focus(ImeFocusState::Blurred);
            return;
        };
        self.finalize_for_blur(active);
        self.native.focus_out(active);
        self.contexts.set_focus(ImeFocusState::Blurred);
    }

    /// Commit a dispatched composition with its current content and drop
    /// anything the input method has not shown yet. Inside a dead-key
    /// sequence the accent is not committed and the input method keeps it.
    fn finalize_for_blur(&mut self, active: NativeHandle) {
        if self.maybe_in_dead_key_sequence {
            debug!("{}: blur inside a dead-key sequence", active);
            if self.composition.is_composing() {
                self.emit_commit(Some(""));
                self.maybe_in_dead_key_sequence = true;
            }
            return;
        }
        self.commit_as_is();
        self.reset_native(active);
    }

    fn push_input_purpose(&mut self, handle: NativeHandle) {
        if !self.contexts.purpose_stale() {
            return;
        }
        let context = self.contexts.input_context();
        trace!("{}: purpose {:?} hints {:?}", handle, context.purpose, context.hints);
        self.native.set_input_purpose(handle, context.purpose, context.hints);
        self.contexts.clear_purpose_stale();
    }
}
