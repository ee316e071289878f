//! Composition lifecycle: native preedit signals in, host composition
//! events out

use tracing::{debug, trace, warn};

use super::{CompositionBridge, FollowingEvent};
use crate::core::host::HostEditor;
use crate::core::native::{NativeHandle, NativeInputMethod};
use crate::core::preedit::PreeditString;

impl<H: HostEditor, N: NativeInputMethod> CompositionBridge<H, N> {
    pub(super) fn start_signal(&mut self, handle: NativeHandle) -> bool {
        if !self.accepts_signal(handle, "preedit-start") {
            return false;
        }
        if self.composition.is_composing() {
            debug!("{}: preedit-start while composing, ignored", handle);
            return true;
        }
        self.dispatch_composition_start(handle)
    }

    pub(super) fn change_signal(&mut self, handle: NativeHandle, preedit: Option<PreeditString>) -> bool {
        if !self.accepts_signal(handle, "preedit-changed") {
            return false;
        }
        let preedit = preedit.unwrap_or_else(|| self.native.preedit(handle));
        if !self.composition.is_composing() {
            if preedit.is_empty() {
                trace!("{}: empty preedit while not composing", handle);
                return true;
            }
            self.note_violation(format_args!(
                "preedit-changed from {} without preedit-start",
                handle
            ));
            return false;
        }
        self.dispatch_composition_update(handle, &preedit)
    }

    pub(super) fn end_signal(&mut self, handle: NativeHandle) -> bool {
        if !self.accepts_signal(handle, "preedit-end") {
            return false;
        }
        if !self.composition.is_composing() {
            trace!("{}: preedit-end while not composing", handle);
            return true;
        }
        self.dispatch_composition_commit(handle, None)
    }

    pub(super) fn commit_signal(&mut self, handle: NativeHandle, text: Option<String>) -> bool {
        if !self.accepts_signal(handle, "commit") {
            return false;
        }
        if self.commits_typed_char(handle, text.as_deref()) {
            debug!(
                "{}: commit {:?} is what the key types, falling back to the key event",
                handle, text
            );
            self.key.fallback_to_key_event = true;
            return true;
        }
        self.dispatch_composition_commit(handle, text.as_deref())
    }

    /// The current context commits, outside a composition, exactly the
    /// character of the key being filtered.
    fn commits_typed_char(&self, handle: NativeHandle, text: Option<&str>) -> bool {
        if self.composition.is_composing()
            || self.contexts.current() != Some(handle)
            || self.key.keyboard_event_dispatched
        {
            return false;
        }
        let (Some(event), Some(text)) = (&self.key.processing, text) else {
            return false;
        };
        let mut chars = text.chars();
        match (event.to_char(), chars.next(), chars.next()) {
            (Some(typed), Some(committed), None) => typed == committed,
            _ => false,
        }
    }

    /// NotComposing to StartDispatched.
    pub(super) fn dispatch_composition_start(&mut self, handle: NativeHandle) -> bool {
        if self.composition.is_composing() {
            debug!("{}: composition already started", handle);
            return true;
        }
        let Some(window) = self.contexts.last_focused() else {
            warn!("{}: no focused window, composition not started", handle);
            return false;
        };

        // The input method must never see text from before this composition.
        self.surrounding.invalidate();
        let host = &mut self.host;
        if !self
            .surrounding
            .ensure_cached(|| host.query_selection(window), None)
        {
            warn!("{}: no selection, composition not started", window);
            return false;
        }
        let start = self.surrounding.snapshot().map_or(0, |s| s.caret);

        if !self.maybe_dispatch_processed_key(FollowingEvent::CompositionStart) {
            return false;
        }

        self.composition.begin(handle, Some(window), start);
        self.contexts.set_composing(Some(handle));
        debug!("{}: composition start at {}", window, start);
        let outcome = self.host.dispatch_composition_start();
        if !outcome.widget_still_valid {
            warn!("{}: widget lost while starting a composition", window);
            self.composition.finish();
            self.contexts.set_composing(None);
            return false;
        }
        true
    }

    /// StartDispatched or ChangeDispatched to ChangeDispatched.
    pub(super) fn dispatch_composition_update(
        &mut self,
        handle: NativeHandle,
        preedit: &PreeditString,
    ) -> bool {
        if !self.composition.is_composing() {
            self.note_violation(format_args!("update for {} without a composition", handle));
            return false;
        }
        if !self.maybe_dispatch_processed_key(FollowingEvent::CompositionUpdate) {
            return false;
        }

        let ranges = preedit.to_ranges();
        debug_assert!(ranges.is_well_formed(), "malformed ranges {:?}", ranges);
        trace!(
            "{}: composition update {:?} caret={:?} target={:?}",
            handle,
            preedit.text(),
            ranges.caret(),
            ranges.target()
        );
        self.composition.update(preedit.text(), ranges);
        let outcome = self
            .host
            .dispatch_composition_update(self.composition.dispatched(), self.composition.ranges());
        if !outcome.widget_still_valid {
            warn!("{}: widget lost while updating the composition", handle);
            return false;
        }
        self.update_cursor_location(handle);
        true
    }

    /// Commit the composition, or start one for `text` and commit it right
    /// away. `None` commits the last dispatched string.
    pub(super) fn dispatch_composition_commit(&mut self, handle: NativeHandle, text: Option<&str>) -> bool {
        if !self.composition.is_composing() {
            let Some(text) = text.filter(|t| !t.is_empty()) else {
                trace!("{}: nothing to commit", handle);
                return true;
            };
            if !self.maybe_dispatch_processed_key(FollowingEvent::CompositionCommit) {
                return false;
            }
            if !self.dispatch_composition_start(handle) {
                return false;
            }
            return self.emit_commit(Some(text));
        }
        if !self.maybe_dispatch_processed_key(FollowingEvent::CompositionCommit) {
            return false;
        }
        self.emit_commit(text)
    }

    /// Finalize the composition with its last dispatched string, without a
    /// guarding key event.
    pub(super) fn commit_as_is(&mut self) -> bool {
        if !self.composition.is_composing() {
            return true;
        }
        debug!("committing {:?} as is", self.composition.dispatched());
        self.emit_commit(None)
    }

    /// StartDispatched or ChangeDispatched to NotComposing.
    pub(super) fn emit_commit(&mut self, text: Option<&str>) -> bool {
        debug_assert!(
            self.composition.is_composing(),
            "commit dispatched without a composition start"
        );
        if !self.composition.is_composing() {
            return false;
        }
        let dispatched = self.composition.finish();
        let committed = text.map_or(dispatched, str::to_owned);
        self.contexts.set_composing(None);
        self.maybe_in_dead_key_sequence = false;
        debug!("composition commit {:?}", committed);
        let outcome = self.host.dispatch_composition_commit(&committed);
        // The document changed under the snapshot.
        self.surrounding.invalidate();
        if !outcome.widget_still_valid {
            warn!("widget lost while committing the composition");
            return false;
        }
        self.after_composition_end();
        true
    }

    fn after_composition_end(&mut self) {
        if self.contexts.is_destroyed() {
            return;
        }
        if let Some(context) = self.contexts.take_pending_input_context() {
            debug!("applying input context deferred by the composition");
            self.apply_input_context(context);
        }
        if std::mem::take(&mut self.pending_reset)
            && let Some(active) = self.contexts.active()
        {
            debug!("{}: pending reset after commit", active);
            self.reset_native(active);
        }
    }

    /// Forward the caret rectangle of the composition target (or the caret
    /// outside a composition) for the candidate window.
    pub(super) fn update_cursor_location(&mut self, handle: NativeHandle) {
        let Some(window) = self.contexts.last_focused() else {
            return;
        };
        let offset = if self.composition.is_composing() {
            let target = self.composition.ranges().target().map_or(0, |(offset, _)| offset);
            self.composition.start() + target
        } else if let Some(snapshot) = self.surrounding.snapshot() {
            snapshot.caret
        } else {
            trace!("{}: caret unknown, candidate window not moved", window);
            return;
        };
        if let Some(rect) = self.host.caret_rect(window, offset) {
            self.native.set_cursor_location(handle, rect);
        }
    }
}
