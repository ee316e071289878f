//! Surrounding text requests and selection changes

use tracing::{debug, trace, warn};

use super::CompositionBridge;
use crate::core::context::WindowId;
use crate::core::host::{HostEditor, SelectionChange};
use crate::core::native::{NativeHandle, NativeInputMethod};
use crate::core::preedit::PreeditString;

impl<H: HostEditor, N: NativeInputMethod> CompositionBridge<H, N> {
    /// The host's selection or text changed.
    pub fn on_selection_change(&mut self, window: WindowId, change: SelectionChange) {
        if self.contexts.is_destroyed() {
            return;
        }
        if self.contexts.last_focused() != Some(window) {
            trace!("{}: selection change in an unfocused window", window);
            return;
        }
        let self_caused = change.caused_by_composition || self.deleting_surrounding;
        let dropped = self.surrounding.invalidate_on_external_change(self_caused);
        if self_caused {
            return;
        }
        trace!("{}: external selection change (snapshot dropped: {})", window, dropped);

        if self.composition.is_composing() {
            if !change.occurred_during_composition {
                debug!("{}: selection moved before the composition, resetting after commit", window);
                self.pending_reset = true;
            }
            return;
        }
        if self.maybe_in_dead_key_sequence {
            debug!("{}: selection change inside a dead-key sequence, not resetting", window);
            return;
        }
        if !self.contexts.is_focused() {
            return;
        }
        if let Some(active) = self.contexts.active() {
            self.reset_native(active);
        }
    }

    /// Start and length of the composition string in the host text.
    fn composition_extent(&self) -> Option<(usize, usize)> {
        self.composition
            .is_composing()
            .then(|| (self.composition.start(), self.composition.dispatched_len()))
    }

    pub(super) fn retrieve_surrounding_signal(&mut self, handle: NativeHandle) -> bool {
        if !self.accepts_signal(handle, "retrieve-surrounding") {
            return false;
        }
        let Some(window) = self.contexts.last_focused() else {
            return false;
        };
        let composition = self.composition_extent();
        let host = &mut self.host;
        if !self
            .surrounding
            .ensure_cached(|| host.query_selection(window), composition)
        {
            return false;
        }
        let Some(text) = self.surrounding.without_composition() else {
            return false;
        };
        let served = text.paragraph(self.config.max_paragraph_chars);
        trace!(
            "{}: surrounding {} chars, caret {}",
            handle,
            served.len(),
            served.caret
        );
        self.native
            .set_surrounding(handle, &served.text, served.caret_byte());
        true
    }

    /// Delete `n_chars` characters at `offset` from the input method's
    /// cursor. While composing, the composition is removed first and
    /// started again afterwards.
    pub(super) fn delete_surrounding_signal(
        &mut self,
        handle: NativeHandle,
        offset: i32,
        n_chars: u32,
    ) -> bool {
        if !self.accepts_signal(handle, "delete-surrounding") {
            return false;
        }
        let Some(text) = self.surrounding.without_composition() else {
            debug!("{}: delete-surrounding without a cached selection", handle);
            return false;
        };

        let was_composing = self.composition.is_composing();
        let cursor = if was_composing {
            self.composition.start()
        } else {
            text.caret
        };
        let start = cursor as i64 + i64::from(offset);
        let end = start + i64::from(n_chars);
        if start < 0 || end > text.len() as i64 {
            warn!(
                "{}: delete-surrounding out of range (offset={}, n_chars={}, cursor={}, len={})",
                handle,
                offset,
                n_chars,
                cursor,
                text.len()
            );
            return false;
        }
        if n_chars == 0 {
            return true;
        }
        let (start, end) = (start as usize, end as usize);

        let mut restart = None;
        if was_composing {
            let dispatched = self.composition.dispatched().to_string();
            let preedit = self.native.preedit(handle);
            restart = Some(if preedit.is_empty() {
                PreeditString::with_text(dispatched)
            } else {
                preedit
            });
            // Take the composition string out of the document so the
            // offsets above apply as they are.
            if !self.emit_commit(Some("")) {
                return false;
            }
        }

        debug!("{}: deleting {} char(s) at {}", handle, end - start, start);
        self.deleting_surrounding = true;
        let outcome = self.host.delete_content(start, end - start);
        self.deleting_surrounding = false;
        self.surrounding.invalidate();
        if !outcome.widget_still_valid {
            warn!("{}: widget lost while deleting surrounding text", handle);
            return false;
        }

        match restart {
            Some(preedit) if !preedit.is_empty() => {
                debug!("{}: restarting the composition with {:?}", handle, preedit.text());
                self.dispatch_composition_start(handle)
                    && self.dispatch_composition_update(handle, &preedit)
            }
            _ => true,
        }
    }
}
