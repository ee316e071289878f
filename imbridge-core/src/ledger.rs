//! Key event ledger
//!
//! Input methods that handle key events asynchronously swallow a key press,
//! talk to their daemon, and later either emit composition signals or post
//! the very same key event back to us. Neither path carries a reference to
//! the original event, so the ledger keeps value copies of the presses we
//! have handed to the input method and matches later events against them.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::keycode::{KeyEventKind, Keysym, ModifierState, NativeKeyEvent};

/// Immutable snapshot of a key event handed to the input method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingKeyEvent {
    pub time: u32,
    pub kind: KeyEventKind,
    pub keysym: Keysym,
    pub hardware_keycode: u16,
    pub state: ModifierState,
}

impl PendingKeyEvent {
    /// Whether `event` is (a re-delivery of, or the release answering) this entry.
    ///
    /// Only the time, the keysym and the masked modifier bits are compared:
    /// input methods flip private state bits on events they re-post.
    pub fn matches(&self, event: &NativeKeyEvent) -> bool {
        self.time == event.time
            && self.keysym == event.keysym
            && self.state.masked() == event.state.masked()
    }
}

impl From<&NativeKeyEvent> for PendingKeyEvent {
    fn from(event: &NativeKeyEvent) -> Self {
        Self {
            time: event.time,
            kind: event.kind,
            keysym: event.keysym,
            hardware_keycode: event.hardware_keycode,
            state: event.state,
        }
    }
}

/// Ordered queue of key presses the input method has not acknowledged yet.
///
/// There is no size cap: every backend we know of acknowledges in order, so
/// the queue stays a few entries long. An input method that never answers
/// would grow it without bound.
#[derive(Debug, Clone, Default)]
pub struct KeyEventLedger {
    events: VecDeque<PendingKeyEvent>,
}

impl KeyEventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observed key press to the tail.
    pub fn record_press(&mut self, event: &NativeKeyEvent) {
        if !event.is_press() {
            warn!(
                "ledger: refusing to record a {:?} event (keysym={})",
                event.kind, event.keysym
            );
            return;
        }
        if let Some(last) = self.events.back()
            && last.time > event.time
        {
            // Native times wrap and some toolkits synthesize events with
            // time 0. Identity matching still works, ordering is by arrival.
            trace!(
                "ledger: non-monotonic time {} after {}",
                event.time, last.time
            );
        }
        self.events.push_back(PendingKeyEvent::from(event));
        trace!("ledger: recorded press, len={}", self.events.len());
    }

    /// Index of the first pending press matching `event`.
    pub fn position(&self, event: &NativeKeyEvent) -> Option<usize> {
        self.events
            .iter()
            .position(|pending| pending.kind == KeyEventKind::Press && pending.matches(event))
    }

    /// The first pending press matching `event`, scanning from the head.
    ///
    /// `None` is a normal outcome, e.g. for events that were sent before
    /// the bridge attached to the input method.
    pub fn find_match(&self, event: &NativeKeyEvent) -> Option<PendingKeyEvent> {
        self.position(event).map(|index| self.events[index].clone())
    }

    /// Remove the entry matching `event` and every older entry.
    ///
    /// Older unmatched presses are presumed dropped by the input method.
    pub fn remove_through_match(&mut self, event: &NativeKeyEvent) -> Option<PendingKeyEvent> {
        let index = self.position(event)?;
        if index > 0 {
            trace!("ledger: discarding {} stale press(es)", index);
        }
        let mut removed = self.events.drain(..=index);
        removed.next_back()
    }

    /// The oldest pending press sent by the same physical key as `release`.
    pub fn corresponding_press(&self, release: &NativeKeyEvent) -> Option<&PendingKeyEvent> {
        debug_assert_eq!(release.kind, KeyEventKind::Release);
        self.events.iter().find(|pending| {
            pending.kind == KeyEventKind::Press
                && pending.hardware_keycode == release.hardware_keycode
        })
    }

    /// Oldest pending press.
    pub fn first(&self) -> Option<&PendingKeyEvent> {
        self.events.front()
    }

    /// Drop and return the oldest pending press.
    pub fn remove_first(&mut self) -> Option<PendingKeyEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingKeyEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(time: u32, ch: char) -> NativeKeyEvent {
        NativeKeyEvent::press(time, Keysym::from_char(ch))
    }

    #[test]
    fn test_record_appends_in_arrival_order() {
        let mut ledger = KeyEventLedger::new();
        ledger.record_press(&press(1, 'a'));
        ledger.record_press(&press(2, 'b'));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.first().unwrap().time, 1);
    }

    #[test]
    fn test_release_is_not_recorded() {
        let mut ledger = KeyEventLedger::new();
        ledger.record_press(&NativeKeyEvent::release(1, Keysym::from_char('a')));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_remove_through_match_flushes_older() {
        let mut ledger = KeyEventLedger::new();
        ledger.record_press(&press(1, 'a'));
        ledger.record_press(&press(2, 'b'));
        ledger.record_press(&press(3, 'c'));

        let removed = ledger.remove_through_match(&press(2, 'b')).unwrap();
        assert_eq!(removed.keysym, Keysym::from_char('b'));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.first().unwrap().time, 3);
    }

    #[test]
    fn test_remove_without_match_keeps_everything() {
        let mut ledger = KeyEventLedger::new();
        ledger.record_press(&press(1, 'a'));
        assert!(ledger.remove_through_match(&press(9, 'z')).is_none());
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_corresponding_press_by_hardware_keycode() {
        let mut ledger = KeyEventLedger::new();
        ledger.record_press(&press(1, 'a').with_hardware_keycode(38));
        ledger.record_press(&press(2, 's').with_hardware_keycode(39));

        let release = NativeKeyEvent::release(5, Keysym::from_char('s')).with_hardware_keycode(39);
        assert_eq!(ledger.corresponding_press(&release).unwrap().time, 2);

        let other = NativeKeyEvent::release(6, Keysym::from_char('d')).with_hardware_keycode(40);
        assert!(ledger.corresponding_press(&other).is_none());
    }
}
