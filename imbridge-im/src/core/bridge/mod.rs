//! Composition bridge
//!
//! Translates the signals of native input method contexts into an ordered
//! stream of composition events for one host top-level window, and raw key
//! events into "handled by the IME or not" decisions.
//!
//! Everything runs on one thread. The host may do anything while handling a
//! dispatched event, so every dispatch is followed by a validity check, and
//! native signals that arrive while another signal is being handled are
//! queued and handled after it.

mod composition;
mod focus;
mod key;
mod surrounding;
mod types;

pub use types::*;

#[cfg(test)]
mod tests;

use std::fmt;

use imbridge_core::{BackendId, BackendQuirks, KeyEventLedger, detect_backend};
use tracing::{debug, trace, warn};

use super::context::{ContextRegistry, WindowId};
use super::host::HostEditor;
use super::native::{ContextKind, NativeHandle, NativeInputMethod, NativeSignal, SignalQueue};
use super::state::{Composition, CompositionState};
use super::surrounding::SurroundingTextCache;

/// The bridge between one window's native input method contexts and its
/// host editor.
pub struct CompositionBridge<H: HostEditor, N: NativeInputMethod> {
    host: H,
    native: N,
    contexts: ContextRegistry,
    /// Chosen once, when the primary context is created
    quirks: Box<dyn BackendQuirks>,
    /// Key presses an asynchronous input method has not answered yet
    ledger: KeyEventLedger,
    surrounding: SurroundingTextCache,
    composition: Composition,
    key: KeyTick,
    config: BridgeConfig,
    /// Signals that arrived while another signal was being handled
    deferred: SignalQueue,
    in_native_signal: bool,
    deleting_surrounding: bool,
    /// Reset the input method once the composition ends
    pending_reset: bool,
    maybe_in_dead_key_sequence: bool,
    /// Push the caret rectangle before the next key press
    cursor_position_stale: bool,
    protocol_violations: usize,
}

impl<H: HostEditor, N: NativeInputMethod> CompositionBridge<H, N> {
    /// Create a bridge for `owner`, detecting the backend from the process
    /// environment.
    pub fn new(owner: WindowId, host: H, native: N, config: BridgeConfig) -> Self {
        Self::with_env(owner, host, native, config, &|name| std::env::var(name).ok())
    }

    /// Create a bridge with an explicit environment lookup for backend
    /// detection.
    pub fn with_env(
        owner: WindowId,
        host: H,
        mut native: N,
        config: BridgeConfig,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Self {
        let contexts = ContextRegistry::create(
            owner,
            &mut native,
            config.use_simple_context_on_password_field,
        );
        let module_id = contexts
            .handle(ContextKind::Primary)
            .map(|handle| native.module_id(handle))
            .unwrap_or_default();
        let quirks = detect_backend(&module_id, env, config.detect);
        debug!("{}: bridge created, backend {}", owner, quirks.id());
        Self {
            host,
            native,
            contexts,
            quirks,
            ledger: KeyEventLedger::new(),
            surrounding: SurroundingTextCache::new(),
            composition: Composition::default(),
            key: KeyTick::default(),
            config,
            deferred: SignalQueue::new(),
            in_native_signal: false,
            deleting_surrounding: false,
            pending_reset: false,
            maybe_in_dead_key_sequence: false,
            cursor_position_stale: true,
            protocol_violations: 0,
        }
    }

    pub fn owner(&self) -> WindowId {
        self.contexts.owner()
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn native(&self) -> &N {
        &self.native
    }

    pub fn native_mut(&mut self) -> &mut N {
        &mut self.native
    }

    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    pub fn backend(&self) -> BackendId {
        self.quirks.id()
    }

    pub fn composition_state(&self) -> CompositionState {
        self.composition.state()
    }

    pub fn is_composing(&self) -> bool {
        self.composition.is_composing()
    }

    /// Last composition string sent to the host
    pub fn dispatched_string(&self) -> &str {
        self.composition.dispatched()
    }

    pub fn ledger(&self) -> &KeyEventLedger {
        &self.ledger
    }

    pub fn surrounding_cache(&self) -> &SurroundingTextCache {
        &self.surrounding
    }

    pub fn last_focused_window(&self) -> Option<WindowId> {
        self.contexts.last_focused()
    }

    pub fn is_destroyed(&self) -> bool {
        self.contexts.is_destroyed()
    }

    pub fn maybe_in_dead_key_sequence(&self) -> bool {
        self.maybe_in_dead_key_sequence
    }

    pub fn has_pending_reset(&self) -> bool {
        self.pending_reset
    }

    /// Number of signals ignored as input method protocol violations
    pub fn protocol_violations(&self) -> usize {
        self.protocol_violations
    }

    pub fn on_native_start_composition(&mut self, handle: NativeHandle) {
        self.deliver(handle, NativeSignal::PreeditStart);
    }

    pub fn on_native_change_composition(&mut self, handle: NativeHandle) {
        self.deliver(handle, NativeSignal::changed());
    }

    pub fn on_native_end_composition(&mut self, handle: NativeHandle) {
        self.deliver(handle, NativeSignal::PreeditEnd);
    }

    /// `text: None` commits the last dispatched string.
    pub fn on_native_commit_composition(&mut self, handle: NativeHandle, text: Option<&str>) {
        self.deliver(
            handle,
            NativeSignal::Commit {
                text: text.map(str::to_owned),
            },
        );
    }

    pub fn on_native_retrieve_surrounding(&mut self, handle: NativeHandle) -> bool {
        self.deliver(handle, NativeSignal::RetrieveSurrounding)
    }

    pub fn on_native_delete_surrounding(
        &mut self,
        handle: NativeHandle,
        offset: i32,
        n_chars: u32,
    ) -> bool {
        self.deliver(handle, NativeSignal::DeleteSurrounding { offset, n_chars })
    }

    /// Handle one native signal as its own tick.
    pub fn on_native_signal(&mut self, handle: NativeHandle, signal: NativeSignal) -> bool {
        self.deliver(handle, signal)
    }

    /// Handle signals the input method emitted for one raw key, as one tick.
    pub fn on_native_signals(&mut self, mut signals: SignalQueue) {
        self.begin_signal_tick();
        while let Some((handle, signal)) = signals.pop() {
            self.deliver_in_tick(handle, signal);
        }
    }

    fn begin_signal_tick(&mut self) {
        if !self.in_native_signal && self.key.processing.is_none() {
            self.key = KeyTick::default();
        }
    }

    fn deliver(&mut self, handle: NativeHandle, signal: NativeSignal) -> bool {
        self.begin_signal_tick();
        self.deliver_in_tick(handle, signal)
    }

    fn deliver_in_tick(&mut self, handle: NativeHandle, signal: NativeSignal) -> bool {
        if self.in_native_signal {
            trace!("deferring {:?} from {}", signal, handle);
            self.deferred.push(handle, signal);
            return false;
        }
        self.in_native_signal = true;
        let handled = self.handle_signal(handle, signal);
        while let Some((handle, signal)) = self.deferred.pop() {
            self.handle_signal(handle, signal);
        }
        self.in_native_signal = false;
        handled
    }

    fn handle_signal(&mut self, handle: NativeHandle, signal: NativeSignal) -> bool {
        trace!("{}: {:?}", handle, signal);
        match signal {
            NativeSignal::PreeditStart => self.start_signal(handle),
            NativeSignal::PreeditChanged { preedit } => self.change_signal(handle, preedit),
            NativeSignal::PreeditEnd => self.end_signal(handle),
            NativeSignal::Commit { text } => self.commit_signal(handle, text),
            NativeSignal::RetrieveSurrounding => self.retrieve_surrounding_signal(handle),
            NativeSignal::DeleteSurrounding { offset, n_chars } => {
                self.delete_surrounding_signal(handle, offset, n_chars)
            }
        }
    }

    /// Handle signals the input method emitted synchronously.
    fn absorb(&mut self, mut signals: SignalQueue) {
        while let Some((handle, signal)) = signals.pop() {
            self.deliver_in_tick(handle, signal);
        }
    }

    /// Whether a signal from `handle` may act on the composition.
    fn accepts_signal(&mut self, handle: NativeHandle, what: &str) -> bool {
        if self.contexts.is_destroyed() {
            trace!("{} from {} after teardown", what, handle);
            return false;
        }
        if !self.contexts.owns(handle) {
            self.note_violation(format_args!("{} from foreign context {}", what, handle));
            return false;
        }
        let active = self.contexts.active();
        if active != Some(handle) {
            self.note_violation(format_args!(
                "{} from {}, but {:?} is active",
                what, handle, active
            ));
            return false;
        }
        true
    }

    fn note_violation(&mut self, what: fmt::Arguments<'_>) {
        self.protocol_violations += 1;
        warn!("input method protocol violation: {}", what);
    }

    /// Reset a native context. Anything the input method emits while
    /// resetting is dropped: the bridge has already finalized the
    /// composition it would be about.
    fn reset_native(&mut self, handle: NativeHandle) {
        let mut signals = SignalQueue::new();
        self.native.reset(handle, &mut signals);
        if !signals.is_empty() {
            debug!(
                "{}: dropping {} signal(s) emitted during reset",
                handle,
                signals.len()
            );
        }
    }
}

impl<H: HostEditor + fmt::Debug, N: NativeInputMethod + fmt::Debug> fmt::Debug
    for CompositionBridge<H, N>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositionBridge")
            .field("owner", &self.contexts.owner())
            .field("backend", &self.quirks.id())
            .field("state", &self.composition.state())
            .field("ledger", &self.ledger.len())
            .field("host", &self.host)
            .field("native", &self.native)
            .finish()
    }
}
