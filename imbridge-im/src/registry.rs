//! Callback routing
//!
//! Native callbacks only carry the context that fired them. The registry
//! maps context handles to the bridge that owns them, tracks which bridge
//! has focus, and queues callbacks that arrive while their bridge is busy
//! (the host reacting to a dispatched event by poking the toolkit again).

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use imbridge_core::NativeKeyEvent;
use tracing::{debug, trace, warn};

use crate::core::bridge::{CompositionBridge, KeyHandlingState};
use crate::core::context::WindowId;
use crate::core::host::{HostEditor, SelectionChange};
use crate::core::native::{NativeHandle, NativeInputMethod, NativeSignal};

/// A bridge shared between the registry and its window
pub type SharedBridge<H, N> = Rc<RefCell<CompositionBridge<H, N>>>;

/// A callback that reached a bridge while it was busy
#[derive(Debug)]
enum Deferred {
    Signal(NativeHandle, NativeSignal),
    SelectionChange {
        owner: WindowId,
        window: WindowId,
        change: SelectionChange,
    },
    Focus {
        owner: WindowId,
        window: WindowId,
    },
    Blur {
        owner: WindowId,
        window: WindowId,
    },
    /// Focus moved to another bridge
    Unfocus {
        owner: WindowId,
    },
    Destroy {
        owner: WindowId,
        window: WindowId,
    },
    ThemeChanged {
        owner: WindowId,
    },
}

/// Routes native callbacks to bridges.
pub struct BridgeRegistry<H: HostEditor, N: NativeInputMethod> {
    by_handle: RefCell<HashMap<NativeHandle, Weak<RefCell<CompositionBridge<H, N>>>>>,
    by_owner: RefCell<HashMap<WindowId, SharedBridge<H, N>>>,
    /// Owner of the bridge that has focus
    last_focused: Cell<Option<WindowId>>,
    deferred: RefCell<VecDeque<Deferred>>,
}

impl<H: HostEditor, N: NativeInputMethod> Default for BridgeRegistry<H, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HostEditor, N: NativeInputMethod> BridgeRegistry<H, N> {
    pub fn new() -> Self {
        Self {
            by_handle: RefCell::new(HashMap::new()),
            by_owner: RefCell::new(HashMap::new()),
            last_focused: Cell::new(None),
            deferred: RefCell::new(VecDeque::new()),
        }
    }

    /// Wrap and register a bridge. Returns the shared handle.
    pub fn insert(&self, bridge: CompositionBridge<H, N>) -> SharedBridge<H, N> {
        let shared = Rc::new(RefCell::new(bridge));
        self.register(&shared);
        shared
    }

    pub fn register(&self, bridge: &SharedBridge<H, N>) {
        let inner = bridge.borrow();
        let owner = inner.owner();
        let mut by_handle = self.by_handle.borrow_mut();
        for handle in inner.contexts().handles() {
            by_handle.insert(handle, Rc::downgrade(bridge));
        }
        self.by_owner.borrow_mut().insert(owner, Rc::clone(bridge));
        debug!("registry: registered {}", owner);
    }

    pub fn unregister(&self, owner: WindowId) -> Option<SharedBridge<H, N>> {
        let bridge = self.by_owner.borrow_mut().remove(&owner)?;
        self.by_handle
            .borrow_mut()
            .retain(|_, weak| weak.upgrade().is_some_and(|b| !Rc::ptr_eq(&b, &bridge)));
        if self.last_focused.get() == Some(owner) {
            self.last_focused.set(None);
        }
        debug!("registry: unregistered {}", owner);
        Some(bridge)
    }

    pub fn bridge(&self, owner: WindowId) -> Option<SharedBridge<H, N>> {
        self.by_owner.borrow().get(&owner).cloned()
    }

    /// The bridge owning a native context
    pub fn route(&self, handle: NativeHandle) -> Option<SharedBridge<H, N>> {
        self.by_handle.borrow().get(&handle).and_then(Weak::upgrade)
    }

    pub fn last_focused(&self) -> Option<WindowId> {
        self.last_focused.get()
    }

    pub fn len(&self) -> usize {
        self.by_owner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_owner.borrow().is_empty()
    }

    /// Focus `window` of the bridge owned by `owner`, blurring the bridge
    /// that had focus before.
    pub fn focus_window(&self, owner: WindowId, window: WindowId) {
        if let Some(previous) = self.last_focused.get().filter(|&prev| prev != owner) {
            self.call_or_defer(Deferred::Unfocus { owner: previous });
        }
        self.last_focused.set(Some(owner));
        self.call_or_defer(Deferred::Focus { owner, window });
    }

    pub fn blur_window(&self, owner: WindowId, window: WindowId) {
        self.call_or_defer(Deferred::Blur { owner, window });
    }

    /// Destroying the owner window also unregisters its bridge, once the
    /// bridge has committed and released its contexts.
    pub fn destroy_window(&self, owner: WindowId, window: WindowId) {
        self.call_or_defer(Deferred::Destroy { owner, window });
    }

    /// Key events need an answer now, so a busy bridge does not filter
    /// them.
    pub fn key_event(
        &self,
        owner: WindowId,
        window: WindowId,
        event: &NativeKeyEvent,
        already_dispatched: bool,
    ) -> KeyHandlingState {
        self.with_bridge(owner, |bridge| bridge.on_key_event(window, event, already_dispatched))
            .unwrap_or(KeyHandlingState::NotHandled)
    }

    /// Deliver a native signal. Signals for a busy bridge are queued and
    /// handled when the outer call returns; they report false.
    pub fn native_signal(&self, handle: NativeHandle, signal: NativeSignal) -> bool {
        self.call_or_defer(Deferred::Signal(handle, signal))
            .unwrap_or(false)
    }

    /// A selection change reported while the bridge is busy was caused by
    /// the bridge's own dispatch.
    pub fn selection_change(&self, owner: WindowId, window: WindowId, change: SelectionChange) {
        self.call_or_defer(Deferred::SelectionChange {
            owner,
            window,
            change,
        });
    }

    pub fn theme_changed(&self) {
        let owners: Vec<_> = self.by_owner.borrow().keys().copied().collect();
        for owner in owners {
            self.call_or_defer(Deferred::ThemeChanged { owner });
        }
    }

    /// Number of queued callbacks
    pub fn deferred_len(&self) -> usize {
        self.deferred.borrow().len()
    }

    fn with_bridge<R>(
        &self,
        owner: WindowId,
        f: impl FnOnce(&mut CompositionBridge<H, N>) -> R,
    ) -> Option<R> {
        let Some(bridge) = self.bridge(owner) else {
            trace!("registry: no bridge for {}", owner);
            return None;
        };
        let result = match bridge.try_borrow_mut() {
            Ok(mut bridge) => f(&mut bridge),
            Err(_) => {
                warn!("registry: {} is busy, key event not filtered", owner);
                return None;
            }
        };
        self.drain();
        Some(result)
    }

    fn target(&self, item: &Deferred) -> Option<SharedBridge<H, N>> {
        match *item {
            Deferred::Signal(handle, _) => self.route(handle),
            Deferred::SelectionChange { owner, .. }
            | Deferred::Focus { owner, .. }
            | Deferred::Blur { owner, .. }
            | Deferred::Unfocus { owner }
            | Deferred::Destroy { owner, .. }
            | Deferred::ThemeChanged { owner } => self.bridge(owner),
        }
    }

    /// Run `item` now, or queue it when its bridge is busy. Returns whether
    /// a native signal was handled, `None` when nothing ran.
    fn call_or_defer(&self, item: Deferred) -> Option<bool> {
        let Some(bridge) = self.target(&item) else {
            trace!("registry: dropping {:?}, no bridge", item);
            return None;
        };
        let handled = match bridge.try_borrow_mut() {
            Ok(mut inner) => self.apply(&bridge, &mut inner, item),
            Err(_) => {
                trace!("registry: bridge busy, deferring {:?}", item);
                let item = match item {
                    Deferred::SelectionChange {
                        owner,
                        window,
                        change,
                    } => Deferred::SelectionChange {
                        owner,
                        window,
                        change: SelectionChange {
                            caused_by_composition: true,
                            ..change
                        },
                    },
                    other => other,
                };
                self.deferred.borrow_mut().push_back(item);
                return None;
            }
        };
        self.drain();
        Some(handled)
    }

    fn apply(
        &self,
        shared: &SharedBridge<H, N>,
        bridge: &mut CompositionBridge<H, N>,
        item: Deferred,
    ) -> bool {
        match item {
            Deferred::Signal(handle, signal) => return bridge.on_native_signal(handle, signal),
            Deferred::SelectionChange { window, change, .. } => {
                bridge.on_selection_change(window, change)
            }
            Deferred::Focus { window, .. } => bridge.on_focus_window(window),
            Deferred::Blur { window, .. } => bridge.on_blur_window(window),
            Deferred::Unfocus { .. } => {
                if let Some(focused) = bridge.last_focused_window() {
                    bridge.on_blur_window(focused);
                }
            }
            Deferred::Destroy { owner, window } => {
                bridge.on_destroy_window(window);
                if window == owner {
                    self.unregister_bridge(owner, shared);
                }
            }
            Deferred::ThemeChanged { .. } => bridge.on_theme_changed(),
        }
        false
    }

    /// Unregister `owner` unless it was replaced by another bridge in the
    /// meantime.
    fn unregister_bridge(&self, owner: WindowId, shared: &SharedBridge<H, N>) {
        let registered = self
            .bridge(owner)
            .is_some_and(|current| Rc::ptr_eq(&current, shared));
        if registered {
            self.unregister(owner);
        }
    }

    /// Handle queued callbacks whose bridge is free again.
    fn drain(&self) {
        loop {
            let Some(item) = self.deferred.borrow_mut().pop_front() else {
                break;
            };
            let Some(bridge) = self.target(&item) else {
                trace!("registry: dropping {:?}, bridge gone", item);
                continue;
            };
            let Ok(mut inner) = bridge.try_borrow_mut() else {
                self.deferred.borrow_mut().push_front(item);
                break;
            };
            self.apply(&bridge, &mut inner, item);
        }
    }
}
