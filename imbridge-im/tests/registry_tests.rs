//! Callback routing and reentrancy through the bridge registry

use std::rc::{Rc, Weak};

use imbridge_core::{Keysym, NativeKeyEvent, TextRangeArray};
use imbridge_im::registry::SharedBridge;
use imbridge_im::replay::{HostEvent, HostEventKind, KeyResponse, RecordingHost, ScriptedInputMethod};
use imbridge_im::{
    BridgeConfig, BridgeRegistry, CaretRect, CompositionBridge, ContextKind, DispatchOutcome,
    HostEditor, KeyHandlingState, NativeHandle, NativeSignal, PreeditString, SelectionChange,
    SurroundingTextSnapshot, SyntheticKeyEvent, WindowId,
};

type Registry = BridgeRegistry<ReentrantHost, ScriptedInputMethod>;
type Shared = SharedBridge<ReentrantHost, ScriptedInputMethod>;

/// What the host does from inside a dispatch
#[derive(Debug, Default)]
enum Reaction {
    #[default]
    Nothing,
    Signal(NativeHandle, NativeSignal),
    SelectionChange(WindowId),
    Blur(WindowId),
    Destroy(WindowId),
}

/// A recording host that calls back into the registry while handling an
/// event, the way editor code reacting to composition events does.
struct ReentrantHost {
    inner: RecordingHost,
    registry: Weak<Registry>,
    on_start: Reaction,
    on_update: Reaction,
}

impl ReentrantHost {
    fn react(&mut self, reaction: Reaction) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        match reaction {
            Reaction::Nothing => {}
            Reaction::Signal(handle, signal) => {
                assert!(!registry.native_signal(handle, signal));
            }
            Reaction::SelectionChange(window) => {
                registry.selection_change(window, window, SelectionChange::external())
            }
            Reaction::Blur(window) => registry.blur_window(window, window),
            Reaction::Destroy(window) => registry.destroy_window(window, window),
        }
    }
}

impl HostEditor for ReentrantHost {
    fn dispatch_composition_start(&mut self) -> DispatchOutcome {
        let outcome = self.inner.dispatch_composition_start();
        let reaction = std::mem::take(&mut self.on_start);
        self.react(reaction);
        outcome
    }

    fn dispatch_composition_update(&mut self, text: &str, ranges: &TextRangeArray) -> DispatchOutcome {
        let outcome = self.inner.dispatch_composition_update(text, ranges);
        let reaction = std::mem::take(&mut self.on_update);
        self.react(reaction);
        outcome
    }

    fn dispatch_composition_commit(&mut self, text: &str) -> DispatchOutcome {
        self.inner.dispatch_composition_commit(text)
    }

    fn dispatch_synthetic_key(&mut self, key: &SyntheticKeyEvent) -> DispatchOutcome {
        self.inner.dispatch_synthetic_key(key)
    }

    fn query_selection(&mut self, window: WindowId) -> Option<SurroundingTextSnapshot> {
        self.inner.query_selection(window)
    }

    fn delete_content(&mut self, start: usize, len: usize) -> DispatchOutcome {
        self.inner.delete_content(start, len)
    }

    fn caret_rect(&mut self, window: WindowId, offset: usize) -> Option<CaretRect> {
        self.inner.caret_rect(window, offset)
    }
}

fn add_bridge(registry: &Rc<Registry>, owner: WindowId) -> Shared {
    let host = ReentrantHost {
        inner: RecordingHost::new(),
        registry: Rc::downgrade(registry),
        on_start: Reaction::Nothing,
        on_update: Reaction::Nothing,
    };
    let native = ScriptedInputMethod::new("wayland").with_first_handle(owner.0 * 100);
    let bridge =
        CompositionBridge::with_env(owner, host, native, BridgeConfig::default(), &|_| None);
    registry.insert(bridge)
}

fn primary(bridge: &Shared) -> NativeHandle {
    bridge
        .borrow()
        .contexts()
        .handle(ContextKind::Primary)
        .unwrap()
}

fn events(bridge: &Shared) -> Vec<HostEvent> {
    bridge.borrow().host().inner.events().to_vec()
}

fn changed(text: &str) -> NativeSignal {
    NativeSignal::changed_to(PreeditString::with_text(text))
}

const A: WindowId = WindowId(1);
const B: WindowId = WindowId(2);

#[test]
fn test_signals_route_to_owning_bridge() {
    let registry = Rc::new(Registry::new());
    let a = add_bridge(&registry, A);
    let b = add_bridge(&registry, B);
    assert_eq!(registry.len(), 2);
    registry.focus_window(A, A);

    assert!(registry.native_signal(primary(&a), NativeSignal::PreeditStart));
    assert_eq!(events(&a), vec![HostEvent::CompositionStart]);
    assert!(events(&b).is_empty());

    assert!(!registry.native_signal(NativeHandle(9999), NativeSignal::PreeditStart));
}

#[test]
fn test_focusing_another_bridge_blurs_the_previous_one() {
    let registry = Rc::new(Registry::new());
    let a = add_bridge(&registry, A);
    let _b = add_bridge(&registry, B);
    registry.focus_window(A, A);
    let h = primary(&a);
    registry.native_signal(h, NativeSignal::PreeditStart);
    registry.native_signal(h, changed("ab"));

    registry.focus_window(B, B);
    assert_eq!(registry.last_focused(), Some(B));
    assert!(!a.borrow().is_composing());
    assert_eq!(
        events(&a).last(),
        Some(&HostEvent::CompositionCommit {
            text: "ab".to_string()
        })
    );
}

#[test]
fn test_signal_from_inside_a_dispatch_is_deferred() {
    let registry = Rc::new(Registry::new());
    let a = add_bridge(&registry, A);
    registry.focus_window(A, A);
    let h = primary(&a);
    a.borrow_mut().host_mut().on_start = Reaction::Signal(h, changed("x"));

    assert!(registry.native_signal(h, NativeSignal::PreeditStart));
    assert_eq!(registry.deferred_len(), 0);
    assert_eq!(a.borrow().dispatched_string(), "x");
    let kinds: Vec<_> = events(&a).iter().map(HostEvent::kind).collect();
    assert_eq!(kinds.len(), 2);
    assert_eq!(events(&a)[0], HostEvent::CompositionStart);
}

#[test]
fn test_selection_change_from_inside_a_dispatch_is_absorbed() {
    let registry = Rc::new(Registry::new());
    let a = add_bridge(&registry, A);
    registry.focus_window(A, A);
    let h = primary(&a);
    a.borrow_mut().host_mut().on_update = Reaction::SelectionChange(A);

    registry.native_signal(h, NativeSignal::PreeditStart);
    registry.native_signal(h, changed("x"));
    assert!(!a.borrow().has_pending_reset());

    // The same notification from outside any dispatch is the user's.
    registry.selection_change(A, A, SelectionChange::external());
    assert!(a.borrow().has_pending_reset());
}

#[test]
fn test_destroy_from_inside_a_dispatch_commits_and_releases() {
    let registry = Rc::new(Registry::new());
    let a = add_bridge(&registry, A);
    registry.focus_window(A, A);
    let h = primary(&a);
    a.borrow_mut().host_mut().on_update = Reaction::Destroy(A);

    registry.native_signal(h, NativeSignal::PreeditStart);
    registry.native_signal(h, changed("xy"));

    assert_eq!(registry.deferred_len(), 0);
    assert_eq!(registry.len(), 0);
    assert!(registry.route(h).is_none());
    let bridge = a.borrow();
    assert!(bridge.is_destroyed());
    assert!(!bridge.is_composing());
    assert!(bridge.native().context(h).unwrap().released);
    let kinds: Vec<_> = bridge.host().inner.events().iter().map(HostEvent::kind).collect();
    assert_eq!(
        kinds,
        vec![
            HostEventKind::CompositionStart,
            HostEventKind::CompositionUpdate,
            HostEventKind::CompositionCommit
        ]
    );
    assert_eq!(
        bridge.host().inner.events().last(),
        Some(&HostEvent::CompositionCommit {
            text: "xy".to_string()
        })
    );
    drop(bridge);

    assert!(!registry.native_signal(h, changed("xyz")));
    assert_eq!(events(&a).len(), 3);
}

#[test]
fn test_blur_from_inside_a_dispatch_finalizes_after_it() {
    let registry = Rc::new(Registry::new());
    let a = add_bridge(&registry, A);
    registry.focus_window(A, A);
    let h = primary(&a);
    registry.native_signal(h, NativeSignal::PreeditStart);
    a.borrow_mut().host_mut().on_update = Reaction::Blur(A);

    registry.native_signal(h, changed("ab"));

    assert_eq!(registry.deferred_len(), 0);
    assert!(!a.borrow().is_composing());
    assert!(!a.borrow().native().context(h).unwrap().focused);
    assert_eq!(
        events(&a).last(),
        Some(&HostEvent::CompositionCommit {
            text: "ab".to_string()
        })
    );
}

#[test]
fn test_key_events_route_by_owner() {
    let registry = Rc::new(Registry::new());
    let a = add_bridge(&registry, A);
    registry.focus_window(A, A);
    a.borrow_mut().native_mut().respond(KeyResponse::consume());

    let press = NativeKeyEvent::press(1, Keysym::from_char('a'));
    assert_eq!(
        registry.key_event(A, A, &press, false),
        KeyHandlingState::Handled
    );
    assert_eq!(
        registry.key_event(B, B, &press, false),
        KeyHandlingState::NotHandled
    );
}

#[test]
fn test_destroying_owner_unregisters_bridge() {
    let registry = Rc::new(Registry::new());
    let a = add_bridge(&registry, A);
    let b = add_bridge(&registry, B);
    registry.focus_window(A, A);
    let h = primary(&a);
    registry.native_signal(h, NativeSignal::PreeditStart);
    registry.native_signal(h, changed("xyz"));

    registry.destroy_window(A, A);
    assert_eq!(registry.len(), 1);
    assert!(registry.bridge(A).is_none());
    assert!(registry.route(h).is_none());
    assert_eq!(registry.last_focused(), None);
    assert!(a.borrow().is_destroyed());
    assert!(!registry.native_signal(h, NativeSignal::commit("late")));

    let commits = events(&a)
        .into_iter()
        .filter(|e| matches!(e, HostEvent::CompositionCommit { .. }))
        .count();
    assert_eq!(commits, 1);
    assert!(registry.route(primary(&b)).is_some());
}

#[test]
fn test_theme_change_reaches_every_bridge() {
    let registry = Rc::new(Registry::new());
    let a = add_bridge(&registry, A);
    registry.focus_window(A, A);
    let updates = |bridge: &Shared| {
        let bridge = bridge.borrow();
        let h = bridge.contexts().handle(ContextKind::Primary).unwrap();
        let count = bridge.native().context(h).unwrap().purpose_updates;
        count
    };
    assert_eq!(updates(&a), 1);

    registry.theme_changed();
    registry.blur_window(A, A);
    registry.focus_window(A, A);
    assert_eq!(updates(&a), 2);
}
