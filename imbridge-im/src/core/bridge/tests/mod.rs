//! Tests for the composition bridge

use super::*;
use crate::core::context::{InputContext, WindowId};
use crate::core::host::SelectionChange;
use crate::core::native::{ContextKind, NativeHandle, NativeSignal};
use crate::core::preedit::PreeditString;
use crate::replay::{
    HostEvent, HostEventKind, KeyResponse, RecordingHost, ScriptedContext, ScriptedInputMethod,
    ScriptedSignal,
};
use imbridge_core::{Keysym, NativeKeyEvent};

mod surrounding;

const OWNER: WindowId = WindowId(1);

type TestBridge = CompositionBridge<RecordingHost, ScriptedInputMethod>;

fn make_bridge_with(module_id: &str, host: RecordingHost, config: BridgeConfig) -> TestBridge {
    let mut bridge = CompositionBridge::with_env(
        OWNER,
        host,
        ScriptedInputMethod::new(module_id),
        config,
        &|_| None,
    );
    bridge.on_focus_window(OWNER);
    bridge
}

fn make_bridge(module_id: &str) -> TestBridge {
    make_bridge_with(module_id, RecordingHost::new(), BridgeConfig::default())
}

fn make_bridge_with_text(text: &str, caret: usize) -> TestBridge {
    make_bridge_with(
        "wayland",
        RecordingHost::with_text(text, caret),
        BridgeConfig::default(),
    )
}

fn handle(bridge: &TestBridge, kind: ContextKind) -> NativeHandle {
    bridge.contexts().handle(kind).unwrap()
}

fn primary(bridge: &TestBridge) -> NativeHandle {
    handle(bridge, ContextKind::Primary)
}

fn primary_context(bridge: &TestBridge) -> &ScriptedContext {
    bridge.native().context(primary(bridge)).unwrap()
}

fn change(text: &str) -> NativeSignal {
    NativeSignal::changed_to(PreeditString::with_text(text))
}

/// Emit `signal` from the primary context outside key handling, keeping
/// the scripted preedit in sync.
fn signal(bridge: &mut TestBridge, signal: NativeSignal) -> bool {
    let scripted = ScriptedSignal {
        context: ContextKind::Primary,
        signal,
    };
    let (handle, signal) = bridge.native_mut().emit(&scripted).unwrap();
    bridge.on_native_signal(handle, signal)
}

fn compose(bridge: &mut TestBridge, text: &str) {
    signal(bridge, NativeSignal::PreeditStart);
    signal(bridge, change(text));
}

fn press(time: u32, ch: char) -> NativeKeyEvent {
    NativeKeyEvent::press(time, Keysym::from_char(ch))
}

fn press_key(time: u32, keysym: Keysym) -> NativeKeyEvent {
    NativeKeyEvent::press(time, keysym)
}

fn key(bridge: &mut TestBridge, event: &NativeKeyEvent, response: KeyResponse) -> KeyHandlingState {
    bridge.native_mut().respond(response);
    bridge.on_key_event(OWNER, event, false)
}

fn kinds(bridge: &TestBridge) -> Vec<HostEventKind> {
    bridge.host().events().iter().map(HostEvent::kind).collect()
}

fn commits(bridge: &TestBridge) -> Vec<String> {
    bridge
        .host()
        .events()
        .iter()
        .filter_map(|event| match event {
            HostEvent::CompositionCommit { text } => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn synthetic_keys(bridge: &TestBridge) -> usize {
    kinds(bridge)
        .into_iter()
        .filter(|kind| *kind == HostEventKind::SyntheticKey)
        .count()
}
