//! Trace replay
//!
//! A recording host editor, a scripted native input method, and a JSON
//! trace format that drives a bridge through them. Used by the
//! `imbridge-replay` tool and by the bridge tests.

use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use imbridge_core::{Keysym, NativeKeyEvent, TextRangeArray};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::config::Settings;
use crate::core::bridge::{BridgeConfig, CompositionBridge, KeyHandlingState};
use crate::core::context::{InputContext, InputHints, InputPurpose, WindowId};
use crate::core::host::{
    CaretRect, DispatchOutcome, HostEditor, SelectionChange, SyntheticKeyEvent, SyntheticKeyKind,
};
use crate::core::native::{ContextKind, NativeHandle, NativeInputMethod, NativeSignal, SignalQueue};
use crate::core::preedit::PreeditString;
use crate::core::state::CompositionState;
use crate::core::surrounding::SurroundingTextSnapshot;

/// An event the host editor received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    SyntheticKey {
        kind: SyntheticKeyKind,
        keysym: Option<Keysym>,
    },
    CompositionStart,
    CompositionUpdate {
        text: String,
        ranges: TextRangeArray,
    },
    CompositionCommit {
        text: String,
    },
    DeleteContent {
        start: usize,
        len: usize,
    },
}

/// Kinds of [`HostEvent`], for fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostEventKind {
    SyntheticKey,
    CompositionStart,
    CompositionUpdate,
    CompositionCommit,
    DeleteContent,
}

impl HostEvent {
    pub fn kind(&self) -> HostEventKind {
        match self {
            HostEvent::SyntheticKey { .. } => HostEventKind::SyntheticKey,
            HostEvent::CompositionStart => HostEventKind::CompositionStart,
            HostEvent::CompositionUpdate { .. } => HostEventKind::CompositionUpdate,
            HostEvent::CompositionCommit { .. } => HostEventKind::CompositionCommit,
            HostEvent::DeleteContent { .. } => HostEventKind::DeleteContent,
        }
    }
}

/// A single-line editor that records every event it receives.
#[derive(Debug, Clone)]
pub struct RecordingHost {
    events: Vec<HostEvent>,
    text: String,
    caret: usize,
    /// Composition string in `text` (start, length)
    composition: Option<(usize, usize)>,
    has_selection: bool,
    consume_keys: bool,
    lose_widget_on: Option<HostEventKind>,
    selection_queries: usize,
}

impl Default for RecordingHost {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingHost {
    /// An empty editor with the caret at 0
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            text: String::new(),
            caret: 0,
            composition: None,
            has_selection: true,
            consume_keys: false,
            lose_widget_on: None,
            selection_queries: 0,
        }
    }

    pub fn with_text(text: impl Into<String>, caret: usize) -> Self {
        let snapshot = SurroundingTextSnapshot::new(text, caret);
        Self {
            text: snapshot.text,
            caret: snapshot.caret,
            ..Self::new()
        }
    }

    pub fn events(&self) -> &[HostEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<HostEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn caret(&self) -> usize {
        self.caret
    }

    pub fn selection_queries(&self) -> usize {
        self.selection_queries
    }

    /// Whether an editable is focused, i.e. whether selection queries
    /// succeed
    pub fn set_has_selection(&mut self, has_selection: bool) {
        self.has_selection = has_selection;
    }

    /// Report synthetic keys as consumed
    pub fn set_consume_keys(&mut self, consume: bool) {
        self.consume_keys = consume;
    }

    /// The next event of `kind` is recorded, then reported as having
    /// destroyed the widget.
    pub fn fail_next(&mut self, kind: HostEventKind) {
        self.lose_widget_on = Some(kind);
    }

    /// Move the caret as a user click would.
    pub fn move_caret(&mut self, caret: usize) {
        self.caret = caret.min(self.text.chars().count());
    }

    fn record(&mut self, event: HostEvent) -> DispatchOutcome {
        let kind = event.kind();
        trace!("host: {:?}", event);
        self.events.push(event);
        if self.lose_widget_on == Some(kind) {
            self.lose_widget_on = None;
            return DispatchOutcome::widget_gone();
        }
        if kind == HostEventKind::SyntheticKey && self.consume_keys {
            return DispatchOutcome::consumed();
        }
        DispatchOutcome::ok()
    }

    fn replace(&mut self, start: usize, len: usize, with: &str) {
        let mut chars: Vec<char> = self.text.chars().collect();
        let start = start.min(chars.len());
        let end = (start + len).min(chars.len());
        chars.splice(start..end, with.chars());
        self.text = chars.into_iter().collect();
    }
}

impl HostEditor for RecordingHost {
    fn dispatch_composition_start(&mut self) -> DispatchOutcome {
        self.composition = Some((self.caret, 0));
        self.record(HostEvent::CompositionStart)
    }

    fn dispatch_composition_update(&mut self, text: &str, ranges: &TextRangeArray) -> DispatchOutcome {
        let (start, len) = self.composition.unwrap_or((self.caret, 0));
        self.replace(start, len, text);
        let new_len = text.chars().count();
        self.composition = Some((start, new_len));
        self.caret = start + ranges.caret().unwrap_or(new_len).min(new_len);
        self.record(HostEvent::CompositionUpdate {
            text: text.to_string(),
            ranges: ranges.clone(),
        })
    }

    fn dispatch_composition_commit(&mut self, text: &str) -> DispatchOutcome {
        let (start, len) = self.composition.take().unwrap_or((self.caret, 0));
        self.replace(start, len, text);
        self.caret = start + text.chars().count();
        self.record(HostEvent::CompositionCommit {
            text: text.to_string(),
        })
    }

    fn dispatch_synthetic_key(&mut self, key: &SyntheticKeyEvent) -> DispatchOutcome {
        self.record(HostEvent::SyntheticKey {
            kind: key.kind,
            keysym: key.keysym,
        })
    }

    fn query_selection(&mut self, _window: WindowId) -> Option<SurroundingTextSnapshot> {
        self.selection_queries += 1;
        self.has_selection
            .then(|| SurroundingTextSnapshot::new(self.text.clone(), self.caret))
    }

    fn delete_content(&mut self, start: usize, len: usize) -> DispatchOutcome {
        self.replace(start, len, "");
        if self.caret >= start + len {
            self.caret -= len;
        } else if self.caret > start {
            self.caret = start;
        }
        self.record(HostEvent::DeleteContent { start, len })
    }

    fn caret_rect(&mut self, _window: WindowId, offset: usize) -> Option<CaretRect> {
        Some(CaretRect {
            x: offset as i32 * 8,
            y: 0,
            width: 1,
            height: 16,
        })
    }
}

/// How the scripted input method answers one `filter_keypress`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyResponse {
    #[serde(default)]
    pub filtered: bool,
    /// Signals emitted while filtering
    #[serde(default)]
    pub emits: Vec<ScriptedSignal>,
}

impl KeyResponse {
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn consume() -> Self {
        Self {
            filtered: true,
            emits: Vec::new(),
        }
    }

    pub fn emit(mut self, signal: NativeSignal) -> Self {
        self.filtered = true;
        self.emits.push(ScriptedSignal {
            context: ContextKind::Primary,
            signal,
        });
        self
    }
}

/// A signal and the context kind that emits it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedSignal {
    #[serde(default = "primary")]
    pub context: ContextKind,
    pub signal: NativeSignal,
}

fn primary() -> ContextKind {
    ContextKind::Primary
}

/// State of one scripted native context
#[derive(Debug, Clone)]
pub struct ScriptedContext {
    pub kind: ContextKind,
    pub preedit: PreeditString,
    pub focused: bool,
    pub focus_ins: usize,
    /// Last surrounding text handed over (text, byte cursor)
    pub surrounding: Option<(String, usize)>,
    pub cursor_location: Option<CaretRect>,
    pub purpose: Option<(InputPurpose, InputHints)>,
    pub purpose_updates: usize,
    pub resets: usize,
    pub released: bool,
}

/// A native input method that follows a script.
#[derive(Debug, Clone)]
pub struct ScriptedInputMethod {
    module_id: String,
    contexts: BTreeMap<NativeHandle, ScriptedContext>,
    next_handle: u64,
    responses: VecDeque<KeyResponse>,
    filtered: Vec<NativeKeyEvent>,
    unavailable: Vec<ContextKind>,
}

impl ScriptedInputMethod {
    pub fn new(module_id: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            contexts: BTreeMap::new(),
            next_handle: 1,
            responses: VecDeque::new(),
            filtered: Vec::new(),
            unavailable: Vec::new(),
        }
    }

    /// Number handles from `first`, so several scripted input methods can
    /// share one handle space.
    pub fn with_first_handle(mut self, first: u64) -> Self {
        self.next_handle = first;
        self
    }

    /// Contexts of `kind` cannot be created (no display).
    pub fn without(mut self, kind: ContextKind) -> Self {
        self.unavailable.push(kind);
        self
    }

    /// Queue the answer to the next `filter_keypress`. Without a queued
    /// answer keys pass through.
    pub fn respond(&mut self, response: KeyResponse) {
        self.responses.push_back(response);
    }

    /// Handle of the live context of `kind`
    pub fn handle(&self, kind: ContextKind) -> Option<NativeHandle> {
        self.contexts
            .iter()
            .find(|(_, ctx)| ctx.kind == kind && !ctx.released)
            .map(|(handle, _)| *handle)
    }

    pub fn context(&self, handle: NativeHandle) -> Option<&ScriptedContext> {
        self.contexts.get(&handle)
    }

    pub fn context_of(&self, kind: ContextKind) -> Option<&ScriptedContext> {
        self.handle(kind).and_then(|handle| self.contexts.get(&handle))
    }

    pub fn set_preedit(&mut self, handle: NativeHandle, preedit: PreeditString) {
        if let Some(ctx) = self.contexts.get_mut(&handle) {
            ctx.preedit = preedit;
        }
    }

    /// Every event offered to `filter_keypress`
    pub fn filtered_events(&self) -> &[NativeKeyEvent] {
        &self.filtered
    }

    /// Resolve a scripted signal to its handle, updating the context the
    /// way a real input method would before emitting it.
    pub fn emit(&mut self, scripted: &ScriptedSignal) -> Option<(NativeHandle, NativeSignal)> {
        let handle = self.handle(scripted.context)?;
        if let Some(ctx) = self.contexts.get_mut(&handle) {
            match &scripted.signal {
                NativeSignal::PreeditChanged {
                    preedit: Some(preedit),
                } => ctx.preedit = preedit.clone(),
                NativeSignal::PreeditEnd | NativeSignal::Commit { .. } => {
                    ctx.preedit = PreeditString::new()
                }
                _ => {}
            }
        }
        Some((handle, scripted.signal.clone()))
    }
}

impl NativeInputMethod for ScriptedInputMethod {
    fn create_context(&mut self, kind: ContextKind) -> Option<NativeHandle> {
        if self.unavailable.contains(&kind) {
            return None;
        }
        let handle = NativeHandle(self.next_handle);
        self.next_handle += 1;
        self.contexts.insert(
            handle,
            ScriptedContext {
                kind,
                preedit: PreeditString::new(),
                focused: false,
                focus_ins: 0,
                surrounding: None,
                cursor_location: None,
                purpose: None,
                purpose_updates: 0,
                resets: 0,
                released: false,
            },
        );
        Some(handle)
    }

    fn release_context(&mut self, handle: NativeHandle) {
        if let Some(ctx) = self.contexts.get_mut(&handle) {
            ctx.released = true;
            ctx.focused = false;
        }
    }

    fn module_id(&self, _handle: NativeHandle) -> String {
        self.module_id.clone()
    }

    fn filter_keypress(
        &mut self,
        _handle: NativeHandle,
        event: &NativeKeyEvent,
        signals: &mut SignalQueue,
    ) -> bool {
        self.filtered.push(event.clone());
        let response = self.responses.pop_front().unwrap_or_default();
        for scripted in &response.emits {
            if let Some((handle, signal)) = self.emit(scripted) {
                signals.push(handle, signal);
            }
        }
        response.filtered
    }

    fn preedit(&self, handle: NativeHandle) -> PreeditString {
        self.contexts
            .get(&handle)
            .map(|ctx| ctx.preedit.clone())
            .unwrap_or_default()
    }

    fn focus_in(&mut self, handle: NativeHandle) {
        if let Some(ctx) = self.contexts.get_mut(&handle) {
            ctx.focused = true;
            ctx.focus_ins += 1;
        }
    }

    fn focus_out(&mut self, handle: NativeHandle) {
        if let Some(ctx) = self.contexts.get_mut(&handle) {
            ctx.focused = false;
        }
    }

    fn reset(&mut self, handle: NativeHandle, signals: &mut SignalQueue) {
        if let Some(ctx) = self.contexts.get_mut(&handle) {
            ctx.resets += 1;
            if !ctx.preedit.is_empty() {
                ctx.preedit = PreeditString::new();
                signals.push(handle, NativeSignal::changed_to(PreeditString::new()));
                signals.push(handle, NativeSignal::PreeditEnd);
            }
        }
    }

    fn set_surrounding(&mut self, handle: NativeHandle, text: &str, cursor: usize) {
        if let Some(ctx) = self.contexts.get_mut(&handle) {
            ctx.surrounding = Some((text.to_string(), cursor));
        }
    }

    fn set_cursor_location(&mut self, handle: NativeHandle, rect: CaretRect) {
        if let Some(ctx) = self.contexts.get_mut(&handle) {
            ctx.cursor_location = Some(rect);
        }
    }

    fn set_input_purpose(&mut self, handle: NativeHandle, purpose: InputPurpose, hints: InputHints) {
        if let Some(ctx) = self.contexts.get_mut(&handle) {
            ctx.purpose = Some((purpose, hints));
            ctx.purpose_updates += 1;
        }
    }
}

/// One step of a trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Focus {
        window: WindowId,
    },
    Blur {
        window: WindowId,
    },
    Destroy {
        window: WindowId,
    },
    FocusChangeInHost {
        focused: bool,
    },
    SetInputContext {
        window: WindowId,
        context: InputContext,
    },
    /// A raw key event and how the input method answers it
    Key {
        window: WindowId,
        event: NativeKeyEvent,
        #[serde(default)]
        already_dispatched: bool,
        #[serde(default)]
        filtered: bool,
        #[serde(default)]
        emits: Vec<ScriptedSignal>,
    },
    /// A signal outside key handling
    Signal {
        #[serde(default = "primary")]
        context: ContextKind,
        signal: NativeSignal,
    },
    /// The user moved the caret
    MoveCaret {
        window: WindowId,
        caret: usize,
    },
    SelectionChange {
        window: WindowId,
        #[serde(default)]
        caused_by_composition: bool,
        #[serde(default)]
        occurred_during_composition: bool,
    },
    ThemeChanged,
    LayoutChanged,
    Reset,
    /// The next host event of this kind destroys the widget
    HostFault {
        on: HostEventKind,
    },
}

/// A recorded session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trace {
    #[serde(default = "default_owner")]
    pub owner: WindowId,
    /// Module id the native input method reports
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Initial editor content
    #[serde(default)]
    pub document: SurroundingTextSnapshot,
    pub steps: Vec<Step>,
}

fn default_owner() -> WindowId {
    WindowId(1)
}

fn default_backend() -> String {
    "wayland".to_string()
}

impl Trace {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid trace")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_json(&content)
    }
}

/// What a replay produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub events: Vec<HostEvent>,
    pub key_results: Vec<KeyHandlingState>,
    pub protocol_violations: usize,
    pub final_state: CompositionState,
    pub document: SurroundingTextSnapshot,
}

/// Drive a bridge through `trace`. Backend detection ignores the process
/// environment so replays are reproducible.
pub fn replay(trace: &Trace, settings: &Settings) -> ReplayReport {
    let host = RecordingHost::with_text(trace.document.text.clone(), trace.document.caret);
    let native = ScriptedInputMethod::new(trace.backend.clone());
    let mut bridge = CompositionBridge::with_env(
        trace.owner,
        host,
        native,
        BridgeConfig::from(settings),
        &|_| None,
    );
    debug!("replaying {} step(s) on {}", trace.steps.len(), bridge.backend());

    let mut key_results = Vec::new();
    for step in &trace.steps {
        trace!("step {:?}", step);
        match step {
            Step::Focus { window } => bridge.on_focus_window(*window),
            Step::Blur { window } => bridge.on_blur_window(*window),
            Step::Destroy { window } => bridge.on_destroy_window(*window),
            Step::FocusChangeInHost { focused } => bridge.on_focus_change_in_host(*focused),
            Step::SetInputContext { window, context } => bridge.set_input_context(*window, *context),
            Step::Key {
                window,
                event,
                already_dispatched,
                filtered,
                emits,
            } => {
                bridge.native_mut().respond(KeyResponse {
                    filtered: *filtered,
                    emits: emits.clone(),
                });
                key_results.push(bridge.on_key_event(*window, event, *already_dispatched));
            }
            Step::Signal { context, signal } => {
                let scripted = ScriptedSignal {
                    context: *context,
                    signal: signal.clone(),
                };
                match bridge.native_mut().emit(&scripted) {
                    Some((handle, signal)) => {
                        bridge.on_native_signal(handle, signal);
                    }
                    None => debug!("no {:?} context for {:?}", context, signal),
                }
            }
            Step::MoveCaret { window, caret } => {
                bridge.host_mut().move_caret(*caret);
                bridge.on_selection_change(*window, SelectionChange::external());
            }
            Step::SelectionChange {
                window,
                caused_by_composition,
                occurred_during_composition,
            } => bridge.on_selection_change(
                *window,
                SelectionChange {
                    caused_by_composition: *caused_by_composition,
                    occurred_during_composition: *occurred_during_composition,
                },
            ),
            Step::ThemeChanged => bridge.on_theme_changed(),
            Step::LayoutChanged => bridge.on_layout_change(),
            Step::Reset => bridge.reset_ime(),
            Step::HostFault { on } => bridge.host_mut().fail_next(*on),
        }
    }

    let host = bridge.host();
    ReplayReport {
        events: host.events().to_vec(),
        key_results,
        protocol_violations: bridge.protocol_violations(),
        final_state: bridge.composition_state(),
        document: SurroundingTextSnapshot::new(host.text(), host.caret()),
    }
}
