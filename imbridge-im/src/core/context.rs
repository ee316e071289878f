//! Context registry
//!
//! Owns the primary, simple and dummy native contexts of one top-level
//! window and answers which of them is current (selected by the editor's
//! enabled state) and which is active (the composing one, else current).

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::native::{ContextKind, NativeHandle, NativeInputMethod};

/// Host window identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub u64);

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window#{}", self.0)
    }
}

/// Whether the focused editor accepts IME input
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImeEnabledState {
    /// Regular editable content
    #[default]
    Enabled,
    /// Password field
    Password,
    /// Editable, but the editor asked for the IME to stay off
    ImeDisabled,
    /// Nothing editable is focused
    Disabled,
}

impl ImeEnabledState {
    pub fn is_editable(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Kind of text the editor expects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputPurpose {
    #[default]
    FreeForm,
    Alpha,
    Digits,
    Number,
    Phone,
    Url,
    Email,
    Name,
    Password,
    Pin,
    Terminal,
}

bitflags! {
    /// Hints about the editor's behaviour
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct InputHints: u32 {
        const SPELLCHECK = 1 << 0;
        const NO_SPELLCHECK = 1 << 1;
        const WORD_COMPLETION = 1 << 2;
        const LOWERCASE = 1 << 3;
        const UPPERCASE_CHARS = 1 << 4;
        const UPPERCASE_WORDS = 1 << 5;
        const UPPERCASE_SENTENCES = 1 << 6;
        const INHIBIT_OSK = 1 << 7;
        const VERTICAL_WRITING = 1 << 8;
        const EMOJI = 1 << 9;
        const NO_EMOJI = 1 << 10;
        const PRIVATE = 1 << 11;
    }
}

/// What the focused editor told us about itself
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputContext {
    #[serde(default)]
    pub enabled: ImeEnabledState,
    #[serde(default)]
    pub purpose: InputPurpose,
    #[serde(default)]
    pub hints: InputHints,
}

impl InputContext {
    pub fn enabled() -> Self {
        Self::default()
    }

    pub fn password() -> Self {
        Self {
            enabled: ImeEnabledState::Password,
            purpose: InputPurpose::Password,
            hints: InputHints::PRIVATE,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: ImeEnabledState::Disabled,
            ..Self::default()
        }
    }
}

/// Native focus as the bridge last told it
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImeFocusState {
    Focused,
    #[default]
    Blurred,
    /// Focus moved inside the host while the window kept native focus
    BlurredWithoutFocusChange,
}

/// Native context handles of one top-level window.
#[derive(Debug)]
pub struct ContextRegistry {
    owner: WindowId,
    primary: Option<NativeHandle>,
    simple: Option<NativeHandle>,
    dummy: Option<NativeHandle>,
    /// Context that owns the current composition
    composing: Option<NativeHandle>,
    last_focused: Option<WindowId>,
    input_context: InputContext,
    /// Input context waiting for the composition to end
    pending_input_context: Option<InputContext>,
    focus: ImeFocusState,
    use_simple_context_on_password_field: bool,
    /// Purpose and hints must be pushed again on the next focus
    purpose_stale: bool,
    destroyed: bool,
}

impl ContextRegistry {
    /// Create the three contexts. Missing contexts (no display or seat) are
    /// logged; the registry then behaves as if that context never becomes
    /// current.
    pub fn create<N: NativeInputMethod + ?Sized>(
        owner: WindowId,
        native: &mut N,
        use_simple_context_on_password_field: bool,
    ) -> Self {
        let mut make = |kind| {
            let handle = native.create_context(kind);
            if handle.is_none() {
                warn!("{}: no native {:?} context available", owner, kind);
            }
            handle
        };
        let primary = make(ContextKind::Primary);
        let simple = make(ContextKind::Simple);
        let dummy = make(ContextKind::Dummy);
        debug!(
            "{}: contexts primary={:?} simple={:?} dummy={:?}",
            owner, primary, simple, dummy
        );
        Self {
            owner,
            primary,
            simple,
            dummy,
            composing: None,
            last_focused: None,
            input_context: InputContext::default(),
            pending_input_context: None,
            focus: ImeFocusState::Blurred,
            use_simple_context_on_password_field,
            purpose_stale: true,
            destroyed: false,
        }
    }

    pub fn owner(&self) -> WindowId {
        self.owner
    }

    /// Context kind for an enabled state.
    pub fn select_context(&self, enabled: ImeEnabledState) -> ContextKind {
        match enabled {
            ImeEnabledState::Enabled => ContextKind::Primary,
            ImeEnabledState::Password | ImeEnabledState::ImeDisabled
                if self.use_simple_context_on_password_field =>
            {
                ContextKind::Simple
            }
            ImeEnabledState::Password
            | ImeEnabledState::ImeDisabled
            | ImeEnabledState::Disabled => ContextKind::Dummy,
        }
    }

    pub fn handle(&self, kind: ContextKind) -> Option<NativeHandle> {
        if self.destroyed {
            return None;
        }
        match kind {
            ContextKind::Primary => self.primary,
            ContextKind::Simple => self.simple,
            ContextKind::Dummy => self.dummy,
        }
    }

    pub fn kind_of(&self, handle: NativeHandle) -> Option<ContextKind> {
        [ContextKind::Primary, ContextKind::Simple, ContextKind::Dummy]
            .into_iter()
            .find(|&kind| self.handle(kind) == Some(handle))
    }

    /// Every live handle this registry owns.
    pub fn handles(&self) -> impl Iterator<Item = NativeHandle> + '_ {
        [self.primary, self.simple, self.dummy]
            .into_iter()
            .flatten()
            .filter(|_| !self.destroyed)
    }

    pub fn owns(&self, handle: NativeHandle) -> bool {
        self.kind_of(handle).is_some()
    }

    /// Context selected by the current enabled state
    pub fn current(&self) -> Option<NativeHandle> {
        self.handle(self.select_context(self.input_context.enabled))
    }

    /// The composing context if any, else the current one
    pub fn active(&self) -> Option<NativeHandle> {
        if self.destroyed {
            return None;
        }
        self.composing.or_else(|| self.current())
    }

    pub fn composing(&self) -> Option<NativeHandle> {
        self.composing
    }

    pub fn set_composing(&mut self, handle: Option<NativeHandle>) {
        self.composing = handle;
    }

    pub fn last_focused(&self) -> Option<WindowId> {
        self.last_focused
    }

    pub fn set_last_focused(&mut self, window: Option<WindowId>) {
        self.last_focused = window;
    }

    pub fn input_context(&self) -> InputContext {
        self.input_context
    }

    /// Record a new input context. Returns the previous one.
    pub fn replace_input_context(&mut self, context: InputContext) -> InputContext {
        let previous = std::mem::replace(&mut self.input_context, context);
        if previous.purpose != context.purpose || previous.hints != context.hints {
            self.purpose_stale = true;
        }
        previous
    }

    /// Whether switching to `context` would change the current context.
    pub fn switches_context(&self, context: &InputContext) -> bool {
        self.select_context(context.enabled) != self.select_context(self.input_context.enabled)
    }

    pub fn defer_input_context(&mut self, context: InputContext) {
        self.pending_input_context = Some(context);
    }

    pub fn take_pending_input_context(&mut self) -> Option<InputContext> {
        self.pending_input_context.take()
    }

    pub fn focus(&self) -> ImeFocusState {
        self.focus
    }

    pub fn set_focus(&mut self, focus: ImeFocusState) {
        self.focus = focus;
    }

    pub fn is_focused(&self) -> bool {
        self.focus == ImeFocusState::Focused
    }

    pub fn purpose_stale(&self) -> bool {
        self.purpose_stale
    }

    pub fn mark_purpose_stale(&mut self) {
        self.purpose_stale = true;
    }

    pub fn clear_purpose_stale(&mut self) {
        self.purpose_stale = false;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Release every native context. Later calls see no handles at all.
    pub fn release_all<N: NativeInputMethod + ?Sized>(&mut self, native: &mut N) {
        if self.destroyed {
            return;
        }
        for handle in [self.primary.take(), self.simple.take(), self.dummy.take()]
            .into_iter()
            .flatten()
        {
            native.release_context(handle);
        }
        self.composing = None;
        self.last_focused = None;
        self.pending_input_context = None;
        self.focus = ImeFocusState::Blurred;
        self.destroyed = true;
        debug!("{}: contexts released", self.owner);
    }
}
