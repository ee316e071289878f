//! imbridge-im: input method composition bridge
//!
//! Sits between a toolkit's native input method contexts and a host text
//! editor. Native preedit signals become an ordered stream of composition
//! events, raw key events become "handled by the IME or not" decisions, and
//! surrounding-text requests are served from a cached snapshot.

pub mod config;
pub mod core;
pub mod registry;
pub mod replay;

use std::sync::Once;

pub use config::Settings;
pub use crate::core::bridge::{BridgeConfig, CompositionBridge, KeyHandlingState};
pub use crate::core::context::{ImeEnabledState, InputContext, InputHints, InputPurpose, WindowId};
pub use crate::core::host::{
    CaretRect, DispatchOutcome, HostEditor, SelectionChange, SyntheticKeyEvent, SyntheticKeyKind,
};
pub use crate::core::native::{ContextKind, NativeHandle, NativeInputMethod, NativeSignal, SignalQueue};
pub use crate::core::preedit::PreeditString;
pub use crate::core::state::CompositionState;
pub use crate::core::surrounding::SurroundingTextSnapshot;
pub use registry::BridgeRegistry;

static INIT_LOGGING: Once = Once::new();

/// Install the stderr subscriber once per process. `RUST_LOG` wins over
/// `fallback_filter`.
pub fn init_logging(fallback_filter: &str) {
    INIT_LOGGING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(fallback_filter));
        // Another subscriber may already be installed by the embedding app.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    });
}
