pub mod backend;
pub mod error;
pub mod keycode;
pub mod ledger;
pub mod ranges;

pub use backend::{BackendId, BackendQuirks, DetectOptions, detect_backend};
pub use error::{CoreError, Result};
pub use keycode::{KeyEventKind, Keysym, ModifierState, NativeKeyEvent};
pub use ledger::{KeyEventLedger, PendingKeyEvent};
pub use ranges::{
    AttributeRun, RangeKind, RangeStyle, Rgba, TextRange, TextRangeArray, UnderlineStyle,
    build_text_ranges, plain_text_ranges,
};
