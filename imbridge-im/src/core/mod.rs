//! Core bridge functionality
//!
//! The collaborator traits (host editor, native input method), the pieces
//! the bridge is built from, and the bridge itself.

pub mod bridge;
pub mod context;
pub mod host;
pub mod native;
pub mod preedit;
pub mod state;
pub mod surrounding;
