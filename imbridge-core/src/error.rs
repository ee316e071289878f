//! Error types for imbridge-core

/// Errors for malformed input handed to the core helpers.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("unknown input method backend: '{0}'")]
    UnknownBackend(String),

    #[error("attribute run offset {0} splits a character")]
    NotCharBoundary(usize),

    #[error("attribute run offset {offset} is past the end of a {len}-byte string")]
    RunOutOfBounds { offset: usize, len: usize },
}

pub type Result<T> = std::result::Result<T, CoreError>;
