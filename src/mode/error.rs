use std::path::PathBuf;

use super::Mode;

#[derive(Debug, thiserror::Error)]
pub enum ModeError {
    #[error("Mode {0} has no registered handler")]
    Unregistered(Mode),

    #[error("A Native handler must be registered")]
    NativeMissing,

    #[error("Handler for {mode} failed: {reason}")]
    HookFailed { mode: Mode, reason: String },

    #[error("Failed to persist mode: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Unknown mode: {0:?}")]
    Parse(String),
}

impl ModeError {
    pub fn hook(mode: Mode, reason: impl Into<String>) -> Self {
        ModeError::HookFailed {
            mode,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt mode data in {location}: {reason}")]
    Corrupt { location: String, reason: String },

    #[error("Mode store unavailable: {0}")]
    Unavailable(String),
}
