use std::time::Duration;

use crate::mapping::ProfileError;
use crate::mode::ModeError;

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Mode service error: {0}")]
    Mode(#[from] ModeError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Orchestrator has already been disposed")]
    AlreadyDisposed,

    #[error("Input consumer did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}
