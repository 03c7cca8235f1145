//! Human-readable status surface: current mode, compensation activity and
//! the most recent error

use std::fmt;

use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::warn;

use crate::mode::Mode;
use crate::recoil::AntiRecoilSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    /// Queue overflow, events were dropped
    TransientInputDrop,
    /// Invalid target or handler failure, previous mode retained
    ModeTransitionRejected,
    /// Virtual pad connect or submit failed
    OutputDeviceUnavailable,
    /// A setting was clamped into range
    ConfigurationOutOfRange,
    /// A mode or pattern file could not be read, default used
    PersistenceCorrupt,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ErrorKind::TransientInputDrop => "input dropped",
            ErrorKind::ModeTransitionRejected => "mode switch rejected",
            ErrorKind::OutputDeviceUnavailable => "output unavailable",
            ErrorKind::ConfigurationOutOfRange => "setting clamped",
            ErrorKind::PersistenceCorrupt => "corrupt data",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: DateTime<Local>,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.at.format("%H:%M:%S"),
            self.kind,
            self.message
        )
    }
}

/// Keeps the most recent error for display
#[derive(Debug, Default)]
pub struct StatusBoard {
    last_error: RwLock<Option<StatusError>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, kind: ErrorKind, message: impl Into<String>) {
        let error = StatusError {
            kind,
            message: message.into(),
            at: Local::now(),
        };
        warn!("{}", error);
        *self.last_error.write() = Some(error);
    }

    pub fn last_error(&self) -> Option<StatusError> {
        self.last_error.read().clone()
    }

    pub fn clear(&self) {
        *self.last_error.write() = None;
    }
}

/// Everything the status surface shows at one moment
#[derive(Debug, Clone)]
pub struct Status {
    pub mode: Mode,
    /// The active handler's own description
    pub detail: String,
    pub output_connected: bool,
    pub physical_connected: bool,
    pub recoil: AntiRecoilSnapshot,
    pub dropped_events: u64,
    pub last_error: Option<StatusError>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mode: {} ({})", self.mode, self.detail)?;
        writeln!(
            f,
            "Output: {} | Physical controller: {}",
            if self.output_connected { "connected" } else { "disconnected" },
            if self.physical_connected { "connected" } else { "none" }
        )?;
        if self.recoil.enabled {
            writeln!(
                f,
                "Anti-recoil: {} (strength {:.2}, accumulated {:.1})",
                self.recoil.phase, self.recoil.effective_strength, self.recoil.accumulated_compensation
            )?;
        } else {
            writeln!(f, "Anti-recoil: off")?;
        }
        if let Some(name) = &self.recoil.recording {
            writeln!(
                f,
                "Recording '{}': {} samples",
                name, self.recoil.recorded_samples
            )?;
        }
        if self.dropped_events > 0 {
            writeln!(f, "Dropped events: {}", self.dropped_events)?;
        }
        match &self.last_error {
            Some(error) => write!(f, "Last error: {error}"),
            None => write!(f, "Last error: none"),
        }
    }
}
