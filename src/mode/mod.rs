//! Operating modes and the service that switches between them
//!
//! Exactly one [`Mode`] is active. Each mode is served by a registered
//! [`ModeHandler`]; the tick asks the active handler to fill the controller
//! snapshot. [`ModeService`] serializes transitions, persists the result
//! and announces every committed change as a [`ModeChange`].

mod error;
pub mod handler;
pub mod native;
pub mod passthrough;
pub mod raw;
pub mod service;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use error::{ModeError, PersistenceError};
pub use handler::{ModeHandler, TickContext};
pub use native::NativeHandler;
pub use passthrough::ControllerPassHandler;
pub use raw::RawPassthroughHandler;
pub use service::{ActiveMode, ModeService};
pub use store::{JsonModeStore, MemoryModeStore, ModeStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Mode {
    /// Keyboard and mouse mapped to the virtual pad, anti-recoil available
    #[default]
    Native,
    /// Physical controller mirrored to the virtual pad
    ControllerPass,
    /// Keyboard and mouse reach the OS untouched
    MnKConvert,
}

impl Mode {
    pub const ALL: [Mode; 3] = [Mode::Native, Mode::ControllerPass, Mode::MnKConvert];

    /// Cycle order: Native -> ControllerPass -> MnKConvert -> Native
    pub fn next(self) -> Mode {
        match self {
            Mode::Native => Mode::ControllerPass,
            Mode::ControllerPass => Mode::MnKConvert,
            Mode::MnKConvert => Mode::Native,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Mode::Native => "Native",
            Mode::ControllerPass => "ControllerPass",
            Mode::MnKConvert => "MnKConvert",
        };
        f.write_str(text)
    }
}

impl FromStr for Mode {
    type Err = ModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "native" => Ok(Mode::Native),
            "controllerpass" | "controller" | "pass" | "passthrough" => Ok(Mode::ControllerPass),
            "mnkconvert" | "mnk" | "raw" => Ok(Mode::MnKConvert),
            _ => Err(ModeError::Parse(s.to_string())),
        }
    }
}

/// A committed transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeChange {
    pub previous: Mode,
    pub current: Mode,
}

impl ModeChange {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}
