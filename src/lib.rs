//! padbridge - keyboard/mouse to virtual gamepad bridge
//!
//! Translates captured keyboard, mouse, and physical-gamepad input into one
//! virtual controller snapshot per tick, with optional anti-recoil
//! compensation on the mouse path.
//!
//! # Architecture
//!
//! ```text
//! Capture ──► EventQueue ──► Consumer ──► InputState
//!                                             │
//!                         ModeService ──► Tick (500 Hz) ──► VirtualPad
//!                                             │
//!                              AntiRecoilEngine + CurveMapper
//! ```
//!
//! 1. [`input`] - Event types, the bounded drop-oldest queue, folded input state
//! 2. [`engine`] - Orchestrator lifecycle, consumer, tick cycle, supervisor
//! 3. [`mode`] - Mode state machine and the three mode handlers
//! 4. [`recoil`] - Anti-recoil compensation, patterns, simulation
//! 5. [`mapping`] - Stick derivation, response curves, profiles
//! 6. [`device`] - Virtual output and physical controller seams

pub mod config;
pub mod device;
pub mod engine;
pub mod input;
pub mod mapping;
pub mod mode;
pub mod recoil;
pub mod status;

pub use config::AppConfig;
pub use engine::{Orchestrator, OrchestratorBuilder, OrchestratorError};
pub use input::{InputEvent, MouseButton};
pub use mode::{Mode, ModeChange, ModeError, ModeService};
pub use recoil::{AntiRecoilEngine, AntiRecoilPattern, AntiRecoilSettings};
