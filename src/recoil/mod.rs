//! Anti-recoil compensation
//!
//! While fire is held in Native mode, [`AntiRecoilEngine::process`] removes a
//! fraction of the vertical (and optionally horizontal) mouse delta before it
//! reaches the curve mapper. Each firing cycle runs
//! Idle -> Waiting -> Active -> Cooldown -> Idle.
//!
//! The same [`formula::compensate`] drives [`simulate`], so a replayed
//! [`AntiRecoilPattern`] shows exactly what the live engine would have done.

pub mod engine;
pub mod formula;
pub mod pattern;
pub mod settings;
pub mod simulate;

pub use engine::{recovery_interval, AntiRecoilEngine, AntiRecoilSnapshot, CyclePhase};
pub use formula::Compensated;
pub use pattern::{
    AntiRecoilPattern, InMemoryPatternRepository, JsonPatternRepository, PatternError,
    PatternRepository, Sample,
};
pub use settings::AntiRecoilSettings;
pub use simulate::{SimulatedSample, SimulationResult};
