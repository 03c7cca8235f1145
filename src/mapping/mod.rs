//! Keyboard/mouse to controller mapping
//!
//! - [`profile`] - the bound [`Profile`]: key bindings, curve settings, DPI
//! - [`stick`] - WASD-style direction keys to a normalized left stick
//! - [`curve`] - mouse delta to right stick through the response curve

pub mod curve;
pub mod profile;
pub mod stick;

pub use curve::{CurveMapper, CurveSettings};
pub use profile::{ControllerInput, Profile, ProfileError, ResolvedInputs};
pub use stick::{left_stick_from_directions, DirectionKeys};
