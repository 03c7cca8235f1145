//! Device seams: the virtual pad we write to and the physical pad we read
//!
//! Neither driver protocol lives here. [`output::VirtualPad`] accepts one
//! [`state::ControllerStateBatch`] per tick, and
//! [`physical::PhysicalController`] is polled for a connection flag plus a
//! snapshot in the same shape.

pub mod output;
pub mod physical;
pub mod state;

#[cfg(feature = "gilrs")]
pub mod gilrs_backend;

pub use output::{MemoryPad, MemoryPadProbe, OutputError, TracingPad, VirtualPad};
pub use physical::{
    ManualController, ManualControllerHandle, NoController, PhysicalController, PhysicalError,
    PhysicalPoll,
};
pub use state::{Buttons, ControllerStateBatch, AXIS_MAX, TRIGGER_MAX};
