//! Orchestrator: the queue consumer, the output tick and the supervisor
//!
//! Three tasks share one [`Shared`](shared::Shared) state:
//!
//! 1. the consumer drains the [`EventQueue`](crate::input::EventQueue) in FIFO
//!    order and folds events into the input state through the active handler
//! 2. the tick samples that state at a fixed period, runs the active handler's
//!    `update` and submits one snapshot to the virtual pad
//! 3. the supervisor runs mode switches requested by the tick, reconnects a
//!    failed pad, and logs statistics
//!
//! Capture callbacks call straight into [`Orchestrator`] from any thread.

mod consumer;
mod error;
mod orchestrator;
mod shared;
mod stats;
mod supervisor;
mod tick;

pub use error::OrchestratorError;
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use stats::StatsSnapshot;
pub use tick::TickOutcome;
