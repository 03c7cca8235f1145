use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::info;

use super::handler::{ModeHandler, TickContext};
use super::{Mode, ModeError};
use crate::device::ControllerStateBatch;
use crate::input::InputState;

/// Mirrors the physical controller 1:1. Keyboard and mouse are not mapped and
/// reach the OS normally.
#[derive(Debug, Default)]
pub struct ControllerPassHandler {
    mirroring: AtomicBool,
}

impl ControllerPassHandler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ModeHandler for ControllerPassHandler {
    fn mode(&self) -> Mode {
        Mode::ControllerPass
    }

    fn should_suppress_input(&self) -> bool {
        false
    }

    fn on_mouse_move(&self, _state: &mut InputState, _dx: i32, _dy: i32, _at: Instant) {}

    fn on_entered(&self, previous: Option<Mode>) -> Result<(), ModeError> {
        info!("Mirroring physical controller (from {:?})", previous);
        Ok(())
    }

    fn update(&self, ctx: &mut TickContext<'_>) -> Result<(), ModeError> {
        let connected = ctx.physical.connected;
        *ctx.batch = if connected {
            ctx.physical.snapshot
        } else {
            ControllerStateBatch::NEUTRAL
        };
        self.mirroring.store(connected, Ordering::Relaxed);
        Ok(())
    }

    fn status_text(&self) -> String {
        if self.mirroring.load(Ordering::Relaxed) {
            "mirroring physical controller".to_string()
        } else {
            "waiting for physical controller".to_string()
        }
    }
}
