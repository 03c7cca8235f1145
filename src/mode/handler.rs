use std::time::Instant;

use tracing::debug;

use super::{Mode, ModeError};
use crate::device::{ControllerStateBatch, PhysicalPoll};
use crate::input::{InputFrame, InputState, MouseButton};

/// What one tick hands to the active handler
pub struct TickContext<'a> {
    pub now: Instant,
    pub frame: &'a InputFrame,
    pub physical: &'a PhysicalPoll,
    /// Starts neutral every tick; the handler writes the whole snapshot
    pub batch: &'a mut ControllerStateBatch,
}

/// Behavior of one operating mode.
///
/// The `on_*` hooks run on the queue consumer with the input state locked and
/// must stay O(1). `update` runs on the tick. Handlers are shared between the
/// consumer, the tick and the mode service, so they take `&self`.
pub trait ModeHandler: Send + Sync {
    fn mode(&self) -> Mode;

    /// Whether captured OS events should be swallowed while this mode is active
    fn should_suppress_input(&self) -> bool;

    fn on_key(&self, state: &mut InputState, vk: u16, down: bool) {
        if state.set_key(vk, down).is_none() {
            debug!("Ignoring out-of-range key code {}", vk);
        }
    }

    fn on_mouse_button(&self, state: &mut InputState, button: MouseButton, down: bool) {
        state.set_mouse_button(button, down);
    }

    fn on_mouse_move(&self, state: &mut InputState, dx: i32, dy: i32, at: Instant) {
        state.mouse.add(dx, dy, at);
    }

    fn on_wheel(&self, _state: &mut InputState, _delta: i32) {}

    fn on_entered(&self, _previous: Option<Mode>) -> Result<(), ModeError> {
        Ok(())
    }

    fn on_exited(&self, _next: Mode) -> Result<(), ModeError> {
        Ok(())
    }

    fn update(&self, ctx: &mut TickContext<'_>) -> Result<(), ModeError>;

    fn status_text(&self) -> String;
}
