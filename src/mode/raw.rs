use tracing::debug;

use super::handler::{ModeHandler, TickContext};
use super::{Mode, ModeError};
use crate::device::ControllerStateBatch;

/// MnKConvert: keyboard and mouse go to the OS untouched and the virtual pad
/// rests at neutral
#[derive(Debug, Default)]
pub struct RawPassthroughHandler;

impl ModeHandler for RawPassthroughHandler {
    fn mode(&self) -> Mode {
        Mode::MnKConvert
    }

    fn should_suppress_input(&self) -> bool {
        false
    }

    fn on_entered(&self, previous: Option<Mode>) -> Result<(), ModeError> {
        debug!("Raw passthrough entered from {:?}", previous);
        Ok(())
    }

    fn update(&self, ctx: &mut TickContext<'_>) -> Result<(), ModeError> {
        *ctx.batch = ControllerStateBatch::NEUTRAL;
        Ok(())
    }

    fn status_text(&self) -> String {
        "keyboard and mouse pass through".to_string()
    }
}
