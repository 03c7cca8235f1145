//! Native mode: keyboard and mouse drive the virtual pad through the bound
//! profile, with anti-recoil applied to the mouse before the curve

use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::handler::{ModeHandler, TickContext};
use super::{Mode, ModeError};
use crate::device::{ControllerStateBatch, PhysicalPoll, TRIGGER_MAX};
use crate::input::{InputFrame, InputState};
use crate::mapping::{left_stick_from_directions, CurveMapper, Profile, ProfileError};
use crate::recoil::AntiRecoilEngine;

pub const DEFAULT_WHEEL_PULSE_TICKS: u32 = 8;

pub struct NativeHandler {
    profile: RwLock<Arc<Profile>>,
    curve: Mutex<CurveMapper>,
    recoil: Arc<AntiRecoilEngine>,
    wheel_pulse_ticks: u32,
}

impl NativeHandler {
    pub fn new(profile: Profile, recoil: Arc<AntiRecoilEngine>, wheel_pulse_ticks: u32) -> Self {
        let curve = CurveMapper::new(&profile.curve_settings, profile.mouse_dpi);
        Self {
            profile: RwLock::new(Arc::new(profile)),
            curve: Mutex::new(curve),
            recoil,
            wheel_pulse_ticks: wheel_pulse_ticks.max(1),
        }
    }

    pub fn profile(&self) -> Arc<Profile> {
        self.profile.read().clone()
    }

    /// Swaps in a new profile; the tick picks it up on its next run
    pub fn bind_profile(&self, profile: Profile) -> Result<(), ProfileError> {
        profile.validate()?;
        self.curve
            .lock()
            .reconfigure(&profile.curve_settings, profile.mouse_dpi);
        info!("Bound profile '{}'", profile.name);
        *self.profile.write() = Arc::new(profile);
        Ok(())
    }

    pub fn recoil(&self) -> &Arc<AntiRecoilEngine> {
        &self.recoil
    }

    /// Runs one update outside the tick
    pub fn evaluate(&self, frame: &InputFrame, now: Instant) -> Result<ControllerStateBatch, ModeError> {
        let mut batch = ControllerStateBatch::NEUTRAL;
        self.update(&mut TickContext {
            now,
            frame,
            physical: &PhysicalPoll::DISCONNECTED,
            batch: &mut batch,
        })?;
        Ok(batch)
    }
}

fn trigger(held: bool) -> u8 {
    if held {
        TRIGGER_MAX
    } else {
        0
    }
}

impl ModeHandler for NativeHandler {
    fn mode(&self) -> Mode {
        Mode::Native
    }

    fn should_suppress_input(&self) -> bool {
        true
    }

    fn on_key(&self, state: &mut InputState, vk: u16, down: bool) {
        let Some(was_down) = state.set_key(vk, down) else {
            debug!("Ignoring out-of-range key code {}", vk);
            return;
        };
        // Toggles flip on the press edge only, key repeat is ignored
        if down && !was_down && self.profile.read().is_toggle(vk) {
            if let Some(latched) = state.flip_toggle(vk) {
                debug!("Toggle key {} latched: {}", vk, latched);
            }
        }
    }

    fn on_wheel(&self, state: &mut InputState, delta: i32) {
        if delta != 0 {
            state.wheel.pulse(delta > 0, self.wheel_pulse_ticks);
        }
    }

    fn on_entered(&self, previous: Option<Mode>) -> Result<(), ModeError> {
        self.curve.lock().reset();
        self.recoil.reset();
        debug!("Native mode entered from {:?}", previous);
        Ok(())
    }

    fn update(&self, ctx: &mut TickContext<'_>) -> Result<(), ModeError> {
        let profile = self.profile();
        let held = profile.resolve(ctx.frame);
        let (left_x, left_y) = left_stick_from_directions(held.directions);

        let fire_held = held.fire_held();
        let (right_x, right_y) = {
            let mut curve = self.curve.lock();
            if ctx.frame.mouse_idle {
                // The recoil cycle still has to see fire presses without motion
                self.recoil.process(0.0, 0.0, fire_held, ctx.now);
                curve.reset();
                (0, 0)
            } else {
                let compensated =
                    self.recoil
                        .process(ctx.frame.mouse_dx, ctx.frame.mouse_dy, fire_held, ctx.now);
                curve.map(compensated.dx, compensated.dy)
            }
        };

        *ctx.batch = ControllerStateBatch {
            left_x,
            left_y,
            right_x,
            right_y,
            left_trigger: trigger(held.left_trigger),
            right_trigger: trigger(held.right_trigger),
            buttons: held.buttons,
        };
        Ok(())
    }

    fn status_text(&self) -> String {
        let snapshot = self.recoil.snapshot();
        let recoil = if snapshot.enabled {
            format!("anti-recoil {}", snapshot.phase)
        } else {
            "anti-recoil off".to_string()
        };
        format!("profile '{}', {}", self.profile.read().name, recoil)
    }
}
