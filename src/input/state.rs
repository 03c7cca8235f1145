//! Folded input state shared between the consumer and the tick
//!
//! The consumer task is the only writer of key and button state. The tick
//! only takes a copy ([`InputFrame`]) at tick start, and it is the one place
//! the mouse accumulator gets decayed. Both run through [`SharedInput`], whose
//! critical sections are a few fixed-size copies.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use super::MouseButton;

pub const KEY_COUNT: usize = 256;

/// Motion beyond this many counts is clamped so the accumulator stays finite
const ACCUMULATOR_LIMIT: f64 = 1.0e6;

/// Pressed flags indexed by virtual-key code. Codes >= 256 are ignored.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct KeyState {
    pressed: [bool; KEY_COUNT],
}

impl KeyState {
    pub fn new() -> Self {
        Self {
            pressed: [false; KEY_COUNT],
        }
    }

    /// Returns the previous state, or `None` when the code is out of range
    pub fn set(&mut self, vk: u16, down: bool) -> Option<bool> {
        let slot = self.pressed.get_mut(vk as usize)?;
        Some(std::mem::replace(slot, down))
    }

    pub fn is_pressed(&self, vk: u16) -> bool {
        self.pressed.get(vk as usize).copied().unwrap_or(false)
    }

    pub fn pressed(&self) -> impl Iterator<Item = u16> + '_ {
        self.pressed
            .iter()
            .enumerate()
            .filter(|(_, down)| **down)
            .map(|(vk, _)| vk as u16)
    }

    pub fn clear(&mut self) {
        self.pressed = [false; KEY_COUNT];
    }
}

impl Default for KeyState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.pressed()).finish()
    }
}

/// Running mouse motion since the last tick, decayed rather than cleared
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MouseAccumulator {
    dx: f64,
    dy: f64,
    last_move: Option<Instant>,
}

impl MouseAccumulator {
    pub fn add(&mut self, dx: i32, dy: i32, at: Instant) {
        self.dx = (self.dx + f64::from(dx)).clamp(-ACCUMULATOR_LIMIT, ACCUMULATOR_LIMIT);
        self.dy = (self.dy + f64::from(dy)).clamp(-ACCUMULATOR_LIMIT, ACCUMULATOR_LIMIT);
        self.last_move = Some(at);
    }

    /// Returns the current motion and multiplies what remains by `decay`
    pub fn read_and_decay(&mut self, decay: f64) -> (f64, f64) {
        let read = (self.dx, self.dy);
        self.dx *= decay;
        self.dy *= decay;
        read
    }

    /// True when no motion arrived within `timeout`, or never
    pub fn is_idle(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_move {
            Some(at) => now.saturating_duration_since(at) > timeout,
            None => true,
        }
    }

    pub fn last_move(&self) -> Option<Instant> {
        self.last_move
    }

    pub fn motion(&self) -> (f64, f64) {
        (self.dx, self.dy)
    }

    pub fn clear(&mut self) {
        self.dx = 0.0;
        self.dy = 0.0;
    }
}

/// Wheel notches become button pulses held for a number of ticks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WheelLatch {
    up_ticks: u32,
    down_ticks: u32,
}

impl WheelLatch {
    pub fn pulse(&mut self, up: bool, ticks: u32) {
        let slot = if up {
            &mut self.up_ticks
        } else {
            &mut self.down_ticks
        };
        *slot = (*slot).max(ticks);
    }

    /// Reports which pulses are live this tick and counts them down
    pub fn consume(&mut self) -> (bool, bool) {
        let live = (self.up_ticks > 0, self.down_ticks > 0);
        self.up_ticks = self.up_ticks.saturating_sub(1);
        self.down_ticks = self.down_ticks.saturating_sub(1);
        live
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Everything the consumer folds events into
#[derive(Debug, Clone, Default)]
pub struct InputState {
    pub keys: KeyState,
    /// Latched state of keys bound as toggles
    pub toggles: KeyState,
    pub mouse: MouseAccumulator,
    pub wheel: WheelLatch,
    mouse_buttons: [bool; 5],
}

impl InputState {
    pub fn set_key(&mut self, vk: u16, down: bool) -> Option<bool> {
        self.keys.set(vk, down)
    }

    /// Flips the latch for `vk`, returns the new latched state
    pub fn flip_toggle(&mut self, vk: u16) -> Option<bool> {
        let latched = !self.toggles.is_pressed(vk);
        self.toggles.set(vk, latched).map(|_| latched)
    }

    pub fn set_mouse_button(&mut self, button: MouseButton, down: bool) {
        self.mouse_buttons[button.index()] = down;
    }

    pub fn mouse_button(&self, button: MouseButton) -> bool {
        self.mouse_buttons[button.index()]
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Copy of the folded state taken at tick start
#[derive(Debug, Clone, Copy)]
pub struct InputFrame {
    pub keys: KeyState,
    pub toggles: KeyState,
    pub mouse_buttons: [bool; 5],
    pub mouse_dx: f64,
    pub mouse_dy: f64,
    /// Set by the idle watchdog: no motion for longer than the idle timeout
    pub mouse_idle: bool,
    pub wheel_up: bool,
    pub wheel_down: bool,
    pub sampled_at: Instant,
}

impl InputFrame {
    /// A frame with nothing held and an idle mouse
    pub fn neutral(at: Instant) -> Self {
        Self {
            keys: KeyState::new(),
            toggles: KeyState::new(),
            mouse_buttons: [false; 5],
            mouse_dx: 0.0,
            mouse_dy: 0.0,
            mouse_idle: true,
            wheel_up: false,
            wheel_down: false,
            sampled_at: at,
        }
    }

    pub fn is_pressed(&self, vk: u16) -> bool {
        self.keys.is_pressed(vk)
    }

    pub fn is_toggled(&self, vk: u16) -> bool {
        self.toggles.is_pressed(vk)
    }

    pub fn mouse_button(&self, button: MouseButton) -> bool {
        self.mouse_buttons[button.index()]
    }
}

#[derive(Debug, Default)]
pub struct SharedInput {
    state: Mutex<InputState>,
}

impl SharedInput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write access for the consumer
    pub fn lock(&self) -> MutexGuard<'_, InputState> {
        self.state.lock()
    }

    /// Takes the tick snapshot: copies keys, reads and decays the mouse,
    /// applies the idle watchdog, and counts wheel pulses down.
    pub fn sample(&self, now: Instant, decay: f64, idle_timeout: Duration) -> InputFrame {
        let mut state = self.state.lock();

        let mouse_idle = state.mouse.is_idle(now, idle_timeout);
        let (mouse_dx, mouse_dy) = if mouse_idle {
            state.mouse.clear();
            (0.0, 0.0)
        } else {
            state.mouse.read_and_decay(decay)
        };
        let (wheel_up, wheel_down) = state.wheel.consume();

        InputFrame {
            keys: state.keys,
            toggles: state.toggles,
            mouse_buttons: state.mouse_buttons,
            mouse_dx,
            mouse_dy,
            mouse_idle,
            wheel_up,
            wheel_down,
            sampled_at: now,
        }
    }

    pub fn reset(&self) {
        self.state.lock().clear();
    }
}
