//! gilrs-backed physical controller (feature `gilrs`)

use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use tracing::{debug, error, info, warn};

use super::physical::{PhysicalController, PhysicalError, PhysicalPoll};
use super::state::{Buttons, ControllerStateBatch, AXIS_MAX, TRIGGER_MAX};

const BUTTON_MAP: [(Button, Buttons); 15] = [
    (Button::South, Buttons::A),
    (Button::East, Buttons::B),
    (Button::West, Buttons::X),
    (Button::North, Buttons::Y),
    (Button::Start, Buttons::START),
    (Button::Select, Buttons::BACK),
    (Button::Mode, Buttons::GUIDE),
    (Button::LeftTrigger, Buttons::LEFT_SHOULDER),
    (Button::RightTrigger, Buttons::RIGHT_SHOULDER),
    (Button::LeftThumb, Buttons::LEFT_THUMB),
    (Button::RightThumb, Buttons::RIGHT_THUMB),
    (Button::DPadUp, Buttons::DPAD_UP),
    (Button::DPadDown, Buttons::DPAD_DOWN),
    (Button::DPadLeft, Buttons::DPAD_LEFT),
    (Button::DPadRight, Buttons::DPAD_RIGHT),
];

pub struct GilrsController {
    gilrs: Gilrs,
    active: Option<GamepadId>,
    deadzone: f32,
}

impl GilrsController {
    pub fn new(deadzone: f32) -> Result<Self, PhysicalError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => g,
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(PhysicalError::InitializationError(e.to_string()));
            }
        };

        let mut controller = Self {
            gilrs,
            active: None,
            deadzone: deadzone.clamp(0.0, 0.95),
        };
        controller.select_first_connected();
        Ok(controller)
    }

    fn select_first_connected(&mut self) {
        self.active = self
            .gilrs
            .gamepads()
            .find(|(_, pad)| pad.is_connected())
            .map(|(id, pad)| {
                info!("Selected gamepad: {} ({})", pad.name(), id);
                id
            });
    }

    fn drain_events(&mut self) {
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => {
                    info!("Controller connected: {}", id);
                    if self.active.is_none() {
                        self.active = Some(id);
                    }
                }
                EventType::Disconnected => {
                    warn!("Controller disconnected: {}", id);
                    if self.active == Some(id) {
                        self.active = None;
                    }
                }
                _ => {}
            }
        }
    }
}

impl PhysicalController for GilrsController {
    fn poll(&mut self) -> PhysicalPoll {
        self.drain_events();
        if self.active.is_none() {
            self.select_first_connected();
        }
        let Some(id) = self.active else {
            return PhysicalPoll::DISCONNECTED;
        };

        let pad = self.gilrs.gamepad(id);
        if !pad.is_connected() {
            debug!("Active gamepad {} no longer connected", id);
            self.active = None;
            return PhysicalPoll::DISCONNECTED;
        }

        let axis = |a: Axis| axis_to_i16(apply_deadzone(pad.value(a), self.deadzone));
        let trigger = |b: Button| {
            trigger_to_u8(pad.button_data(b).map(|data| data.value()).unwrap_or(0.0))
        };

        let mut buttons = Buttons::NONE;
        for (source, target) in BUTTON_MAP {
            buttons.set(target, pad.is_pressed(source));
        }

        PhysicalPoll::connected(ControllerStateBatch {
            left_x: axis(Axis::LeftStickX),
            left_y: axis(Axis::LeftStickY),
            right_x: axis(Axis::RightStickX),
            right_y: axis(Axis::RightStickY),
            left_trigger: trigger(Button::LeftTrigger2),
            right_trigger: trigger(Button::RightTrigger2),
            buttons,
        })
    }

    fn name(&self) -> &str {
        "gilrs"
    }
}

fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    if value.abs() < deadzone {
        0.0
    } else {
        // Rescale the value to the range outside the deadzone
        value.signum() * (value.abs() - deadzone) / (1.0 - deadzone)
    }
}

fn axis_to_i16(value: f32) -> i16 {
    if !value.is_finite() {
        return 0;
    }
    (value.clamp(-1.0, 1.0) * f32::from(AXIS_MAX)).round() as i16
}

fn trigger_to_u8(value: f32) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * f32::from(TRIGGER_MAX)).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadzone_rescales_outside_values() {
        assert_eq!(apply_deadzone(0.04, 0.05), 0.0);
        assert!((apply_deadzone(1.0, 0.05) - 1.0).abs() < 1e-6);
        assert!((apply_deadzone(-0.525, 0.05) + 0.5).abs() < 1e-6);
    }

    #[test]
    fn conversions_saturate() {
        assert_eq!(axis_to_i16(2.0), AXIS_MAX);
        assert_eq!(axis_to_i16(f32::NAN), 0);
        assert_eq!(trigger_to_u8(-1.0), 0);
        assert_eq!(trigger_to_u8(1.0), TRIGGER_MAX);
    }
}
