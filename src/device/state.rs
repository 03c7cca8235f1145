//! Controller snapshot types shared by the tick, the mode handlers and the pads

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

pub const AXIS_MAX: i16 = i16::MAX;
pub const TRIGGER_MAX: u8 = u8::MAX;

/// Button bitset in XInput bit order
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Buttons(u16);

impl Buttons {
    pub const NONE: Buttons = Buttons(0);
    pub const DPAD_UP: Buttons = Buttons(0x0001);
    pub const DPAD_DOWN: Buttons = Buttons(0x0002);
    pub const DPAD_LEFT: Buttons = Buttons(0x0004);
    pub const DPAD_RIGHT: Buttons = Buttons(0x0008);
    pub const START: Buttons = Buttons(0x0010);
    pub const BACK: Buttons = Buttons(0x0020);
    pub const LEFT_THUMB: Buttons = Buttons(0x0040);
    pub const RIGHT_THUMB: Buttons = Buttons(0x0080);
    pub const LEFT_SHOULDER: Buttons = Buttons(0x0100);
    pub const RIGHT_SHOULDER: Buttons = Buttons(0x0200);
    pub const GUIDE: Buttons = Buttons(0x0400);
    pub const A: Buttons = Buttons(0x1000);
    pub const B: Buttons = Buttons(0x2000);
    pub const X: Buttons = Buttons(0x4000);
    pub const Y: Buttons = Buttons(0x8000);

    pub const fn from_bits(bits: u16) -> Self {
        Buttons(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, other: Buttons) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Buttons) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Buttons) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: Buttons, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for Buttons {
    type Output = Buttons;

    fn bitor(self, rhs: Buttons) -> Buttons {
        Buttons(self.0 | rhs.0)
    }
}

impl BitOrAssign for Buttons {
    fn bitor_assign(&mut self, rhs: Buttons) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Buttons {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buttons({:#06x})", self.0)
    }
}

/// One complete controller state, submitted atomically once per tick.
///
/// Sticks use the XInput convention: +x is right, +y is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ControllerStateBatch {
    pub left_x: i16,
    pub left_y: i16,
    pub right_x: i16,
    pub right_y: i16,
    pub left_trigger: u8,
    pub right_trigger: u8,
    pub buttons: Buttons,
}

impl ControllerStateBatch {
    pub const NEUTRAL: ControllerStateBatch = ControllerStateBatch {
        left_x: 0,
        left_y: 0,
        right_x: 0,
        right_y: 0,
        left_trigger: 0,
        right_trigger: 0,
        buttons: Buttons::NONE,
    };

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }

    pub fn left_magnitude(&self) -> f64 {
        f64::from(self.left_x).hypot(f64::from(self.left_y))
    }

    /// Compact one-line form for logs
    pub fn summary(&self) -> String {
        format!(
            "L:({},{}) R:({},{}) LT:{} RT:{} {:?}",
            self.left_x,
            self.left_y,
            self.right_x,
            self.right_y,
            self.left_trigger,
            self.right_trigger,
            self.buttons
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_set_operations() {
        let mut buttons = Buttons::A | Buttons::DPAD_UP;
        assert!(buttons.contains(Buttons::A));
        assert!(!buttons.contains(Buttons::B));
        buttons.set(Buttons::B, true);
        buttons.remove(Buttons::A);
        assert_eq!(buttons.bits(), 0x2001);
        buttons.set(Buttons::B, false);
        buttons.set(Buttons::DPAD_UP, false);
        assert!(buttons.is_empty());
    }

    #[test]
    fn neutral_batch_is_default() {
        assert!(ControllerStateBatch::default().is_neutral());
        let batch = ControllerStateBatch {
            right_trigger: TRIGGER_MAX,
            ..ControllerStateBatch::NEUTRAL
        };
        assert!(!batch.is_neutral());
    }
}
