//! Capture-side input model
//!
//! Everything the capture layer hands to the orchestrator is an [`InputEvent`].
//! Events are queued by [`queue::EventQueue`] and folded into
//! [`state::InputState`] by the single consumer task.

pub mod queue;
pub mod state;

pub use queue::{EnqueueOutcome, EventQueue, QueuedEvent};
pub use state::{InputFrame, InputState, KeyState, MouseAccumulator, SharedInput, WheelLatch};

use serde::{Deserialize, Serialize};

/// Mouse buttons reported by the capture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

impl MouseButton {
    pub const ALL: [MouseButton; 5] = [
        MouseButton::Left,
        MouseButton::Right,
        MouseButton::Middle,
        MouseButton::X1,
        MouseButton::X2,
    ];

    pub const fn index(self) -> usize {
        match self {
            MouseButton::Left => 0,
            MouseButton::Right => 1,
            MouseButton::Middle => 2,
            MouseButton::X1 => 3,
            MouseButton::X2 => 4,
        }
    }
}

/// One discrete input event from the capture layer.
///
/// Events are produced once and consumed exactly once. The serialized form is
/// the JSON-lines format accepted by `padbridge run`:
///
/// ```json
/// {"type":"key","vk":87,"down":true}
/// {"type":"mouse_move","dx":4,"dy":-2}
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    Key { vk: u16, down: bool },
    MouseMove { dx: i32, dy: i32 },
    MouseButton { button: MouseButton, down: bool },
    Wheel { delta: i32 },
}

/// Windows virtual-key codes used by the default profile and hotkeys
pub mod vk {
    pub const BACKSPACE: u16 = 0x08;
    pub const TAB: u16 = 0x09;
    pub const ENTER: u16 = 0x0D;
    pub const SHIFT: u16 = 0x10;
    pub const CONTROL: u16 = 0x11;
    pub const ESCAPE: u16 = 0x1B;
    pub const SPACE: u16 = 0x20;
    pub const LEFT: u16 = 0x25;
    pub const UP: u16 = 0x26;
    pub const RIGHT: u16 = 0x27;
    pub const DOWN: u16 = 0x28;
    pub const A: u16 = 0x41;
    pub const C: u16 = 0x43;
    pub const D: u16 = 0x44;
    pub const E: u16 = 0x45;
    pub const F: u16 = 0x46;
    pub const Q: u16 = 0x51;
    pub const R: u16 = 0x52;
    pub const S: u16 = 0x53;
    pub const V: u16 = 0x56;
    pub const W: u16 = 0x57;
    pub const F8: u16 = 0x77;
    pub const F12: u16 = 0x7B;
}
