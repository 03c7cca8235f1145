//! Mapping profile: which key or mouse button drives which controller input
//!
//! Profiles are stored as JSON:
//!
//! ```json
//! {
//!   "name": "default",
//!   "mouseDpi": 800,
//!   "keyboardMap": { "87": "LeftStickUp", "32": "A" },
//!   "curveSettings": { "sensitivity": 1.0, "expo": 0.3 },
//!   "mouseMap": { "Left": "RightTrigger" },
//!   "toggleKeys": [86],
//!   "wheelUp": "Y"
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::curve::CurveSettings;
use super::stick::DirectionKeys;
use crate::device::Buttons;
use crate::input::{vk, InputFrame, MouseButton};

pub const DEFAULT_MOUSE_DPI: u32 = 800;
pub const MAX_MOUSE_DPI: u32 = 64_000;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Failed to access profile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse profile: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid profile: {0}")]
    Invalid(String),
}

/// Controller input a key or mouse button can be bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ControllerInput {
    A,
    B,
    X,
    Y,
    LeftShoulder,
    RightShoulder,
    Back,
    Start,
    Guide,
    LeftThumb,
    RightThumb,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
    LeftTrigger,
    RightTrigger,
    LeftStickUp,
    LeftStickDown,
    LeftStickLeft,
    LeftStickRight,
}

impl ControllerInput {
    pub fn button(self) -> Option<Buttons> {
        let button = match self {
            ControllerInput::A => Buttons::A,
            ControllerInput::B => Buttons::B,
            ControllerInput::X => Buttons::X,
            ControllerInput::Y => Buttons::Y,
            ControllerInput::LeftShoulder => Buttons::LEFT_SHOULDER,
            ControllerInput::RightShoulder => Buttons::RIGHT_SHOULDER,
            ControllerInput::Back => Buttons::BACK,
            ControllerInput::Start => Buttons::START,
            ControllerInput::Guide => Buttons::GUIDE,
            ControllerInput::LeftThumb => Buttons::LEFT_THUMB,
            ControllerInput::RightThumb => Buttons::RIGHT_THUMB,
            ControllerInput::DPadUp => Buttons::DPAD_UP,
            ControllerInput::DPadDown => Buttons::DPAD_DOWN,
            ControllerInput::DPadLeft => Buttons::DPAD_LEFT,
            ControllerInput::DPadRight => Buttons::DPAD_RIGHT,
            _ => return None,
        };
        Some(button)
    }
}

/// Controller inputs held in one frame, after resolving bindings and toggles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedInputs {
    pub buttons: Buttons,
    pub left_trigger: bool,
    pub right_trigger: bool,
    pub directions: DirectionKeys,
}

impl ResolvedInputs {
    fn hold(&mut self, input: ControllerInput) {
        if let Some(button) = input.button() {
            self.buttons.insert(button);
            return;
        }
        match input {
            ControllerInput::LeftTrigger => self.left_trigger = true,
            ControllerInput::RightTrigger => self.right_trigger = true,
            ControllerInput::LeftStickUp => self.directions.up = true,
            ControllerInput::LeftStickDown => self.directions.down = true,
            ControllerInput::LeftStickLeft => self.directions.left = true,
            ControllerInput::LeftStickRight => self.directions.right = true,
            _ => {}
        }
    }

    /// True while anything bound to the right trigger is held
    pub fn fire_held(&self) -> bool {
        self.right_trigger
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub name: String,
    #[serde(default = "default_mouse_dpi")]
    pub mouse_dpi: u32,
    #[serde(default)]
    pub keyboard_map: BTreeMap<u16, ControllerInput>,
    #[serde(default)]
    pub curve_settings: CurveSettings,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mouse_map: BTreeMap<MouseButton, ControllerInput>,
    /// Keys whose binding latches on press and releases on the next press
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub toggle_keys: BTreeSet<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheel_up: Option<ControllerInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wheel_down: Option<ControllerInput>,
}

fn default_mouse_dpi() -> u32 {
    DEFAULT_MOUSE_DPI
}

impl Default for Profile {
    fn default() -> Self {
        Self::default_profile()
    }
}

impl Profile {
    /// WASD movement, mouse aim, left click fires
    pub fn default_profile() -> Self {
        use ControllerInput as C;

        let keyboard_map = BTreeMap::from([
            (vk::W, C::LeftStickUp),
            (vk::S, C::LeftStickDown),
            (vk::A, C::LeftStickLeft),
            (vk::D, C::LeftStickRight),
            (vk::SPACE, C::A),
            (vk::C, C::B),
            (vk::R, C::X),
            (vk::F, C::Y),
            (vk::Q, C::LeftShoulder),
            (vk::E, C::RightShoulder),
            (vk::SHIFT, C::LeftThumb),
            (vk::V, C::RightThumb),
            (vk::TAB, C::Back),
            (vk::ESCAPE, C::Start),
            (vk::UP, C::DPadUp),
            (vk::DOWN, C::DPadDown),
            (vk::LEFT, C::DPadLeft),
            (vk::RIGHT, C::DPadRight),
        ]);
        let mouse_map = BTreeMap::from([
            (MouseButton::Left, C::RightTrigger),
            (MouseButton::Right, C::LeftTrigger),
            (MouseButton::Middle, C::RightThumb),
        ]);

        Self {
            name: "default".to_string(),
            mouse_dpi: DEFAULT_MOUSE_DPI,
            keyboard_map,
            curve_settings: CurveSettings::default(),
            mouse_map,
            toggle_keys: BTreeSet::new(),
            wheel_up: Some(C::Y),
            wheel_down: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ProfileError> {
        let profile: Profile = serde_json::from_str(json)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn to_json(&self) -> Result<String, ProfileError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        debug!("Loading profile from {}", path.display());
        let content = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let profile = Self::from_json(&content)?;
        info!(
            "Loaded profile '{}' ({} key bindings, {} DPI)",
            profile.name,
            profile.keyboard_map.len(),
            profile.mouse_dpi
        );
        Ok(profile)
    }

    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        self.validate()?;
        let io_error = |source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }
        fs::write(path, self.to_json()?).map_err(io_error)?;
        info!("Saved profile '{}' to {}", self.name, path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.name.trim().is_empty() {
            return Err(ProfileError::Invalid("profile name is empty".to_string()));
        }
        if !(1..=MAX_MOUSE_DPI).contains(&self.mouse_dpi) {
            return Err(ProfileError::Invalid(format!(
                "mouse DPI {} outside 1..={}",
                self.mouse_dpi, MAX_MOUSE_DPI
            )));
        }
        Ok(())
    }

    /// The input the key currently drives, honoring toggle latches
    fn key_held(&self, frame: &InputFrame, key: u16) -> bool {
        if self.toggle_keys.contains(&key) {
            frame.is_toggled(key)
        } else {
            frame.is_pressed(key)
        }
    }

    pub fn is_toggle(&self, key: u16) -> bool {
        self.toggle_keys.contains(&key)
    }

    /// Resolves every binding against one input frame
    pub fn resolve(&self, frame: &InputFrame) -> ResolvedInputs {
        let mut held = ResolvedInputs::default();

        for (&key, &input) in &self.keyboard_map {
            if self.key_held(frame, key) {
                held.hold(input);
            }
        }
        for (&button, &input) in &self.mouse_map {
            if frame.mouse_button(button) {
                held.hold(input);
            }
        }
        if frame.wheel_up {
            if let Some(input) = self.wheel_up {
                held.hold(input);
            }
        }
        if frame.wheel_down {
            if let Some(input) = self.wheel_down {
                held.hold(input);
            }
        }

        held
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Instant;

    #[test]
    fn documented_json_round_trips() {
        let json = r#"{
            "name": "shooter",
            "mouseDpi": 1600,
            "keyboardMap": { "87": "LeftStickUp", "32": "A" },
            "curveSettings": {
                "sensitivity": 1.5, "expo": 0.2, "antiDeadzone": 0.05,
                "maxSpeed": 0.9, "emaAlpha": 0.4, "scaleX": 1.0, "scaleY": 0.8
            },
            "mouseMap": { "Left": "RightTrigger" },
            "toggleKeys": [86],
            "wheelDown": "DPadDown"
        }"#;

        let profile = Profile::from_json(json).unwrap();
        assert_eq!(profile.mouse_dpi, 1600);
        assert_eq!(profile.keyboard_map.get(&vk::W), Some(&ControllerInput::LeftStickUp));
        assert_eq!(profile.curve_settings.scale_y, 0.8);
        assert_eq!(profile.wheel_down, Some(ControllerInput::DPadDown));
        assert!(profile.is_toggle(vk::V));

        let reparsed = Profile::from_json(&profile.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, profile);
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let profile = Profile::from_json(r#"{"name":"bare"}"#).unwrap();
        assert_eq!(profile.mouse_dpi, DEFAULT_MOUSE_DPI);
        assert_eq!(profile.curve_settings, CurveSettings::default());
        assert!(profile.keyboard_map.is_empty());
    }

    #[test]
    fn invalid_profiles_are_rejected() {
        assert!(matches!(
            Profile::from_json(r#"{"name":"  "}"#),
            Err(ProfileError::Invalid(_))
        ));
        assert!(matches!(
            Profile::from_json(r#"{"name":"x","mouseDpi":0}"#),
            Err(ProfileError::Invalid(_))
        ));
        assert!(matches!(Profile::from_json("{"), Err(ProfileError::Parse(_))));
    }

    #[test]
    fn resolve_maps_keys_buttons_and_wheel() {
        let profile = Profile::default_profile();
        let mut frame = InputFrame::neutral(Instant::now());
        frame.keys.set(vk::W, true);
        frame.keys.set(vk::SPACE, true);
        frame.mouse_buttons[MouseButton::Left.index()] = true;
        frame.wheel_up = true;

        let held = profile.resolve(&frame);
        assert!(held.directions.up);
        assert!(held.buttons.contains(Buttons::A | Buttons::Y));
        assert!(held.fire_held());
        assert!(!held.left_trigger);
    }

    #[test]
    fn toggle_keys_follow_the_latch() {
        let mut profile = Profile::default_profile();
        profile.toggle_keys.insert(vk::SHIFT);

        let mut frame = InputFrame::neutral(Instant::now());
        frame.keys.set(vk::SHIFT, true);
        assert!(!profile.resolve(&frame).buttons.contains(Buttons::LEFT_THUMB));

        frame.keys.set(vk::SHIFT, false);
        frame.toggles.set(vk::SHIFT, true);
        assert!(profile.resolve(&frame).buttons.contains(Buttons::LEFT_THUMB));
    }

    #[test]
    fn save_and_load_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles").join("default.json");
        let profile = Profile::default_profile();
        profile.save(&path).unwrap();
        assert_eq!(Profile::load(&path).unwrap(), profile);
    }
}
