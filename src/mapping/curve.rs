//! Mouse delta to right stick response curve
//!
//! Per axis, in order: DPI normalization, anti-deadzone floor, expo shaping,
//! sensitivity and per-axis scale, max-speed clamp, EMA smoothing, and the
//! final conversion to i16 with Y inverted. Every step maps non-finite values
//! to zero and clamps before converting, so nothing can wrap.

use serde::{Deserialize, Serialize};

use crate::device::AXIS_MAX;

/// DPI the curve constants are tuned against
pub const REFERENCE_DPI: f64 = 800.0;

/// Accumulated counts per tick (at the reference DPI) that reach full deflection
pub const FULL_DEFLECTION_COUNTS: f64 = 40.0;

/// Normalized input below this is treated as no motion
const ACTIVATION_EPSILON: f64 = 1.0e-3;

const MAX_MULTIPLIER: f64 = 100.0;
const MAX_EMA_ALPHA: f64 = 0.99;
const MAX_ANTI_DEADZONE: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CurveSettings {
    pub sensitivity: f64,
    /// 0 is linear, 1 is fully cubic
    pub expo: f64,
    /// Minimum output once the input clears the activation epsilon
    pub anti_deadzone: f64,
    /// Output ceiling as a fraction of full deflection
    pub max_speed: f64,
    /// Weight of the previous output; 0 disables smoothing
    pub ema_alpha: f64,
    pub scale_x: f64,
    pub scale_y: f64,
}

impl Default for CurveSettings {
    fn default() -> Self {
        Self {
            sensitivity: 1.0,
            expo: 0.3,
            anti_deadzone: 0.1,
            max_speed: 1.0,
            ema_alpha: 0.5,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }
}

impl CurveSettings {
    /// Copy with every field clamped into its usable range
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        Self {
            sensitivity: bounded(self.sensitivity, 0.0, MAX_MULTIPLIER, defaults.sensitivity),
            expo: bounded(self.expo, 0.0, 1.0, defaults.expo),
            anti_deadzone: bounded(self.anti_deadzone, 0.0, MAX_ANTI_DEADZONE, defaults.anti_deadzone),
            max_speed: bounded(self.max_speed, 0.0, 1.0, defaults.max_speed),
            ema_alpha: bounded(self.ema_alpha, 0.0, MAX_EMA_ALPHA, defaults.ema_alpha),
            scale_x: bounded(self.scale_x, 0.0, MAX_MULTIPLIER, defaults.scale_x),
            scale_y: bounded(self.scale_y, 0.0, MAX_MULTIPLIER, defaults.scale_y),
        }
    }
}

fn bounded(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Stateful mapper; the EMA state survives between ticks until [`reset`](Self::reset)
#[derive(Debug, Clone)]
pub struct CurveMapper {
    settings: CurveSettings,
    dpi_scale: f64,
    smoothed: (f64, f64),
}

impl CurveMapper {
    pub fn new(settings: &CurveSettings, mouse_dpi: u32) -> Self {
        Self {
            settings: settings.sanitized(),
            dpi_scale: dpi_scale(mouse_dpi),
            smoothed: (0.0, 0.0),
        }
    }

    pub fn reconfigure(&mut self, settings: &CurveSettings, mouse_dpi: u32) {
        self.settings = settings.sanitized();
        self.dpi_scale = dpi_scale(mouse_dpi);
        self.reset();
    }

    /// Drops the smoothing history
    pub fn reset(&mut self) {
        self.smoothed = (0.0, 0.0);
    }

    pub fn settings(&self) -> &CurveSettings {
        &self.settings
    }

    /// Maps one tick of mouse motion to right-stick axes (up-positive Y)
    pub fn map(&mut self, dx: f64, dy: f64) -> (i16, i16) {
        let x = self.shape(dx, self.settings.scale_x);
        let y = self.shape(dy, self.settings.scale_y);

        let alpha = self.settings.ema_alpha;
        let (prev_x, prev_y) = self.smoothed;
        let smoothed = (
            finite_or_zero(alpha * prev_x + (1.0 - alpha) * x),
            finite_or_zero(alpha * prev_y + (1.0 - alpha) * y),
        );
        self.smoothed = smoothed;

        // Mouse +dy is down, stick +y is up
        (to_axis(smoothed.0), to_axis(-smoothed.1))
    }

    fn shape(&self, raw: f64, axis_scale: f64) -> f64 {
        let normalized =
            finite_or_zero(raw * self.dpi_scale / FULL_DEFLECTION_COUNTS).clamp(-1.0, 1.0);
        let magnitude = normalized.abs();
        if magnitude <= ACTIVATION_EPSILON {
            return 0.0;
        }

        let CurveSettings {
            sensitivity,
            expo,
            anti_deadzone,
            max_speed,
            ..
        } = self.settings;

        let floored = anti_deadzone + (1.0 - anti_deadzone) * magnitude;
        let shaped = (1.0 - expo) * floored + expo * floored.powi(3);
        let scaled = finite_or_zero(shaped * sensitivity * axis_scale);
        normalized.signum() * scaled.min(max_speed)
    }
}

fn dpi_scale(mouse_dpi: u32) -> f64 {
    if mouse_dpi == 0 {
        1.0
    } else {
        REFERENCE_DPI / f64::from(mouse_dpi)
    }
}

/// Converts a normalized value to a stick axis, saturating at +/-`AXIS_MAX`
pub fn to_axis(value: f64) -> i16 {
    let max = f64::from(AXIS_MAX);
    (finite_or_zero(value).clamp(-1.0, 1.0) * max).round() as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear() -> CurveSettings {
        CurveSettings {
            sensitivity: 1.0,
            expo: 0.0,
            anti_deadzone: 0.0,
            max_speed: 1.0,
            ema_alpha: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
        }
    }

    #[test]
    fn linear_curve_is_proportional() {
        let mut mapper = CurveMapper::new(&linear(), 800);
        assert_eq!(mapper.map(20.0, 0.0), (16384, 0));
        assert_eq!(mapper.map(40.0, 0.0), (AXIS_MAX, 0));
    }

    #[test]
    fn y_axis_is_inverted() {
        let mut mapper = CurveMapper::new(&linear(), 800);
        let (_, y) = mapper.map(0.0, 40.0);
        assert_eq!(y, -AXIS_MAX);
    }

    #[test]
    fn anti_deadzone_lifts_small_motion() {
        let settings = CurveSettings {
            anti_deadzone: 0.25,
            ..linear()
        };
        let mut mapper = CurveMapper::new(&settings, 800);
        let (x, _) = mapper.map(0.4, 0.0);
        assert!(x >= to_axis(0.25), "x = {x}");
        assert_eq!(mapper.map(0.0, 0.0), (0, 0));
    }

    #[test]
    fn max_speed_caps_output() {
        let settings = CurveSettings {
            max_speed: 0.5,
            sensitivity: 10.0,
            ..linear()
        };
        let mut mapper = CurveMapper::new(&settings, 800);
        assert_eq!(mapper.map(1_000_000.0, 0.0).0, to_axis(0.5));
    }

    #[test]
    fn ema_smooths_and_resets() {
        let settings = CurveSettings {
            ema_alpha: 0.5,
            ..linear()
        };
        let mut mapper = CurveMapper::new(&settings, 800);
        assert_eq!(mapper.map(40.0, 0.0).0, to_axis(0.5));
        assert_eq!(mapper.map(40.0, 0.0).0, to_axis(0.75));
        mapper.reset();
        assert_eq!(mapper.map(0.0, 0.0), (0, 0));
    }

    #[test]
    fn extreme_inputs_never_wrap() {
        let settings = CurveSettings {
            sensitivity: f64::INFINITY,
            scale_x: 1.0e300,
            ..linear()
        };
        let mut mapper = CurveMapper::new(&settings, 1);
        let (x, y) = mapper.map(f64::MAX, f64::NAN);
        assert_eq!(x, AXIS_MAX);
        assert_eq!(y, 0);

        let (x, _) = mapper.map(-f64::MAX, 0.0);
        assert!(x < 0);
    }

    #[test]
    fn higher_dpi_needs_more_counts() {
        let mut low = CurveMapper::new(&linear(), 800);
        let mut high = CurveMapper::new(&linear(), 1600);
        assert_eq!(low.map(10.0, 0.0).0, high.map(20.0, 0.0).0);
    }
}
