//! Direction keys to left stick

use crate::device::AXIS_MAX;

/// Which stick directions are held this tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionKeys {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl DirectionKeys {
    /// Screen-space sum of unit contributions: left is -x, up is -y
    pub fn vector(self) -> (f64, f64) {
        let axis = |negative: bool, positive: bool| f64::from(positive as u8) - f64::from(negative as u8);
        (axis(self.left, self.right), axis(self.up, self.down))
    }
}

/// Normalizes the held directions to unit length and scales to full range.
///
/// Diagonals come out at full-scale magnitude, not full-scale times sqrt(2).
/// The returned y is up-positive, so `up` yields `+AXIS_MAX`.
pub fn left_stick_from_directions(keys: DirectionKeys) -> (i16, i16) {
    let (x, y) = keys.vector();
    let length = x.hypot(y);
    if length == 0.0 {
        return (0, 0);
    }
    let scale = f64::from(AXIS_MAX) / length;
    (round_to_axis(x * scale), round_to_axis(-y * scale))
}

/// Rounds raw axis units, saturating at the stick range
fn round_to_axis(value: f64) -> i16 {
    value
        .round()
        .clamp(-f64::from(AXIS_MAX), f64::from(AXIS_MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinal_directions_hit_full_scale() {
        let up = DirectionKeys {
            up: true,
            ..Default::default()
        };
        assert_eq!(left_stick_from_directions(up), (0, AXIS_MAX));

        let left = DirectionKeys {
            left: true,
            ..Default::default()
        };
        assert_eq!(left_stick_from_directions(left), (-AXIS_MAX, 0));
    }

    #[test]
    fn diagonal_is_normalized_to_full_scale() {
        let keys = DirectionKeys {
            up: true,
            right: true,
            ..Default::default()
        };
        let (x, y) = left_stick_from_directions(keys);
        let magnitude = f64::from(x).hypot(f64::from(y));
        assert!((magnitude - f64::from(AXIS_MAX)).abs() <= 1.0, "magnitude {magnitude}");
        assert_eq!(x, 23170);
        assert_eq!(y, 23170);
    }

    #[test]
    fn opposing_keys_cancel() {
        let keys = DirectionKeys {
            up: true,
            down: true,
            left: true,
            right: true,
        };
        assert_eq!(left_stick_from_directions(keys), (0, 0));
    }

    #[test]
    fn raw_units_round_and_saturate() {
        assert_eq!(round_to_axis(23169.7), 23170);
        assert_eq!(round_to_axis(40_000.0), AXIS_MAX);
        assert_eq!(round_to_axis(-40_000.0), -AXIS_MAX);
    }
}
