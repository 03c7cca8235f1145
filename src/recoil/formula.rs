//! The per-tick compensation formula shared by the live engine and simulation

use super::settings::AntiRecoilSettings;

/// One tick's deltas after compensation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Compensated {
    pub dx: f64,
    pub dy: f64,
    /// Magnitude removed from the vertical delta, always >= 0
    pub compensation_y: f64,
}

impl Compensated {
    pub fn passthrough(dx: f64, dy: f64) -> Self {
        Self {
            dx,
            dy,
            compensation_y: 0.0,
        }
    }
}

/// Applies one Active tick of compensation.
///
/// `settings` must already be clamped. `accumulated` is the compensation
/// spent so far this cycle and only matters when a total budget is set.
pub fn compensate(
    dx: f64,
    dy: f64,
    strength: f64,
    settings: &AntiRecoilSettings,
    accumulated: f64,
) -> Compensated {
    let dx = finite(dx);
    let dy = finite(dy);

    // Sub-threshold ticks are left entirely alone, horizontal included
    if dy.abs() < settings.vertical_threshold || dy == 0.0 {
        return Compensated::passthrough(dx, dy);
    }

    let out_dx = if settings.horizontal_compensation > 0.0 {
        dx - dx.signum() * dx.abs() * settings.horizontal_compensation
    } else {
        dx
    };

    let mut tick = dy.abs() * strength.clamp(0.0, 1.0);
    if settings.max_tick_compensation > 0.0 {
        tick = tick.min(settings.max_tick_compensation);
    }
    if settings.max_total_compensation > 0.0 {
        let remaining = (settings.max_total_compensation - accumulated).max(0.0);
        tick = tick.min(remaining);
    }

    Compensated {
        dx: out_dx,
        dy: dy - dy.signum() * tick,
        compensation_y: tick,
    }
}

fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> AntiRecoilSettings {
        AntiRecoilSettings {
            enabled: true,
            strength: 0.5,
            vertical_threshold: 1.0,
            ..AntiRecoilSettings::default()
        }
    }

    #[test]
    fn halves_vertical_motion() {
        let out = compensate(0.0, 10.0, 0.5, &settings(), 0.0);
        assert_eq!(out.dy, 5.0);
        assert_eq!(out.compensation_y, 5.0);

        let up = compensate(0.0, -8.0, 0.5, &settings(), 0.0);
        assert_eq!(up.dy, -4.0);
        assert_eq!(up.compensation_y, 4.0);
    }

    #[test]
    fn below_threshold_passes_through() {
        let out = compensate(3.0, 0.5, 0.5, &settings(), 0.0);
        assert_eq!(out, Compensated::passthrough(3.0, 0.5));
    }

    #[test]
    fn tick_cap_and_budget_limit_compensation() {
        let capped = AntiRecoilSettings {
            max_tick_compensation: 2.0,
            max_total_compensation: 10.0,
            ..settings()
        };
        assert_eq!(compensate(0.0, 10.0, 0.5, &capped, 0.0).compensation_y, 2.0);
        assert_eq!(compensate(0.0, 10.0, 0.5, &capped, 9.0).compensation_y, 1.0);
        assert_eq!(compensate(0.0, 10.0, 0.5, &capped, 12.0).compensation_y, 0.0);
    }

    #[test]
    fn horizontal_compensation_shrinks_dx() {
        let lateral = AntiRecoilSettings {
            horizontal_compensation: 0.25,
            ..settings()
        };
        assert_eq!(compensate(-8.0, 4.0, 0.5, &lateral, 0.0).dx, -6.0);
        assert_eq!(compensate(-8.0, 0.0, 0.5, &lateral, 0.0).dx, -8.0);
    }
}
