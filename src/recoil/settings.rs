use serde::{Deserialize, Serialize};

/// Anti-recoil configuration. Out-of-range values are clamped, never rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiRecoilSettings {
    pub enabled: bool,
    /// Fraction of the vertical delta removed per tick, 0..=1
    pub strength: f64,
    /// Vertical deltas smaller than this pass through untouched
    pub vertical_threshold: f64,
    pub activation_delay_ms: f64,
    /// Fraction of the horizontal delta removed per tick, 0..=1
    pub horizontal_compensation: f64,
    pub adaptive_compensation: bool,
    /// Per-tick cap, 0 disables
    pub max_tick_compensation: f64,
    /// Per-cycle budget, 0 disables
    pub max_total_compensation: f64,
    pub cooldown_ms: f64,
    /// Budget recovered per millisecond
    pub decay_per_ms: f64,
}

impl Default for AntiRecoilSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            strength: 0.5,
            vertical_threshold: 1.0,
            activation_delay_ms: 30.0,
            horizontal_compensation: 0.0,
            adaptive_compensation: false,
            max_tick_compensation: 0.0,
            max_total_compensation: 0.0,
            cooldown_ms: 100.0,
            decay_per_ms: 0.05,
        }
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl AntiRecoilSettings {
    pub fn clamped(&self) -> Self {
        Self {
            enabled: self.enabled,
            strength: unit(self.strength),
            vertical_threshold: non_negative(self.vertical_threshold),
            activation_delay_ms: non_negative(self.activation_delay_ms),
            horizontal_compensation: unit(self.horizontal_compensation),
            adaptive_compensation: self.adaptive_compensation,
            max_tick_compensation: non_negative(self.max_tick_compensation),
            max_total_compensation: non_negative(self.max_total_compensation),
            cooldown_ms: non_negative(self.cooldown_ms),
            decay_per_ms: non_negative(self.decay_per_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn out_of_range_values_clamp() {
        let wild = AntiRecoilSettings {
            enabled: true,
            strength: 1.7,
            vertical_threshold: -3.0,
            activation_delay_ms: f64::NAN,
            horizontal_compensation: -0.2,
            adaptive_compensation: true,
            max_tick_compensation: f64::INFINITY,
            max_total_compensation: -1.0,
            cooldown_ms: -50.0,
            decay_per_ms: 0.1,
        };

        assert_eq!(
            wild.clamped(),
            AntiRecoilSettings {
                enabled: true,
                strength: 1.0,
                vertical_threshold: 0.0,
                activation_delay_ms: 0.0,
                horizontal_compensation: 0.0,
                adaptive_compensation: true,
                max_tick_compensation: 0.0,
                max_total_compensation: 0.0,
                cooldown_ms: 0.0,
                decay_per_ms: 0.1,
            }
        );
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let settings: AntiRecoilSettings = toml::from_str("enabled = true\nstrength = 0.8").unwrap();
        assert!(settings.enabled);
        assert_eq!(settings.strength, 0.8);
        assert_eq!(settings.cooldown_ms, 100.0);
    }
}
