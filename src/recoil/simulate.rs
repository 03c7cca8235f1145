//! Offline replay of a pattern through the compensation formula

use serde::Serialize;

use super::formula::compensate;
use super::pattern::Sample;
use super::settings::AntiRecoilSettings;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedSample {
    pub input_dx: f64,
    pub input_dy: f64,
    pub output_dx: f64,
    pub output_dy: f64,
    pub compensation_y: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub samples: Vec<SimulatedSample>,
    pub total_input_dy: f64,
    pub total_output_dy: f64,
    pub total_compensation: f64,
    pub peak_compensation: f64,
}

impl SimulationResult {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fraction of vertical motion removed, 0 when there was none
    pub fn reduction(&self) -> f64 {
        let input = self.total_input_dy.abs();
        if input > 0.0 {
            self.total_compensation / input
        } else {
            0.0
        }
    }
}

/// Every sample is treated as an Active tick. Samples carry no timestamps, so
/// no decay is applied and the budget only ever shrinks.
pub fn simulate(samples: &[Sample], settings: &AntiRecoilSettings) -> SimulationResult {
    let settings = settings.clamped();
    let mut result = SimulationResult {
        samples: Vec::with_capacity(samples.len()),
        ..SimulationResult::default()
    };
    let mut accumulated = 0.0;

    for sample in samples {
        let out = compensate(sample.dx, sample.dy, settings.strength, &settings, accumulated);
        accumulated += out.compensation_y;

        result.total_input_dy += sample.dy;
        result.total_output_dy += out.dy;
        result.total_compensation += out.compensation_y;
        result.peak_compensation = result.peak_compensation.max(out.compensation_y);
        result.samples.push(SimulatedSample {
            input_dx: sample.dx,
            input_dy: sample.dy,
            output_dx: out.dx,
            output_dy: out.dy,
            compensation_y: out.compensation_y,
        });
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn samples(raw: &[(f64, f64)]) -> Vec<Sample> {
        raw.iter().copied().map(Sample::from).collect()
    }

    fn half_strength() -> AntiRecoilSettings {
        AntiRecoilSettings {
            enabled: true,
            strength: 0.5,
            vertical_threshold: 1.0,
            ..AntiRecoilSettings::default()
        }
    }

    #[test]
    fn reference_pattern_is_halved() {
        let pattern = samples(&[(0.0, 10.0), (2.0, 8.0), (-1.0, 12.0), (1.0, 6.0), (0.0, 4.0), (-2.0, 2.0)]);
        let result = simulate(&pattern, &half_strength());

        assert_eq!(result.samples[0].output_dy, 5.0);
        for (sim, input) in result.samples.iter().zip(&pattern) {
            assert_eq!(sim.output_dy, input.dy / 2.0);
            assert_eq!(sim.output_dx, input.dx);
        }
        assert_eq!(result.total_input_dy, 42.0);
        assert_eq!(result.total_compensation, 21.0);
        assert_eq!(result.peak_compensation, 6.0);
        assert_eq!(result.reduction(), 0.5);
    }

    #[test]
    fn sub_threshold_pattern_is_unchanged() {
        let pattern = samples(&[(0.3, 0.5), (-1.0, 0.9), (2.0, -0.4)]);
        let settings = AntiRecoilSettings {
            horizontal_compensation: 0.5,
            ..half_strength()
        };
        let result = simulate(&pattern, &settings);
        for (sim, input) in result.samples.iter().zip(&pattern) {
            assert_eq!((sim.output_dx, sim.output_dy), (input.dx, input.dy));
            assert_eq!(sim.compensation_y, 0.0);
        }
    }

    #[test]
    fn empty_pattern_gives_empty_result() {
        let result = simulate(&[], &half_strength());
        assert!(result.is_empty());
        assert_eq!(result.total_compensation, 0.0);
    }

    #[test]
    fn budget_is_never_exceeded() {
        let pattern = samples(&[(0.0, 10.0); 20]);
        let settings = AntiRecoilSettings {
            max_total_compensation: 12.0,
            ..half_strength()
        };
        let result = simulate(&pattern, &settings);
        assert_eq!(result.total_compensation, 12.0);
        assert_eq!(result.samples[3].compensation_y, 0.0);
    }
}
