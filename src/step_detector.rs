//! Step counting from raw accelerometer magnitude.
//!
//! Works on |‖a‖ - g| so the phone can sit in any orientation. A step is a
//! rise above the threshold followed by the first falling sample, gated by a
//! refractory interval. Cadence analysis is deliberately left out.

use serde::{Deserialize, Serialize};

use crate::config::StepConfig;
use crate::types::AccelSample;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDetectorState {
    pub last_delta: f64,
    pub rising: bool,
    pub last_step_timestamp: Option<u64>,
}

pub struct StepDetector {
    config: StepConfig,
    state: StepDetectorState,
    total_steps: u64,
}

impl StepDetector {
    pub fn new(config: StepConfig) -> Self {
        Self {
            config,
            state: StepDetectorState::default(),
            total_steps: 0,
        }
    }

    /// Feed one sample; returns true when a step was just counted.
    pub fn on_sample(&mut self, x: f64, y: f64, z: f64, timestamp_ms: u64) -> bool {
        let magnitude = AccelSample::new(x, y, z, timestamp_ms).magnitude();
        let delta = (magnitude - self.config.gravity).abs();
        let mut stepped = false;

        if !self.state.rising && delta > self.config.threshold && delta > self.state.last_delta {
            self.state.rising = true;
        } else if self.state.rising && delta < self.state.last_delta {
            // Peak passed
            self.state.rising = false;
            let outside_refractory = self
                .state
                .last_step_timestamp
                .map_or(true, |last| timestamp_ms.saturating_sub(last) > self.config.min_step_interval_ms);
            if outside_refractory {
                self.state.last_step_timestamp = Some(timestamp_ms);
                self.total_steps += 1;
                stepped = true;
            }
        }

        self.state.last_delta = delta;
        stepped
    }

    pub fn reset(&mut self) {
        self.state = StepDetectorState::default();
        self.total_steps = 0;
    }

    pub fn step_count(&self) -> u64 {
        self.total_steps
    }

    pub fn state(&self) -> &StepDetectorState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const G: f64 = 9.80665;
    const SAMPLE_MS: u64 = 20;
    const PULSE_MS: u64 = 300;

    /// Vertical-only signal: one half-sine pulse of `amplitude` above gravity per
    /// `period_ms`, flat gravity otherwise. Peak lands ~150 ms into each period.
    fn pulse_train(pulses: u64, period_ms: u64, amplitude: f64) -> Vec<(f64, u64)> {
        let mut samples = Vec::new();
        let mut t = 0;
        while t < pulses * period_ms {
            let phase = t % period_ms;
            let delta = if phase < PULSE_MS {
                amplitude * (PI * phase as f64 / PULSE_MS as f64).sin()
            } else {
                0.0
            };
            samples.push((G + delta, t));
            t += SAMPLE_MS;
        }
        samples
    }

    fn count_steps(detector: &mut StepDetector, samples: &[(f64, u64)]) -> u64 {
        samples
            .iter()
            .filter(|&&(z, t)| detector.on_sample(0.0, 0.0, z, t))
            .count() as u64
    }

    #[test]
    fn test_ten_spaced_peaks_count_ten_steps() {
        let mut detector = StepDetector::new(StepConfig::default());
        let steps = count_steps(&mut detector, &pulse_train(10, 600, 7.0));
        assert_eq!(steps, 10);
        assert_eq!(detector.step_count(), 10);
    }

    #[test]
    fn test_peak_inside_refractory_is_dropped() {
        // Peaks 300 ms apart: the second falls inside the 450 ms window
        let mut detector = StepDetector::new(StepConfig::default());
        let steps = count_steps(&mut detector, &pulse_train(2, 300, 7.0));
        assert_eq!(steps, 1);
    }

    #[test]
    fn test_sub_threshold_motion_ignored() {
        let mut detector = StepDetector::new(StepConfig::default());
        let steps = count_steps(&mut detector, &pulse_train(10, 600, 4.0));
        assert_eq!(steps, 0);
    }

    #[test]
    fn test_orientation_independent() {
        // Same pulse split across x and y instead of z
        let mut detector = StepDetector::new(StepConfig::default());
        let mut steps = 0;
        for (mag, t) in pulse_train(5, 600, 7.0) {
            let axis = mag / 2f64.sqrt();
            if detector.on_sample(axis, axis, 0.0, t) {
                steps += 1;
            }
        }
        assert_eq!(steps, 5);
    }

    #[test]
    fn test_first_step_counts_near_time_zero() {
        let mut detector = StepDetector::new(StepConfig::default());
        let steps = count_steps(&mut detector, &pulse_train(1, 600, 7.0));
        assert_eq!(steps, 1);
        assert!(detector.state().last_step_timestamp.unwrap() < 450);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut detector = StepDetector::new(StepConfig::default());
        count_steps(&mut detector, &pulse_train(3, 600, 7.0));
        detector.reset();
        assert_eq!(detector.step_count(), 0);
        assert_eq!(*detector.state(), StepDetectorState::default());
    }
}
