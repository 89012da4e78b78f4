use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{TrackerError, TrackerResult};

// ─── Sub-configs ─────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Variance added per predict step (degrees², applied per fix)
    pub process_noise: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self { process_noise: 1e-5 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub max_accuracy_m: f64,
    pub max_speed_ms: f64,
    pub min_jump_allowance_m: f64,
    pub jump_speed_scale: f64,
    pub stationary_speed_ms: f64,
    pub stationary_distance_m: f64,
    pub min_movement_m: f64,
    /// Empirical multiplier on filtered hop length. Filtering shortens the
    /// path; 2.0 was tuned by hand and should be recalibrated against ground truth.
    /// With equal accuracies the filter roughly halves each hop, so a straight
    /// 20 m walk over three fixes totals about 20 m, not 40 m.
    pub distance_correction_factor: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_accuracy_m: 25.0,
            max_speed_ms: 12.0,
            min_jump_allowance_m: 30.0,
            jump_speed_scale: 1.5,
            stationary_speed_ms: 0.3,
            stationary_distance_m: 2.0,
            min_movement_m: 1.0,
            distance_correction_factor: 2.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Peak delta above gravity that arms the detector (m/s²)
    pub threshold: f64,
    pub gravity: f64,
    pub min_step_interval_ms: u64,
}

impl Default for StepConfig {
    fn default() -> Self {
        Self {
            threshold: 5.0,
            gravity: 9.80665,
            min_step_interval_ms: 450,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub weight_kg: f64,
    pub realtime_pace_min_speed_ms: f64,
    pub min_pace_min_per_km: f64,
    pub max_pace_min_per_km: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            weight_kg: 70.0,
            realtime_pace_min_speed_ms: 0.5,
            min_pace_min_per_km: 2.0,
            max_pace_min_per_km: 30.0,
        }
    }
}

// ─── Top-level config ────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub filter: FilterConfig,
    pub validator: ValidatorConfig,
    pub steps: StepConfig,
    pub metrics: MetricsConfig,

    // ── Event loop ──
    pub tick_interval_ms: u64,
    pub command_capacity: usize,
    pub update_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            filter: FilterConfig::default(),
            validator: ValidatorConfig::default(),
            steps: StepConfig::default(),
            metrics: MetricsConfig::default(),
            tick_interval_ms: 1000,
            command_capacity: 1024,
            update_capacity: 256,
        }
    }
}

impl TrackerConfig {
    /// Load from a JSON file; missing keys fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> TrackerResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: TrackerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        log::info!("Loaded tracker config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> TrackerResult<()> {
        let non_negative = [
            ("filter.process_noise", self.filter.process_noise),
            ("validator.max_accuracy_m", self.validator.max_accuracy_m),
            ("validator.max_speed_ms", self.validator.max_speed_ms),
            ("validator.min_jump_allowance_m", self.validator.min_jump_allowance_m),
            ("validator.jump_speed_scale", self.validator.jump_speed_scale),
            ("validator.min_movement_m", self.validator.min_movement_m),
            ("validator.distance_correction_factor", self.validator.distance_correction_factor),
            ("steps.threshold", self.steps.threshold),
            ("metrics.weight_kg", self.metrics.weight_kg),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(TrackerError::Config(format!("{name} must be a finite value >= 0, got {value}")));
            }
        }
        if self.metrics.min_pace_min_per_km > self.metrics.max_pace_min_per_km {
            return Err(TrackerError::Config("metrics.min_pace_min_per_km exceeds max_pace_min_per_km".into()));
        }
        if self.tick_interval_ms == 0 {
            return Err(TrackerError::Config("tick_interval_ms must be > 0".into()));
        }
        if self.command_capacity == 0 || self.update_capacity == 0 {
            return Err(TrackerError::Config("channel capacities must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrackerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.validator.distance_correction_factor, 2.0);
        assert_eq!(config.steps.min_step_interval_ms, 450);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: TrackerConfig =
            serde_json::from_str(r#"{"metrics": {"weight_kg": 82.5}, "tick_interval_ms": 500}"#).unwrap();
        assert_eq!(config.metrics.weight_kg, 82.5);
        assert_eq!(config.metrics.max_pace_min_per_km, 30.0);
        assert_eq!(config.tick_interval_ms, 500);
        assert_eq!(config.validator, ValidatorConfig::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = TrackerConfig::default();
        config.validator.distance_correction_factor = -1.0;
        assert!(matches!(config.validate(), Err(TrackerError::Config(_))));

        let mut config = TrackerConfig::default();
        config.tick_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join(format!("run_tracker_config_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"validator": {"distance_correction_factor": 1.0}}"#).unwrap();
        let config = TrackerConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.validator.distance_correction_factor, 1.0);
        assert_eq!(config.validator.max_accuracy_m, 25.0);
    }

    #[test]
    fn test_from_missing_file() {
        let result = TrackerConfig::from_file("/nonexistent/run_tracker.json");
        assert!(matches!(result, Err(TrackerError::Io(_))));
    }
}
