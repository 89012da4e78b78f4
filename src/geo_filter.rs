//! Scalar Kalman filter over successive lat/lng fixes.
//!
//! Both axes share one variance; the fix accuracy (meters) is used directly as
//! the measurement standard deviation, as the mobile client always has.

use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;
use crate::types::{GeoPoint, RawFix};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KalmanState {
    pub position: GeoPoint,
    pub variance: f64,
    pub initialized: bool,
}

impl Default for KalmanState {
    fn default() -> Self {
        Self {
            position: GeoPoint::new(0.0, 0.0),
            variance: 0.0,
            initialized: false,
        }
    }
}

pub struct GeoFilter {
    process_noise: f64,
    state: KalmanState,
}

impl GeoFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            process_noise: config.process_noise,
            state: KalmanState::default(),
        }
    }

    /// Predict + update with one fix; returns the filtered position.
    pub fn apply(&mut self, fix: &RawFix) -> GeoPoint {
        let measurement_var = fix.accuracy * fix.accuracy;

        if !self.state.initialized {
            self.state = KalmanState {
                position: fix.point,
                variance: measurement_var,
                initialized: true,
            };
            return fix.point;
        }

        // Predict
        self.state.variance += self.process_noise;

        // Update
        let denom = self.state.variance + measurement_var;
        let gain = if denom > 0.0 { self.state.variance / denom } else { 1.0 };

        let pos = &mut self.state.position;
        pos.latitude += gain * (fix.point.latitude - pos.latitude);
        pos.longitude += gain * (fix.point.longitude - pos.longitude);
        self.state.variance = ((1.0 - gain) * self.state.variance).max(0.0);

        self.state.position
    }

    pub fn reset(&mut self) {
        self.state = KalmanState::default();
    }

    pub fn state(&self) -> &KalmanState {
        &self.state
    }
}
