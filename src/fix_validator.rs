//! Heuristic gate for GPS fixes.
//!
//! Rules are evaluated in order and the first failing rule decides the
//! verdict, so callers can log exactly why a fix was dropped.

use serde::{Deserialize, Serialize};

use crate::config::ValidatorConfig;
use crate::types::GeoPoint;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Accuracy radius above the trust limit
    PoorAccuracy,
    /// Implied speed not plausible for a runner
    SpeedSpike,
    /// Hop longer than recent speed can explain
    DistanceJump,
    /// Slow and short: standing-still jitter
    Stationary,
    /// Passed every rule but moved too little to count
    BelowMinMovement,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixVerdict {
    Accepted,
    Rejected(RejectReason),
}

impl FixVerdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, FixVerdict::Accepted)
    }
}

pub struct FixValidator {
    config: ValidatorConfig,
}

impl FixValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Decide whether `candidate` joins the track.
    ///
    /// `distance_from_last` is meters from the last accepted point,
    /// `last_speed` the GPS speed reported with that point.
    pub fn accept(
        &self,
        _candidate: &GeoPoint,
        accuracy: f64,
        _speed: f64,
        distance_from_last: f64,
        elapsed_ms_since_last: u64,
        last_speed: f64,
    ) -> FixVerdict {
        let cfg = &self.config;

        if accuracy > cfg.max_accuracy_m {
            return FixVerdict::Rejected(RejectReason::PoorAccuracy);
        }

        let implied_speed = implied_speed(distance_from_last, elapsed_ms_since_last);
        if implied_speed > cfg.max_speed_ms {
            return FixVerdict::Rejected(RejectReason::SpeedSpike);
        }

        let elapsed_secs = elapsed_ms_since_last as f64 / 1000.0;
        let max_distance = cfg
            .min_jump_allowance_m
            .max(last_speed * elapsed_secs * cfg.jump_speed_scale);
        if distance_from_last > max_distance {
            return FixVerdict::Rejected(RejectReason::DistanceJump);
        }

        if implied_speed <= cfg.stationary_speed_ms && distance_from_last < cfg.stationary_distance_m {
            return FixVerdict::Rejected(RejectReason::Stationary);
        }

        if distance_from_last <= cfg.min_movement_m {
            return FixVerdict::Rejected(RejectReason::BelowMinMovement);
        }

        FixVerdict::Accepted
    }

    /// Whether a session's first fix may anchor the track.
    pub fn accept_anchor(&self, accuracy: f64) -> FixVerdict {
        if accuracy > self.config.max_accuracy_m {
            FixVerdict::Rejected(RejectReason::PoorAccuracy)
        } else {
            FixVerdict::Accepted
        }
    }

    /// Distance credited to the session for an accepted hop
    pub fn corrected_distance(&self, distance_from_last: f64) -> f64 {
        distance_from_last * self.config.distance_correction_factor
    }
}

fn implied_speed(distance_m: f64, elapsed_ms: u64) -> f64 {
    if elapsed_ms == 0 {
        0.0
    } else {
        distance_m / elapsed_ms as f64 * 1000.0
    }
}
