// session.rs: Run session aggregate
//
// Pure state machine: no clocks, no channels, no I/O. Callers pass the current
// monotonic time into every mutating call and receive the updates to publish
// in return, which keeps this testable with scripted timestamps and lets the
// owner publish after it has finished mutating.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use crate::config::{MetricsConfig, TrackerConfig};
use crate::error::{TrackerError, TrackerResult};
use crate::fix_validator::{FixValidator, FixVerdict};
use crate::geo_filter::GeoFilter;
use crate::metrics;
use crate::step_detector::StepDetector;
use crate::types::{encode_track, AccelSample, GeoPoint, RawFix};

// ─── Public types ────────────────────────────────────────────────────────────

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created, never started
    Idle,
    /// Counting fixes, steps and time
    Running,
    /// Session alive, inputs ignored, clock excluded
    Paused,
    /// Frozen after stop(); only start() leaves this state
    Stopped,
}

/// Notification for the presentation layer
#[derive(Clone, Debug, PartialEq)]
pub enum RunUpdate {
    Time { elapsed_seconds: u64 },
    Distance { total_distance_meters: f64 },
    Location { current: GeoPoint, track: TrackView },
    Steps { step_count: u64 },
}

/// Read-only view of the session track as it stood when the view was taken.
///
/// Views share the session's append-only buffer, so publishing a location
/// update costs one `Arc` clone regardless of track length. A restarted
/// session gets a fresh buffer; older views keep the previous run's points.
#[derive(Clone, Default)]
pub struct TrackView {
    points: Arc<RwLock<Vec<GeoPoint>>>,
    len: usize,
}

impl TrackView {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Run `f` over the visible points without copying them.
    pub fn with_points<R>(&self, f: impl FnOnce(&[GeoPoint]) -> R) -> R {
        let points = self.points.read().unwrap_or_else(PoisonError::into_inner);
        f(&points[..self.len])
    }

    pub fn last(&self) -> Option<GeoPoint> {
        self.with_points(|points| points.last().copied())
    }

    pub fn to_vec(&self) -> Vec<GeoPoint> {
        self.with_points(<[GeoPoint]>::to_vec)
    }
}

impl PartialEq for TrackView {
    fn eq(&self, other: &Self) -> bool {
        self.len == other.len && self.to_vec() == other.to_vec()
    }
}

impl fmt::Debug for TrackView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackView").field("len", &self.len).finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcceptedFix {
    pub point: GeoPoint,
    pub timestamp: u64,
    pub speed: f64,
}

/// Summary handed to persistence once a session stops
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// `YYYY-MM-DD HH:MM`, local time
    pub date: String,
    pub finished_at: DateTime<Utc>,
    pub total_distance_meters: f64,
    pub duration_seconds: u64,
    pub step_count: u64,
    pub calories_kcal: u32,
    pub pace_min_per_km: f64,
    /// `lat,lng;` pairs
    pub track: String,
}

impl RunResult {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub start_time_ms: Option<u64>,
    pub paused_duration_ms: u64,
    pub elapsed_seconds: u64,
    pub step_count: u64,
    pub total_distance_meters: f64,
    pub realtime_pace: Option<f64>,
    pub track: Vec<GeoPoint>,
}

// ─── The session ─────────────────────────────────────────────────────────────

pub struct RunSession {
    state: SessionState,

    // Timing (monotonic ms)
    start_ms: Option<u64>,
    accumulated_pause_ms: u64,
    pause_start_ms: Option<u64>,
    stopped_at_ms: Option<u64>,

    // Counters
    total_distance_m: f64,
    step_count: u64,
    track: Arc<RwLock<Vec<GeoPoint>>>,
    realtime_pace: Option<f64>,

    // GPS bookkeeping
    last_accepted: Option<AcceptedFix>,
    last_fix_timestamp: Option<u64>,

    // Collaborators
    filter: GeoFilter,
    validator: FixValidator,
    steps: StepDetector,
    metrics: MetricsConfig,
}

impl RunSession {
    pub fn new(config: &TrackerConfig) -> Self {
        Self {
            state: SessionState::Idle,
            start_ms: None,
            accumulated_pause_ms: 0,
            pause_start_ms: None,
            stopped_at_ms: None,
            total_distance_m: 0.0,
            step_count: 0,
            track: Arc::default(),
            realtime_pace: None,
            last_accepted: None,
            last_fix_timestamp: None,
            filter: GeoFilter::new(&config.filter),
            validator: FixValidator::new(config.validator.clone()),
            steps: StepDetector::new(config.steps.clone()),
            metrics: config.metrics.clone(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Idle/Stopped → Running, discarding everything from the previous session.
    pub fn start(&mut self, now_ms: u64) -> TrackerResult<Vec<RunUpdate>> {
        match self.state {
            SessionState::Idle | SessionState::Stopped => {}
            from => return Err(TrackerError::transition(from, "start")),
        }

        self.start_ms = Some(now_ms);
        self.accumulated_pause_ms = 0;
        self.pause_start_ms = None;
        self.stopped_at_ms = None;
        self.total_distance_m = 0.0;
        self.step_count = 0;
        // New buffer: views handed out for the previous run stay intact
        self.track = Arc::default();
        self.realtime_pace = None;
        self.last_accepted = None;
        self.last_fix_timestamp = None;
        self.filter.reset();
        self.steps.reset();
        self.state = SessionState::Running;

        log::info!("Run session started at {} ms", now_ms);
        Ok(vec![
            RunUpdate::Time { elapsed_seconds: 0 },
            RunUpdate::Distance { total_distance_meters: 0.0 },
        ])
    }

    /// Running → Paused. Pausing twice keeps the first pause start.
    pub fn pause(&mut self, now_ms: u64) -> TrackerResult<()> {
        match self.state {
            SessionState::Running => {
                self.pause_start_ms = Some(now_ms);
                self.state = SessionState::Paused;
                log::info!("Run session paused at {} ms", now_ms);
                Ok(())
            }
            SessionState::Paused => Ok(()),
            from => Err(TrackerError::transition(from, "pause")),
        }
    }

    /// Paused → Running, folding the pause into the accumulated total.
    ///
    /// Resuming a session that is already Running is accepted as a no-op,
    /// mirroring `pause` on a Paused session.
    pub fn resume(&mut self, now_ms: u64) -> TrackerResult<()> {
        match self.state {
            SessionState::Paused => {
                self.close_pause(now_ms);
                self.state = SessionState::Running;
                log::info!(
                    "Run session resumed at {} ms ({} ms paused in total)",
                    now_ms,
                    self.accumulated_pause_ms
                );
                Ok(())
            }
            SessionState::Running => Ok(()),
            from => Err(TrackerError::transition(from, "resume")),
        }
    }

    pub fn toggle_pause(&mut self, now_ms: u64) -> TrackerResult<()> {
        match self.state {
            SessionState::Paused => self.resume(now_ms),
            _ => self.pause(now_ms),
        }
    }

    /// Running/Paused → Stopped; returns the frozen summary.
    pub fn stop(&mut self, now_ms: u64, wall_clock: DateTime<Utc>) -> TrackerResult<RunResult> {
        match self.state {
            SessionState::Running | SessionState::Paused => {}
            from => return Err(TrackerError::transition(from, "stop")),
        }

        if self.state == SessionState::Paused {
            self.close_pause(now_ms);
        }
        self.stopped_at_ms = Some(now_ms);
        self.state = SessionState::Stopped;

        let duration_seconds = self.elapsed_seconds(now_ms);
        let result = RunResult {
            date: wall_clock.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string(),
            finished_at: wall_clock,
            total_distance_meters: self.total_distance_m,
            duration_seconds,
            step_count: self.step_count,
            calories_kcal: metrics::calories(self.total_distance_m, self.metrics.weight_kg),
            pace_min_per_km: metrics::pace_min_per_km(self.total_distance_m, duration_seconds),
            track: encode_track(&self.read_track()),
        };

        log::info!(
            "Run session stopped: {:.1} m in {} ({} steps, {} points)",
            result.total_distance_meters,
            metrics::format_duration(duration_seconds),
            result.step_count,
            self.read_track().len()
        );
        Ok(result)
    }

    fn close_pause(&mut self, now_ms: u64) {
        if let Some(paused_at) = self.pause_start_ms.take() {
            self.accumulated_pause_ms += now_ms.saturating_sub(paused_at);
        }
    }

    // ── Sensor feeds ─────────────────────────────────────────────────────

    /// Filter, validate and (maybe) append one fix. Ignored unless Running.
    pub fn ingest_fix(&mut self, fix: &RawFix) -> Vec<RunUpdate> {
        let mut updates = Vec::new();
        if self.state != SessionState::Running {
            return updates;
        }

        if !fix.is_valid() {
            log::debug!("Discarding malformed fix {:?}", fix);
            return updates;
        }
        if self.last_fix_timestamp.is_some_and(|prev| fix.timestamp <= prev) {
            log::debug!("Discarding out-of-order fix at {} ms", fix.timestamp);
            return updates;
        }
        self.last_fix_timestamp = Some(fix.timestamp);

        let Some(last) = self.last_accepted else {
            // Anchor: only accuracy can disqualify the first point, and a
            // disqualified one must not seed the filter
            if let FixVerdict::Rejected(reason) = self.validator.accept_anchor(fix.accuracy) {
                log::debug!("Anchor fix rejected: {:?} (accuracy {:.1} m)", reason, fix.accuracy);
                return updates;
            }
            let candidate = self.filter.apply(fix);
            self.accept(candidate, fix);
            updates.push(self.location_update(candidate));
            return updates;
        };

        let candidate = self.filter.apply(fix);
        let distance = last.point.distance_to(&candidate);
        let elapsed_ms = fix.timestamp - last.timestamp;
        let verdict = self.validator.accept(
            &candidate,
            fix.accuracy,
            fix.speed,
            distance,
            elapsed_ms,
            last.speed,
        );
        if let FixVerdict::Rejected(reason) = verdict {
            log::debug!(
                "Fix rejected: {:?} (hop {:.1} m over {} ms, accuracy {:.1} m)",
                reason,
                distance,
                elapsed_ms,
                fix.accuracy
            );
            return updates;
        }

        self.total_distance_m += self.validator.corrected_distance(distance);
        if let Some(pace) = metrics::realtime_pace(fix.speed, &self.metrics) {
            self.realtime_pace = Some(pace);
        }
        self.accept(candidate, fix);

        updates.push(RunUpdate::Distance { total_distance_meters: self.total_distance_m });
        updates.push(self.location_update(candidate));
        updates
    }

    fn accept(&mut self, point: GeoPoint, fix: &RawFix) {
        self.track.write().unwrap_or_else(PoisonError::into_inner).push(point);
        self.last_accepted = Some(AcceptedFix {
            point,
            timestamp: fix.timestamp,
            speed: fix.speed,
        });
    }

    fn location_update(&self, current: GeoPoint) -> RunUpdate {
        RunUpdate::Location {
            current,
            track: self.track_view(),
        }
    }

    fn read_track(&self) -> RwLockReadGuard<'_, Vec<GeoPoint>> {
        self.track.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Shared view of the current track
    pub fn track_view(&self) -> TrackView {
        TrackView {
            points: Arc::clone(&self.track),
            len: self.read_track().len(),
        }
    }

    /// Route one accelerometer sample through the step detector. Ignored unless Running.
    pub fn ingest_accelerometer_sample(&mut self, sample: &AccelSample) -> Vec<RunUpdate> {
        if self.state != SessionState::Running {
            return Vec::new();
        }
        if !sample.is_valid() {
            log::debug!("Discarding malformed accelerometer sample {:?}", sample);
            return Vec::new();
        }

        if self.steps.on_sample(sample.x, sample.y, sample.z, sample.timestamp) {
            self.step_count += 1;
            vec![RunUpdate::Steps { step_count: self.step_count }]
        } else {
            Vec::new()
        }
    }

    /// Periodic clock update. Ignored unless Running.
    pub fn tick(&mut self, now_ms: u64) -> Vec<RunUpdate> {
        if self.state != SessionState::Running {
            return Vec::new();
        }
        vec![RunUpdate::Time { elapsed_seconds: self.elapsed_seconds(now_ms) }]
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == SessionState::Paused
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn total_distance(&self) -> f64 {
        self.total_distance_m
    }

    pub fn track_points(&self) -> Vec<GeoPoint> {
        self.read_track().clone()
    }

    pub fn start_time(&self) -> Option<u64> {
        self.start_ms
    }

    /// Finished pauses only; a pause in progress is not included.
    pub fn paused_duration(&self) -> u64 {
        self.accumulated_pause_ms
    }

    pub fn realtime_pace(&self) -> Option<f64> {
        self.realtime_pace
    }

    pub fn last_accepted_fix(&self) -> Option<&AcceptedFix> {
        self.last_accepted.as_ref()
    }

    pub fn elapsed_seconds(&self, now_ms: u64) -> u64 {
        let Some(start) = self.start_ms else { return 0 };
        let now = self.stopped_at_ms.unwrap_or(now_ms);
        metrics::elapsed_seconds(now, start, self.accumulated_pause_ms, self.pause_start_ms)
    }

    pub fn snapshot(&self, now_ms: u64) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            start_time_ms: self.start_ms,
            paused_duration_ms: self.accumulated_pause_ms,
            elapsed_seconds: self.elapsed_seconds(now_ms),
            step_count: self.step_count,
            total_distance_meters: self.total_distance_m,
            realtime_pace: self.realtime_pace,
            track: self.track_points(),
        }
    }
}
