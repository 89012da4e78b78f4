// replay.rs: Offline replay of recorded sensor logs
//
// Log format (JSON, optionally gzipped):
//   { "started_at": "2024-05-01T07:30:00Z",
//     "events": [ {"type": "start", "t": 0},
//                 {"type": "fix", "t": 1000, "lat": .., "lng": .., "accuracy": .., "speed": ..},
//                 {"type": "accel", "t": 1020, "x": .., "y": .., "z": ..},
//                 {"type": "stop", "t": 90000} ] }
//
// `t` is monotonic milliseconds and doubles as the sample timestamp.

use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::clock::{Clock, ManualClock};
use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::session::{RunResult, RunSession, RunUpdate, SessionState};
use crate::types::{AccelSample, RawFix};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayEvent {
    Start { t: u64 },
    Pause { t: u64 },
    Resume { t: u64 },
    TogglePause { t: u64 },
    Stop { t: u64 },
    Tick { t: u64 },
    Fix { t: u64, lat: f64, lng: f64, accuracy: f64, speed: f64 },
    Accel { t: u64, x: f64, y: f64, z: f64 },
}

impl ReplayEvent {
    pub fn time_ms(&self) -> u64 {
        match *self {
            ReplayEvent::Start { t }
            | ReplayEvent::Pause { t }
            | ReplayEvent::Resume { t }
            | ReplayEvent::TogglePause { t }
            | ReplayEvent::Stop { t }
            | ReplayEvent::Tick { t }
            | ReplayEvent::Fix { t, .. }
            | ReplayEvent::Accel { t, .. } => t,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayLog {
    /// Wall-clock time of `t = 0`; defaults to now
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    pub events: Vec<ReplayEvent>,
}

/// Load a replay log; `.gz` files are decompressed on the fly.
pub fn load_log(path: &Path) -> TrackerResult<ReplayLog> {
    let file = File::open(path)?;
    let log = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
    } else {
        serde_json::from_reader(BufReader::new(file))?
    };
    Ok(log)
}

#[derive(Clone, Debug, Default)]
pub struct ReplayStats {
    pub fixes: usize,
    pub accel_samples: usize,
    pub updates: usize,
    pub rejected_controls: usize,
}

/// Drive a fresh session through `log` and return the summary of the last run.
///
/// A run still open when the log ends is stopped at the last event time.
pub fn replay(log: &ReplayLog, config: &TrackerConfig) -> TrackerResult<(RunResult, ReplayStats)> {
    let clock = ManualClock::with_wall_origin(0, log.started_at.unwrap_or_else(Utc::now));
    let mut session = RunSession::new(config);
    let mut stats = ReplayStats::default();
    let mut last_result = None;

    let mut count = |updates: Vec<RunUpdate>| stats.updates += updates.len();

    for event in &log.events {
        let t = event.time_ms();
        clock.set(t);

        let control = match *event {
            ReplayEvent::Start { .. } => Some(session.start(t).map(&mut count)),
            ReplayEvent::Pause { .. } => Some(session.pause(t)),
            ReplayEvent::Resume { .. } => Some(session.resume(t)),
            ReplayEvent::TogglePause { .. } => Some(session.toggle_pause(t)),
            ReplayEvent::Stop { .. } => Some(session.stop(t, clock.wall_clock()).map(|result| {
                last_result = Some(result);
            })),
            ReplayEvent::Tick { .. } => {
                count(session.tick(t));
                None
            }
            ReplayEvent::Fix { lat, lng, accuracy, speed, .. } => {
                stats.fixes += 1;
                count(session.ingest_fix(&RawFix::new(lat, lng, accuracy, speed, t)));
                None
            }
            ReplayEvent::Accel { x, y, z, .. } => {
                stats.accel_samples += 1;
                count(session.ingest_accelerometer_sample(&AccelSample::new(x, y, z, t)));
                None
            }
        };

        if let Some(Err(e)) = control {
            log::warn!("Replay event at {} ms ignored: {}", t, e);
            stats.rejected_controls += 1;
        }
    }

    if matches!(session.state(), SessionState::Running | SessionState::Paused) {
        let t = log.events.last().map(ReplayEvent::time_ms).unwrap_or(0);
        log::info!("Log ended mid-run, stopping at {} ms", t);
        last_result = Some(session.stop(t, clock.wall_clock())?);
    }

    let result = last_result.ok_or_else(|| TrackerError::Config("replay log contains no completed run".into()))?;
    Ok((result, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const TEN_METERS_LAT: f64 = 10.0 / (6_371_008.8 * std::f64::consts::PI / 180.0);

    fn sample_log() -> ReplayLog {
        let fix = |t: u64, meters: f64| ReplayEvent::Fix {
            t,
            lat: 40.0 + TEN_METERS_LAT * meters / 10.0,
            lng: -120.0,
            accuracy: 5.0,
            speed: 3.0,
        };
        ReplayLog {
            started_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 7, 30, 0).unwrap()),
            events: vec![
                ReplayEvent::Start { t: 0 },
                fix(1_000, 0.0),
                fix(2_000, 10.0),
                fix(3_000, 20.0),
                ReplayEvent::Tick { t: 3_000 },
                ReplayEvent::Stop { t: 60_000 },
            ],
        }
    }

    #[test]
    fn test_replay_complete_run() {
        let (result, stats) = replay(&sample_log(), &TrackerConfig::default()).unwrap();
        assert_eq!(stats.fixes, 3);
        assert_eq!(stats.rejected_controls, 0);
        // start(2) + anchor(1) + two accepted fixes(2 each) + tick(1)
        assert_eq!(stats.updates, 8);
        assert_eq!(result.duration_seconds, 60);
        assert!((result.total_distance_meters - 20.0).abs() < 1e-3);
        assert_eq!(
            result.finished_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 7, 31, 0).unwrap()
        );
    }

    #[test]
    fn test_replay_stops_open_run() {
        let mut log = sample_log();
        log.events.pop();
        let (result, _) = replay(&log, &TrackerConfig::default()).unwrap();
        assert_eq!(result.duration_seconds, 3);
    }

    #[test]
    fn test_replay_counts_rejected_controls() {
        let mut log = sample_log();
        log.events.insert(0, ReplayEvent::Resume { t: 0 });
        let (_, stats) = replay(&log, &TrackerConfig::default()).unwrap();
        assert_eq!(stats.rejected_controls, 1);
    }

    #[test]
    fn test_replay_without_run_fails() {
        let log = ReplayLog::default();
        assert!(replay(&log, &TrackerConfig::default()).is_err());
    }

    #[test]
    fn test_event_json_shape() {
        let json = r#"{"events": [
            {"type": "start", "t": 0},
            {"type": "toggle_pause", "t": 5},
            {"type": "accel", "t": 7, "x": 0.0, "y": 0.0, "z": 9.8}
        ]}"#;
        let log: ReplayLog = serde_json::from_str(json).unwrap();
        assert_eq!(log.started_at, None);
        assert_eq!(log.events[1], ReplayEvent::TogglePause { t: 5 });
        assert_eq!(log.events[2].time_ms(), 7);
    }

    #[test]
    fn test_load_gzipped_log() {
        let log = sample_log();
        let path = std::env::temp_dir().join(format!("run_tracker_replay_{}.json.gz", std::process::id()));
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(serde_json::to_string(&log).unwrap().as_bytes()).unwrap();
        encoder.finish().unwrap();

        let loaded = load_log(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded.started_at, log.started_at);
        assert_eq!(loaded.events.len(), log.events.len());
        assert_eq!(loaded.events[5], ReplayEvent::Stop { t: 60_000 });
    }
}
