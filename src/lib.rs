//! Run tracking core: GPS smoothing and validation, step counting and the
//! session state machine behind a single-owner async tracker.

pub mod clock;
pub mod config;
pub mod error;
pub mod fix_validator;
pub mod geo_filter;
pub mod metrics;
pub mod replay;
pub mod session;
pub mod step_detector;
pub mod tracker;
pub mod types;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::TrackerConfig;
pub use error::{TrackerError, TrackerResult};
pub use session::{RunResult, RunSession, RunUpdate, SessionSnapshot, SessionState, TrackView};
pub use tracker::{RunListener, RunTracker};
pub use types::{AccelSample, GeoPoint, RawFix};
