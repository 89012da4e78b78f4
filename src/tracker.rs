// tracker.rs: Async front end for a RunSession
//
// One task owns the session and drains a command channel in FIFO order, so
// sensor callbacks, control calls and ticks never race each other. Updates
// go out over a broadcast channel; listeners are driven from their own
// forwarding tasks and never run inside the session task.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::session::{RunResult, RunSession, RunUpdate, SessionSnapshot, TrackView};
use crate::types::{AccelSample, GeoPoint, RawFix};

// ─── Listener interface ──────────────────────────────────────────────────────

/// Presentation-layer callbacks. Every method defaults to a no-op.
pub trait RunListener: Send + Sync + 'static {
    fn on_time_update(&self, _elapsed_seconds: u64) {}
    fn on_distance_update(&self, _total_distance_meters: f64) {}
    /// `track` shares the session buffer; use `with_points` to read it without copying.
    fn on_location_update(&self, _current: GeoPoint, _track: &TrackView) {}
    fn on_step_update(&self, _step_count: u64) {}
}

fn dispatch(listener: &dyn RunListener, update: &RunUpdate) {
    match update {
        RunUpdate::Time { elapsed_seconds } => listener.on_time_update(*elapsed_seconds),
        RunUpdate::Distance { total_distance_meters } => listener.on_distance_update(*total_distance_meters),
        RunUpdate::Location { current, track } => listener.on_location_update(*current, track),
        RunUpdate::Steps { step_count } => listener.on_step_update(*step_count),
    }
}

// ─── Commands ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    Start,
    Pause,
    Resume,
    TogglePause,
    Stop,
}

type ControlReply = oneshot::Sender<TrackerResult<Option<RunResult>>>;

enum TrackerCommand {
    Fix(RawFix),
    Accel(AccelSample),
    Tick {
        at_ms: u64,
    },
    Control {
        action: ControlAction,
        at_ms: u64,
        wall: chrono::DateTime<chrono::Utc>,
        reply: ControlReply,
    },
    Snapshot {
        at_ms: u64,
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// Cloneable handle to a running tracker task.
#[derive(Clone)]
pub struct RunTracker {
    commands: mpsc::Sender<TrackerCommand>,
    updates: broadcast::Sender<RunUpdate>,
    clock: Arc<dyn Clock>,
    tick_interval_ms: u64,
}

impl RunTracker {
    /// Spawn the session task on the current tokio runtime.
    pub fn spawn(config: TrackerConfig, clock: Arc<dyn Clock>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_capacity);
        let (update_tx, _) = broadcast::channel(config.update_capacity);

        let session = RunSession::new(&config);
        tokio::spawn(session_loop(session, cmd_rx, update_tx.clone()));

        Self {
            commands: cmd_tx,
            updates: update_tx,
            clock,
            tick_interval_ms: config.tick_interval_ms,
        }
    }

    async fn send(&self, command: TrackerCommand) -> TrackerResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| TrackerError::TrackerClosed)
    }

    async fn control(&self, action: ControlAction) -> TrackerResult<Option<RunResult>> {
        let (reply, rx) = oneshot::channel();
        self.send(TrackerCommand::Control {
            action,
            at_ms: self.clock.now_ms(),
            wall: self.clock.wall_clock(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| TrackerError::TrackerClosed)?
    }

    // ── Control ──────────────────────────────────────────────────────────

    pub async fn start(&self) -> TrackerResult<()> {
        self.control(ControlAction::Start).await.map(|_| ())
    }

    pub async fn pause(&self) -> TrackerResult<()> {
        self.control(ControlAction::Pause).await.map(|_| ())
    }

    pub async fn resume(&self) -> TrackerResult<()> {
        self.control(ControlAction::Resume).await.map(|_| ())
    }

    pub async fn toggle_pause(&self) -> TrackerResult<()> {
        self.control(ControlAction::TogglePause).await.map(|_| ())
    }

    pub async fn stop(&self) -> TrackerResult<RunResult> {
        self.control(ControlAction::Stop)
            .await?
            .ok_or(TrackerError::TrackerClosed)
    }

    // ── Sensor feeds ─────────────────────────────────────────────────────

    pub async fn ingest_fix(&self, fix: RawFix) -> TrackerResult<()> {
        self.send(TrackerCommand::Fix(fix)).await
    }

    pub async fn ingest_accelerometer_sample(&self, x: f64, y: f64, z: f64, timestamp_ms: u64) -> TrackerResult<()> {
        self.send(TrackerCommand::Accel(AccelSample::new(x, y, z, timestamp_ms))).await
    }

    /// Non-blocking variant for sensor callbacks: drops the sample when the queue is full.
    pub fn try_ingest_accelerometer_sample(&self, sample: AccelSample) -> TrackerResult<()> {
        match self.commands.try_send(TrackerCommand::Accel(sample)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("Command queue full, dropping accelerometer sample at {} ms", sample.timestamp);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TrackerError::TrackerClosed),
        }
    }

    pub async fn tick(&self) -> TrackerResult<()> {
        self.send(TrackerCommand::Tick { at_ms: self.clock.now_ms() }).await
    }

    /// Tick at the configured interval until the tracker shuts down.
    pub fn spawn_ticker(&self) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(tracker.tick_interval_ms));
            loop {
                interval.tick().await;
                if tracker.tick().await.is_err() {
                    break;
                }
            }
            log::debug!("Ticker exiting");
        })
    }

    // ── Observation ──────────────────────────────────────────────────────

    pub fn updates(&self) -> broadcast::Receiver<RunUpdate> {
        self.updates.subscribe()
    }

    /// Forward every update to `listener` from a dedicated task.
    ///
    /// The task ends once the tracker and all its handles are gone.
    pub fn subscribe(&self, listener: Arc<dyn RunListener>) -> JoinHandle<()> {
        let mut rx = self.updates.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(update) => dispatch(listener.as_ref(), &update),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        log::warn!("Listener fell behind, {} updates skipped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    pub async fn snapshot(&self) -> TrackerResult<SessionSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(TrackerCommand::Snapshot {
            at_ms: self.clock.now_ms(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| TrackerError::TrackerClosed)
    }

    pub async fn is_running(&self) -> TrackerResult<bool> {
        Ok(self.snapshot().await?.state == crate::session::SessionState::Running)
    }

    pub async fn is_paused(&self) -> TrackerResult<bool> {
        Ok(self.snapshot().await?.state == crate::session::SessionState::Paused)
    }

    pub async fn get_elapsed_seconds(&self) -> TrackerResult<u64> {
        Ok(self.snapshot().await?.elapsed_seconds)
    }

    pub async fn get_step_count(&self) -> TrackerResult<u64> {
        Ok(self.snapshot().await?.step_count)
    }

    pub async fn get_total_distance(&self) -> TrackerResult<f64> {
        Ok(self.snapshot().await?.total_distance_meters)
    }

    pub async fn get_track_points(&self) -> TrackerResult<Vec<GeoPoint>> {
        Ok(self.snapshot().await?.track)
    }

    pub async fn get_start_time(&self) -> TrackerResult<Option<u64>> {
        Ok(self.snapshot().await?.start_time_ms)
    }

    pub async fn get_paused_duration(&self) -> TrackerResult<u64> {
        Ok(self.snapshot().await?.paused_duration_ms)
    }

    pub async fn get_realtime_pace(&self) -> TrackerResult<Option<f64>> {
        Ok(self.snapshot().await?.realtime_pace)
    }
}

// ─── Session task ────────────────────────────────────────────────────────────

async fn session_loop(
    mut session: RunSession,
    mut commands: mpsc::Receiver<TrackerCommand>,
    updates: broadcast::Sender<RunUpdate>,
) {
    let publish = |batch: Vec<RunUpdate>| {
        for update in batch {
            // No subscribers is fine
            let _ = updates.send(update);
        }
    };

    while let Some(command) = commands.recv().await {
        match command {
            TrackerCommand::Fix(fix) => publish(session.ingest_fix(&fix)),
            TrackerCommand::Accel(sample) => publish(session.ingest_accelerometer_sample(&sample)),
            TrackerCommand::Tick { at_ms } => publish(session.tick(at_ms)),
            TrackerCommand::Control { action, at_ms, wall, reply } => {
                let outcome = match action {
                    ControlAction::Start => session.start(at_ms).map(|batch| {
                        publish(batch);
                        None
                    }),
                    ControlAction::Pause => session.pause(at_ms).map(|_| None),
                    ControlAction::Resume => session.resume(at_ms).map(|_| None),
                    ControlAction::TogglePause => session.toggle_pause(at_ms).map(|_| None),
                    ControlAction::Stop => session.stop(at_ms, wall).map(Some),
                };
                if let Err(e) = &outcome {
                    log::warn!("{:?} rejected: {}", action, e);
                }
                let _ = reply.send(outcome);
            }
            TrackerCommand::Snapshot { at_ms, reply } => {
                let _ = reply.send(session.snapshot(at_ms));
            }
        }
    }

    log::info!("Tracker command channel closed, session task exiting");
}
