//! Telemetry hub.
//!
//! Owns everything that lives for one connected session: counter state, the
//! power smoother, the command sequencer, the running workout and its
//! recording. The BLE link feeds it notifications and write completions; a
//! 1 Hz timer calls [`TelemetryHub::tick`]. Every method that can produce a
//! control point write returns it, and the caller performs the write.

use crate::metrics::smoothing::{estimate_speed_from_power, PowerSmoother};
use crate::recording::recorder::RideRecorder;
use crate::recording::types::{RecordingStatus, RideSample, RideSummary};
use crate::sensors::control::{CommandSequencer, ControlCommand};
use crate::sensors::counters::{CounterConfig, CounterDifferencer, MAX_PLAUSIBLE_SPEED_KMH};
use crate::sensors::ftms::{
    decode_frame, parse_control_point_response, CharacteristicKind, ControlResponse,
    ControlResult, TelemetryFrame,
};
use crate::sensors::types::{ConnectionState, ControlError};
use crate::storage::config::AppConfig;
use crate::workouts::engine::{GradientCurve, WorkoutEngine};
use crate::workouts::types::{Target, Workout, WorkoutError, WorkoutStatus};
use crossbeam::channel::{Receiver, Sender};

/// Live values shown to the rider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub connection: ConnectionState,
    /// Smoothed power in watts
    pub power_watts: u16,
    pub cadence_rpm: u16,
    pub speed_kmh: f32,
    /// `speed_kmh` is a power-based estimate, not a measurement
    pub speed_estimated: bool,
    /// 0 when no heart rate has been reported
    pub heart_rate_bpm: u8,
    /// Never decreases within a session; clamped to the track length on
    /// track workouts
    pub accumulated_distance_m: f64,
    pub elapsed_s: u32,
    pub workout_status: WorkoutStatus,
    /// Last target handed to the sequencer
    pub target: Option<Target>,
}

/// Notifications for whoever displays the session.
#[derive(Debug, Clone)]
pub enum HubEvent {
    /// Snapshot after each tick
    Tick(SessionState),
    ConnectionChanged(ConnectionState),
    TargetChanged(Target),
    WorkoutStatusChanged(WorkoutStatus),
    ControlResponse(ControlResponse),
    RideFinished(RideSummary),
}

/// Hub settings, usually taken from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub counters: CounterConfig,
    pub power_smoothing_alpha: f32,
    pub estimate_speed_from_power: bool,
    pub gradient_curve: GradientCurve,
    /// Written once after each connection, before any target
    pub setup_commands: Vec<ControlCommand>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl HubSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            counters: config.counter_config(),
            power_smoothing_alpha: config.conditioning.power_smoothing_alpha,
            estimate_speed_from_power: config.conditioning.estimate_speed_from_power,
            gradient_curve: config.workout.gradient_curve,
            setup_commands: vec![
                ControlCommand::SetWheelCircumference(
                    config.sensors.peripheral_circumference_tenth_mm(),
                ),
                ControlCommand::StartOrResume,
            ],
        }
    }
}

/// Speed used for distance: anything outside (0, 100) km/h counts as standing still.
fn valid_speed_kmh(speed: f32) -> f64 {
    let speed = speed as f64;
    if speed > 0.0 && speed < MAX_PLAUSIBLE_SPEED_KMH {
        speed
    } else {
        0.0
    }
}

/// The single mutable session object.
#[derive(Debug)]
pub struct TelemetryHub {
    settings: HubSettings,
    state: SessionState,
    counters: CounterDifferencer,
    smoother: PowerSmoother,
    sequencer: CommandSequencer,
    engine: WorkoutEngine,
    recorder: RideRecorder,
    /// Trainer has reported speed at least once this session
    speed_reported: bool,
    event_tx: Option<Sender<HubEvent>>,
}

impl TelemetryHub {
    pub fn new(settings: HubSettings) -> Self {
        Self {
            counters: CounterDifferencer::new(settings.counters),
            smoother: PowerSmoother::new(settings.power_smoothing_alpha),
            engine: WorkoutEngine::new(settings.gradient_curve),
            settings,
            state: SessionState::default(),
            sequencer: CommandSequencer::new(),
            recorder: RideRecorder::new(),
            speed_reported: false,
            event_tx: None,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(HubSettings::default())
    }

    /// Get a receiver for hub events.
    pub fn event_receiver(&mut self) -> Receiver<HubEvent> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.event_tx = Some(tx);
        rx
    }

    fn emit(&self, event: HubEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Link is being established.
    pub fn on_connecting(&mut self) {
        self.state.connection = ConnectionState::Connecting;
        self.emit(HubEvent::ConnectionChanged(ConnectionState::Connecting));
    }

    /// Link is up and subscribed. Starts a fresh session and queues the
    /// setup writes. Returns the first write to issue.
    pub fn on_connected(&mut self) -> Option<ControlCommand> {
        self.reset_session();
        self.state.connection = ConnectionState::Connected;
        tracing::info!("Trainer session started");
        self.emit(HubEvent::ConnectionChanged(ConnectionState::Connected));

        let mut next = self.sequencer.queue_setup(self.settings.setup_commands.clone());

        // A workout loaded before the link came up gets its first target now.
        if self.engine.status() == WorkoutStatus::InProgress {
            if let Some(target) = self.engine.evaluate(0, 0.0) {
                next = next.or(self.command(target));
            }
        }
        next
    }

    /// Link dropped. All per-session state is discarded; a running workout
    /// is stopped and its recording finished.
    pub fn on_disconnected(&mut self) {
        if self.state.connection == ConnectionState::Disconnected {
            return;
        }

        if self.engine.is_active() {
            if let Err(e) = self.engine.stop() {
                tracing::warn!("Failed to stop workout on disconnect: {}", e);
            }
            self.finish_recording();
            self.emit(HubEvent::WorkoutStatusChanged(self.engine.status()));
        }

        self.reset_session();
        tracing::info!("Trainer session ended");
        self.emit(HubEvent::ConnectionChanged(ConnectionState::Disconnected));
    }

    fn reset_session(&mut self) {
        self.counters.reset();
        self.smoother.reset();
        self.sequencer.reset();
        self.engine.forget_commanded();
        self.speed_reported = false;
        self.state = SessionState {
            workout_status: self.engine.status(),
            ..Default::default()
        };
    }

    /// Handle a telemetry notification.
    pub fn on_notification(&mut self, kind: CharacteristicKind, data: &[u8]) {
        if self.state.connection != ConnectionState::Connected {
            tracing::debug!(%kind, "Ignoring notification while not connected");
            return;
        }

        match decode_frame(kind, data) {
            Ok(frame) => self.apply_frame(&frame),
            Err(e) => tracing::warn!("Dropping frame: {}", e),
        }
    }

    fn apply_frame(&mut self, frame: &TelemetryFrame) {
        if let Some(power) = frame.power_watts {
            self.state.power_watts = self.smoother.update(power);
        }
        if let Some(cadence) = frame.cadence_rpm {
            self.state.cadence_rpm = cadence;
        }
        if let Some(hr) = frame.heart_rate_bpm {
            self.state.heart_rate_bpm = hr;
        }
        if let Some(speed) = frame.speed_kmh() {
            self.set_measured_speed(speed);
        }

        if let Some(wheel) = frame.wheel {
            match self.counters.push_wheel(wheel) {
                Ok(Some(speed)) => self.set_measured_speed(speed),
                Ok(None) => {}
                Err(e) => tracing::debug!("{}", e),
            }
        }
        if let Some(crank) = frame.crank {
            match self.counters.push_crank(crank) {
                Ok(Some(cadence)) => self.state.cadence_rpm = cadence,
                Ok(None) => {}
                Err(e) => tracing::debug!("{}", e),
            }
        }

        if !self.speed_reported
            && self.settings.estimate_speed_from_power
            && frame.power_watts.is_some()
        {
            self.state.speed_kmh = estimate_speed_from_power(self.state.power_watts);
            self.state.speed_estimated = true;
        }
    }

    fn set_measured_speed(&mut self, speed_kmh: f32) {
        self.speed_reported = true;
        self.state.speed_kmh = speed_kmh;
        self.state.speed_estimated = false;
    }

    /// Handle a control point indication.
    pub fn on_control_indication(&mut self, data: &[u8]) -> Option<ControlResponse> {
        let Some(response) = parse_control_point_response(data) else {
            tracing::debug!(?data, "Unrecognized control point indication");
            return None;
        };

        if response.result == ControlResult::Success {
            tracing::debug!(opcode = response.request_opcode, "Control point request succeeded");
        } else {
            tracing::warn!(
                opcode = response.request_opcode,
                result = ?response.result,
                "Control point request rejected"
            );
        }
        self.emit(HubEvent::ControlResponse(response));
        Some(response)
    }

    /// Report the outcome of the last control point write. Returns the next
    /// write to issue.
    pub fn on_write_complete(&mut self, result: Result<(), ControlError>) -> Option<ControlCommand> {
        self.sequencer.on_write_complete(result)
    }

    /// Command a target directly, outside any workout.
    pub fn set_target(&mut self, target: Target) -> Result<Option<ControlCommand>, ControlError> {
        if self.state.connection != ConnectionState::Connected {
            tracing::warn!(%target, "No trainer connected, target dropped");
            return Err(ControlError::LinkUnavailable);
        }
        Ok(self.command(target))
    }

    fn command(&mut self, target: Target) -> Option<ControlCommand> {
        self.state.target = Some(target);
        self.emit(HubEvent::TargetChanged(target));
        self.sequencer.set_target(target.to_command())
    }

    /// Advance the session by one second.
    ///
    /// Does nothing while disconnected or while the workout is paused.
    /// Returns a write when the target changed.
    pub fn tick(&mut self) -> Option<ControlCommand> {
        if self.state.connection != ConnectionState::Connected
            || self.engine.status() == WorkoutStatus::Paused
        {
            return None;
        }

        self.state.elapsed_s += 1;

        let mut distance = self.state.accumulated_distance_m + valid_speed_kmh(self.state.speed_kmh) / 3.6;
        if let Some(track) = self.engine.workout().and_then(Workout::track) {
            distance = distance.min(track.total_distance_m());
        }
        self.state.accumulated_distance_m = distance.max(self.state.accumulated_distance_m);

        let before = self.engine.status();
        let target = self
            .engine
            .evaluate(self.state.elapsed_s, self.state.accumulated_distance_m);

        if self.recorder.status() == RecordingStatus::Recording {
            let sample = RideSample {
                elapsed_seconds: self.state.elapsed_s,
                power_watts: self.state.power_watts,
                cadence_rpm: self.state.cadence_rpm,
                heart_rate_bpm: self.state.heart_rate_bpm,
                speed_kmh: self.state.speed_kmh,
                speed_estimated: self.state.speed_estimated,
                distance_meters: self.state.accumulated_distance_m,
                target: self.state.target,
            };
            if let Err(e) = self.recorder.record_sample(sample) {
                tracing::warn!("Failed to record sample: {}", e);
            }
        }

        let after = self.engine.status();
        self.state.workout_status = after;
        if before != after {
            if after == WorkoutStatus::Completed {
                self.finish_recording();
            }
            self.emit(HubEvent::WorkoutStatusChanged(after));
        }

        let write = target.and_then(|t| self.command(t));
        self.emit(HubEvent::Tick(self.state.clone()));
        write
    }

    /// Load and start a workout. Elapsed time and distance restart at zero.
    /// Returns the first write when connected.
    pub fn start_workout(&mut self, workout: Workout) -> Result<Option<ControlCommand>, WorkoutError> {
        if self.engine.is_active() {
            return Err(WorkoutError::EngineError(
                "A workout is already running".to_string(),
            ));
        }

        let name = workout.name().to_string();
        self.engine.load(workout);
        self.engine.start()?;

        self.state.elapsed_s = 0;
        self.state.accumulated_distance_m = 0.0;
        self.state.workout_status = WorkoutStatus::InProgress;

        if self.recorder.status() != RecordingStatus::Idle {
            self.recorder.discard();
        }
        if let Err(e) = self.recorder.start(Some(name)) {
            tracing::warn!("Failed to start recording: {}", e);
        }
        self.emit(HubEvent::WorkoutStatusChanged(WorkoutStatus::InProgress));

        if self.state.connection != ConnectionState::Connected {
            return Ok(None);
        }
        Ok(self.engine.evaluate(0, 0.0).and_then(|t| self.command(t)))
    }

    /// Pause the running workout.
    pub fn pause_workout(&mut self) -> Result<(), WorkoutError> {
        self.engine.pause()?;
        if let Err(e) = self.recorder.pause() {
            tracing::debug!("Recorder not paused: {}", e);
        }
        self.state.workout_status = WorkoutStatus::Paused;
        self.emit(HubEvent::WorkoutStatusChanged(WorkoutStatus::Paused));
        Ok(())
    }

    /// Resume the paused workout.
    pub fn resume_workout(&mut self) -> Result<(), WorkoutError> {
        self.engine.resume()?;
        if let Err(e) = self.recorder.resume() {
            tracing::debug!("Recorder not resumed: {}", e);
        }
        self.state.workout_status = WorkoutStatus::InProgress;
        self.emit(HubEvent::WorkoutStatusChanged(WorkoutStatus::InProgress));
        Ok(())
    }

    /// Stop the workout and drop resistance to 0 %. Returns the write when
    /// connected.
    pub fn stop_workout(&mut self) -> Result<Option<ControlCommand>, WorkoutError> {
        let reset = self.engine.stop()?;
        self.finish_recording();
        self.state.workout_status = self.engine.status();
        self.emit(HubEvent::WorkoutStatusChanged(self.engine.status()));

        match reset {
            Some(target) if self.state.connection == ConnectionState::Connected => {
                Ok(self.command(target))
            }
            _ => Ok(None),
        }
    }

    fn finish_recording(&mut self) {
        if self.recorder.status() == RecordingStatus::Idle {
            return;
        }
        match self.recorder.finish() {
            Ok((summary, _samples)) => {
                tracing::info!(
                    distance_m = summary.distance_meters,
                    avg_power = summary.avg_power,
                    "Ride finished"
                );
                self.emit(HubEvent::RideFinished(summary));
            }
            Err(e) => tracing::debug!("No ride to finish: {}", e),
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.clone()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn engine(&self) -> &WorkoutEngine {
        &self.engine
    }

    pub fn sequencer(&self) -> &CommandSequencer {
        &self.sequencer
    }

    pub fn recorder(&self) -> &RideRecorder {
        &self.recorder
    }

    pub fn is_connected(&self) -> bool {
        self.state.connection == ConnectionState::Connected
    }
}
