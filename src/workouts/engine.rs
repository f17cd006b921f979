//! Target engine.
//!
//! Turns elapsed time (interval schedules) or travelled distance (tracks)
//! into the target the trainer should hold. The lookups are pure functions;
//! [`WorkoutEngine`] adds the start/pause/stop lifecycle and remembers the
//! last commanded target so unchanged targets are not re-sent.

use crate::sensors::control::ControlCommand;
use crate::track::Track;
use crate::workouts::types::{IntervalSchedule, Target, Workout, WorkoutError, WorkoutStatus};
use serde::{Deserialize, Serialize};

/// Target commanded when a workout stops or completes.
pub const RESET_TARGET: Target = Target::ResistancePercent(0);

/// Maps road gradient to trainer resistance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GradientCurve {
    /// Flat floor for descents, gentle ramp near zero, quadratic on climbs
    #[default]
    Progressive,
    /// Six fixed buckets
    Stepped,
}

impl GradientCurve {
    /// Resistance percentage (0-100) for a gradient in percent.
    pub fn resistance_for_gradient(self, gradient_pct: f64) -> u8 {
        let g = if gradient_pct.is_nan() { 0.0 } else { gradient_pct };

        let resistance = match self {
            GradientCurve::Progressive => {
                if g < -2.0 {
                    5.0
                } else if g < 0.0 {
                    15.0 + g * 5.0
                } else {
                    25.0 + 8.0 * g + 0.5 * g * g
                }
            }
            GradientCurve::Stepped => match g {
                g if g < -4.0 => 0.0,
                g if g < -1.0 => 10.0,
                g if g < 2.0 => 25.0,
                g if g < 5.0 => 45.0,
                g if g < 8.0 => 65.0,
                _ => 85.0,
            },
        };

        resistance.clamp(0.0, 100.0) as u8
    }
}

/// Power in watts commanded for a resistance percentage.
///
/// `20 + e^(pct/25) * 8`, truncated. 0 % is 28 W, 50 % is 79 W, 100 % is
/// 456 W.
pub fn resistance_to_power(percent: u8) -> i16 {
    let pct = percent.min(100) as f64;
    (20.0 + (pct / 25.0).exp() * 8.0) as i16
}

impl Target {
    /// Control point write for this target.
    pub fn to_command(self) -> ControlCommand {
        match self {
            Target::ResistancePercent(pct) => {
                ControlCommand::SetTargetPower(resistance_to_power(pct))
            }
            Target::PowerWatts(watts) => {
                ControlCommand::SetTargetPower(i16::try_from(watts).unwrap_or(i16::MAX))
            }
        }
    }
}

/// Target at `elapsed_s` into an interval schedule, or `None` once complete.
pub fn interval_target(schedule: &IntervalSchedule, elapsed_s: u32) -> Option<Target> {
    schedule.current_interval(elapsed_s).map(|i| i.target)
}

/// Resistance target at `distance_m` along a track.
pub fn track_target(track: &Track, distance_m: f64, curve: GradientCurve) -> Target {
    let gradient = track.gradient_at(distance_m);
    Target::ResistancePercent(curve.resistance_for_gradient(gradient))
}

/// Workout execution engine.
#[derive(Debug, Default)]
pub struct WorkoutEngine {
    workout: Option<Workout>,
    status: WorkoutStatus,
    curve: GradientCurve,
    /// Last target handed out for commanding
    commanded: Option<Target>,
}

impl WorkoutEngine {
    /// Create an engine using `curve` for track workouts.
    pub fn new(curve: GradientCurve) -> Self {
        Self {
            curve,
            ..Default::default()
        }
    }

    /// Load a workout for execution.
    pub fn load(&mut self, workout: Workout) {
        tracing::info!(name = workout.name(), "Workout loaded");
        self.workout = Some(workout);
        self.status = WorkoutStatus::NotStarted;
        self.commanded = None;
    }

    /// Start the loaded workout.
    pub fn start(&mut self) -> Result<(), WorkoutError> {
        if self.workout.is_none() {
            return Err(WorkoutError::NoWorkoutLoaded);
        }
        if self.status != WorkoutStatus::NotStarted {
            return Err(WorkoutError::EngineError(
                "Workout already started".to_string(),
            ));
        }

        self.status = WorkoutStatus::InProgress;
        tracing::info!("Workout started");
        Ok(())
    }

    /// Pause the workout.
    pub fn pause(&mut self) -> Result<(), WorkoutError> {
        self.require_loaded()?;
        if self.status != WorkoutStatus::InProgress {
            return Err(WorkoutError::EngineError(
                "Workout not in progress".to_string(),
            ));
        }

        self.status = WorkoutStatus::Paused;
        tracing::info!("Workout paused");
        Ok(())
    }

    /// Resume the paused workout.
    pub fn resume(&mut self) -> Result<(), WorkoutError> {
        self.require_loaded()?;
        if self.status != WorkoutStatus::Paused {
            return Err(WorkoutError::EngineError("Workout not paused".to_string()));
        }

        self.status = WorkoutStatus::InProgress;
        tracing::info!("Workout resumed");
        Ok(())
    }

    /// Stop the workout early. Returns the reset target if it still needs
    /// commanding.
    pub fn stop(&mut self) -> Result<Option<Target>, WorkoutError> {
        self.require_loaded()?;
        if self.status.is_finished() {
            return Ok(None);
        }

        self.status = WorkoutStatus::Stopped;
        tracing::info!("Workout stopped");
        Ok(self.commit(RESET_TARGET))
    }

    /// Work out the target for the current position.
    ///
    /// Returns a target only when it differs from the last one handed out.
    /// Reaching the end of the schedule or track completes the workout and
    /// yields [`RESET_TARGET`].
    pub fn evaluate(&mut self, elapsed_s: u32, distance_m: f64) -> Option<Target> {
        if self.status != WorkoutStatus::InProgress {
            return None;
        }
        let workout = self.workout.as_ref()?;

        let target = match workout {
            Workout::Intervals(schedule) => interval_target(schedule, elapsed_s),
            Workout::Track(track) => (distance_m < track.total_distance_m())
                .then(|| track_target(track, distance_m, self.curve)),
        };

        match target {
            Some(target) => self.commit(target),
            None => {
                self.status = WorkoutStatus::Completed;
                tracing::info!(elapsed_s, distance_m, "Workout completed");
                self.commit(RESET_TARGET)
            }
        }
    }

    /// Forget the last commanded target so the next evaluation re-sends it.
    /// Used after the link drops.
    pub fn forget_commanded(&mut self) {
        self.commanded = None;
    }

    pub fn workout(&self) -> Option<&Workout> {
        self.workout.as_ref()
    }

    pub fn status(&self) -> WorkoutStatus {
        self.status
    }

    /// Last target handed out.
    pub fn commanded_target(&self) -> Option<Target> {
        self.commanded
    }

    /// Whether the workout is running or paused.
    pub fn is_active(&self) -> bool {
        matches!(
            self.status,
            WorkoutStatus::InProgress | WorkoutStatus::Paused
        ) && self.workout.is_some()
    }

    fn commit(&mut self, target: Target) -> Option<Target> {
        if self.commanded == Some(target) {
            return None;
        }
        tracing::debug!(%target, previous = ?self.commanded, "New target");
        self.commanded = Some(target);
        Some(target)
    }

    fn require_loaded(&self) -> Result<(), WorkoutError> {
        if self.workout.is_none() {
            return Err(WorkoutError::NoWorkoutLoaded);
        }
        Ok(())
    }
}
