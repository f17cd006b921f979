//! Workout types: interval schedules, tracks as workouts, and status.

use crate::track::Track;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Highest resistance percentage an interval may ask for.
pub const MAX_RESISTANCE_PERCENT: u32 = 100;

/// Accepted power target range in watts.
pub const POWER_TARGET_RANGE_W: std::ops::RangeInclusive<u32> = 1..=1000;

/// What the trainer should hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    /// Resistance 0-100 %, mapped to watts on the wire
    ResistancePercent(u8),
    /// ERG power in watts
    PowerWatts(u16),
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::ResistancePercent(p) => write!(f, "{}%", p),
            Target::PowerWatts(w) => write!(f, "{}W", w),
        }
    }
}

/// Kind of interval workout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutKind {
    /// Every interval holds a resistance percentage
    Resistance,
    /// Every interval holds a power target
    Power,
}

/// One step of an interval schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// Duration in seconds
    pub duration_s: u32,
    /// Target held for the whole interval
    pub target: Target,
}

impl Interval {
    pub fn resistance(duration_s: u32, percent: u8) -> Self {
        Self {
            duration_s,
            target: Target::ResistancePercent(percent),
        }
    }

    pub fn power(duration_s: u32, watts: u16) -> Self {
        Self {
            duration_s,
            target: Target::PowerWatts(watts),
        }
    }
}

/// Interval as written in schedule files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntervalDefinition {
    pub duration_s: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resistance_pct: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power_w: Option<u32>,
}

/// Schedule as written in schedule files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub total_duration_s: u32,
    pub intervals: Vec<IntervalDefinition>,
}

/// Schedule validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("Schedule has no intervals")]
    Empty,

    #[error("Interval durations sum to {actual}s but the schedule declares {declared}s")]
    DurationMismatch { declared: u32, actual: u64 },

    #[error("Interval {index}: resistance {value}% out of range 0-100")]
    ResistanceOutOfRange { index: usize, value: u32 },

    #[error("Interval {index}: power {value}W out of range 1-1000")]
    PowerOutOfRange { index: usize, value: u32 },

    #[error("Interval {index} must set exactly one of resistance_pct or power_w")]
    AmbiguousTarget { index: usize },

    #[error("Schedule mixes resistance and power intervals")]
    MixedKinds,

    #[error("Failed to read schedule: {0}")]
    Read(String),
}

/// A validated, immutable interval schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleDefinition", into = "ScheduleDefinition")]
pub struct IntervalSchedule {
    name: Option<String>,
    kind: WorkoutKind,
    intervals: Vec<Interval>,
    total_duration_s: u32,
}

impl IntervalSchedule {
    /// Validate and build a schedule.
    ///
    /// Durations must add up to `total_duration_s` exactly; the schedule is
    /// never corrected.
    pub fn new(total_duration_s: u32, intervals: Vec<Interval>) -> Result<Self, ScheduleError> {
        let first = intervals.first().ok_or(ScheduleError::Empty)?;
        let kind = match first.target {
            Target::ResistancePercent(_) => WorkoutKind::Resistance,
            Target::PowerWatts(_) => WorkoutKind::Power,
        };

        for (index, interval) in intervals.iter().enumerate() {
            match interval.target {
                Target::ResistancePercent(pct) => {
                    if kind != WorkoutKind::Resistance {
                        return Err(ScheduleError::MixedKinds);
                    }
                    if pct as u32 > MAX_RESISTANCE_PERCENT {
                        return Err(ScheduleError::ResistanceOutOfRange {
                            index,
                            value: pct as u32,
                        });
                    }
                }
                Target::PowerWatts(watts) => {
                    if kind != WorkoutKind::Power {
                        return Err(ScheduleError::MixedKinds);
                    }
                    if !POWER_TARGET_RANGE_W.contains(&(watts as u32)) {
                        return Err(ScheduleError::PowerOutOfRange {
                            index,
                            value: watts as u32,
                        });
                    }
                }
            }
        }

        let actual: u64 = intervals.iter().map(|i| i.duration_s as u64).sum();
        if actual != total_duration_s as u64 {
            return Err(ScheduleError::DurationMismatch {
                declared: total_duration_s,
                actual,
            });
        }

        Ok(Self {
            name: None,
            kind,
            intervals,
            total_duration_s,
        })
    }

    /// Attach a display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> WorkoutKind {
        self.kind
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn total_duration_s(&self) -> u32 {
        self.total_duration_s
    }

    /// Index of the interval running at `elapsed_s`, or `None` once the
    /// schedule is complete.
    pub fn interval_index(&self, elapsed_s: u32) -> Option<usize> {
        let mut end = 0u64;
        for (i, interval) in self.intervals.iter().enumerate() {
            end += interval.duration_s as u64;
            if (elapsed_s as u64) < end {
                return Some(i);
            }
        }
        None
    }

    /// Interval running at `elapsed_s`.
    pub fn current_interval(&self, elapsed_s: u32) -> Option<&Interval> {
        self.interval_index(elapsed_s).map(|i| &self.intervals[i])
    }

    /// Seconds left in the whole schedule.
    pub fn remaining_s(&self, elapsed_s: u32) -> u32 {
        self.total_duration_s.saturating_sub(elapsed_s)
    }

    /// Read a schedule from a TOML or JSON file (by extension).
    pub fn from_file(path: &Path) -> Result<Self, ScheduleError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ScheduleError::Read(e.to_string()))?;

        let definition: ScheduleDefinition = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => {
                serde_json::from_str(&content).map_err(|e| ScheduleError::Read(e.to_string()))?
            }
            _ => toml::from_str(&content).map_err(|e| ScheduleError::Read(e.to_string()))?,
        };

        let schedule = IntervalSchedule::try_from(definition)?;
        tracing::info!(
            path = %path.display(),
            intervals = schedule.intervals.len(),
            total_s = schedule.total_duration_s,
            "Loaded interval schedule"
        );
        Ok(schedule)
    }
}

impl TryFrom<ScheduleDefinition> for IntervalSchedule {
    type Error = ScheduleError;

    fn try_from(def: ScheduleDefinition) -> Result<Self, Self::Error> {
        let mut intervals = Vec::with_capacity(def.intervals.len());

        for (index, raw) in def.intervals.into_iter().enumerate() {
            let target = match (raw.resistance_pct, raw.power_w) {
                (Some(pct), None) => {
                    let pct = u8::try_from(pct)
                        .ok()
                        .filter(|p| *p as u32 <= MAX_RESISTANCE_PERCENT)
                        .ok_or(ScheduleError::ResistanceOutOfRange { index, value: pct })?;
                    Target::ResistancePercent(pct)
                }
                (None, Some(watts)) => {
                    let watts = u16::try_from(watts)
                        .ok()
                        .filter(|w| POWER_TARGET_RANGE_W.contains(&(*w as u32)))
                        .ok_or(ScheduleError::PowerOutOfRange { index, value: watts })?;
                    Target::PowerWatts(watts)
                }
                _ => return Err(ScheduleError::AmbiguousTarget { index }),
            };

            intervals.push(Interval {
                duration_s: raw.duration_s,
                target,
            });
        }

        let schedule = IntervalSchedule::new(def.total_duration_s, intervals)?;
        Ok(match def.name {
            Some(name) => schedule.with_name(name),
            None => schedule,
        })
    }
}

impl From<IntervalSchedule> for ScheduleDefinition {
    fn from(schedule: IntervalSchedule) -> Self {
        let intervals = schedule
            .intervals
            .iter()
            .map(|i| match i.target {
                Target::ResistancePercent(pct) => IntervalDefinition {
                    duration_s: i.duration_s,
                    resistance_pct: Some(pct as u32),
                    power_w: None,
                },
                Target::PowerWatts(watts) => IntervalDefinition {
                    duration_s: i.duration_s,
                    resistance_pct: None,
                    power_w: Some(watts as u32),
                },
            })
            .collect();

        ScheduleDefinition {
            name: schedule.name,
            total_duration_s: schedule.total_duration_s,
            intervals,
        }
    }
}

/// Something the target engine can follow.
#[derive(Debug, Clone)]
pub enum Workout {
    /// Time-based interval schedule
    Intervals(IntervalSchedule),
    /// Distance-based GPS track
    Track(Track),
}

impl Workout {
    pub fn name(&self) -> &str {
        match self {
            Workout::Intervals(s) => s.name().unwrap_or("Intervals"),
            Workout::Track(t) => t.name(),
        }
    }

    /// Track being followed, if any.
    pub fn track(&self) -> Option<&Track> {
        match self {
            Workout::Track(t) => Some(t),
            Workout::Intervals(_) => None,
        }
    }

    /// Expected duration in seconds. Tracks assume a steady average speed.
    pub fn estimated_duration_s(&self, average_speed_kmh: f64) -> u32 {
        match self {
            Workout::Intervals(s) => s.total_duration_s(),
            Workout::Track(t) => t.estimated_duration_s(average_speed_kmh),
        }
    }
}

/// Current status of workout execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkoutStatus {
    /// Workout not started
    #[default]
    NotStarted,
    /// Workout in progress
    InProgress,
    /// Workout paused
    Paused,
    /// Workout completed successfully
    Completed,
    /// Workout stopped early
    Stopped,
}

impl WorkoutStatus {
    /// Whether the workout has ended either way.
    pub fn is_finished(self) -> bool {
        matches!(self, WorkoutStatus::Completed | WorkoutStatus::Stopped)
    }
}

/// Errors related to workout operations.
#[derive(Debug, Error)]
pub enum WorkoutError {
    /// Invalid state transition
    #[error("Workout engine error: {0}")]
    EngineError(String),

    /// No workout loaded
    #[error("No workout loaded")]
    NoWorkoutLoaded,
}
