//! Recording types for ride data capture.

use crate::workouts::types::Target;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of the ride recorder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordingStatus {
    /// Not recording
    #[default]
    Idle,
    /// Actively recording
    Recording,
    /// Recording paused
    Paused,
}

/// A single data point during a ride (1-second resolution).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RideSample {
    /// Seconds since ride start
    pub elapsed_seconds: u32,
    /// Smoothed power in watts
    pub power_watts: u16,
    /// Cadence in RPM
    pub cadence_rpm: u16,
    /// Heart rate in BPM (0 when no monitor)
    pub heart_rate_bpm: u8,
    /// Speed in km/h
    pub speed_kmh: f32,
    /// Speed came from the power estimate, not the trainer
    pub speed_estimated: bool,
    /// Cumulative distance in meters
    pub distance_meters: f64,
    /// Target commanded at the time
    pub target: Option<Target>,
}

impl RideSample {
    /// Commanded resistance percentage, if the target is a resistance.
    pub fn resistance_percent(&self) -> Option<u8> {
        match self.target {
            Some(Target::ResistancePercent(p)) => Some(p),
            _ => None,
        }
    }
}

/// Summary statistics for a recorded ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideSummary {
    /// Workout followed, if any
    pub workout_name: Option<String>,
    /// Ride start timestamp
    pub started_at: DateTime<Utc>,
    /// Ride end timestamp
    pub ended_at: Option<DateTime<Utc>>,
    /// Active riding time in seconds
    pub duration_seconds: u32,
    /// Total distance in meters
    pub distance_meters: f64,
    pub avg_power: u16,
    pub max_power: u16,
    pub avg_speed_kmh: f32,
    pub max_speed_kmh: f32,
    pub avg_cadence: u16,
    /// Average over non-zero readings only
    pub avg_heart_rate: Option<u8>,
    pub max_heart_rate: Option<u8>,
}

impl RideSummary {
    /// Compute statistics over `samples`.
    pub fn from_samples(
        samples: &[RideSample],
        started_at: DateTime<Utc>,
        workout_name: Option<String>,
    ) -> Self {
        let count = samples.len().max(1) as f64;

        let avg = |f: fn(&RideSample) -> f64| samples.iter().map(f).sum::<f64>() / count;

        let heart_rates: Vec<u32> = samples
            .iter()
            .filter(|s| s.heart_rate_bpm > 0)
            .map(|s| s.heart_rate_bpm as u32)
            .collect();
        let avg_heart_rate = (!heart_rates.is_empty())
            .then(|| (heart_rates.iter().sum::<u32>() / heart_rates.len() as u32) as u8);

        Self {
            workout_name,
            started_at,
            ended_at: None,
            duration_seconds: samples.last().map(|s| s.elapsed_seconds).unwrap_or(0),
            distance_meters: samples.last().map(|s| s.distance_meters).unwrap_or(0.0),
            avg_power: avg(|s| s.power_watts as f64) as u16,
            max_power: samples.iter().map(|s| s.power_watts).max().unwrap_or(0),
            avg_speed_kmh: avg(|s| s.speed_kmh as f64) as f32,
            max_speed_kmh: samples.iter().map(|s| s.speed_kmh).fold(0.0, f32::max),
            avg_cadence: avg(|s| s.cadence_rpm as f64) as u16,
            avg_heart_rate,
            max_heart_rate: samples
                .iter()
                .map(|s| s.heart_rate_bpm)
                .filter(|hr| *hr > 0)
                .max(),
        }
    }
}

/// Errors from the ride recorder.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("Already recording")]
    AlreadyRecording,

    #[error("Not recording")]
    NotRecording,

    #[error("No data recorded")]
    NoData,
}
