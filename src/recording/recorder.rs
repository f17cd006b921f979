//! In-memory ride recorder.

use crate::recording::types::{RecorderError, RecordingStatus, RideSample, RideSummary};
use chrono::{DateTime, Utc};

/// Power readings above this are dropped as spikes.
const MAX_POWER_FILTER: u16 = 2000;

/// Records one sample per tick while a workout runs.
#[derive(Debug, Default)]
pub struct RideRecorder {
    status: RecordingStatus,
    started_at: Option<DateTime<Utc>>,
    workout_name: Option<String>,
    samples: Vec<RideSample>,
}

impl RideRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording a new ride.
    pub fn start(&mut self, workout_name: Option<String>) -> Result<(), RecorderError> {
        if self.status != RecordingStatus::Idle {
            return Err(RecorderError::AlreadyRecording);
        }

        self.started_at = Some(Utc::now());
        self.workout_name = workout_name;
        self.samples.clear();
        self.status = RecordingStatus::Recording;

        tracing::info!("Started recording ride");
        Ok(())
    }

    /// Record a sample.
    pub fn record_sample(&mut self, mut sample: RideSample) -> Result<(), RecorderError> {
        if self.status != RecordingStatus::Recording {
            return Err(RecorderError::NotRecording);
        }

        if sample.power_watts > MAX_POWER_FILTER {
            tracing::debug!(power = sample.power_watts, "Dropping power spike");
            sample.power_watts = 0;
        }

        self.samples.push(sample);
        Ok(())
    }

    /// Pause recording.
    pub fn pause(&mut self) -> Result<(), RecorderError> {
        if self.status != RecordingStatus::Recording {
            return Err(RecorderError::NotRecording);
        }

        self.status = RecordingStatus::Paused;
        tracing::info!("Paused recording");
        Ok(())
    }

    /// Resume recording.
    pub fn resume(&mut self) -> Result<(), RecorderError> {
        if self.status != RecordingStatus::Paused {
            return Err(RecorderError::NotRecording);
        }

        self.status = RecordingStatus::Recording;
        tracing::info!("Resumed recording");
        Ok(())
    }

    /// Finish recording and return the summary with samples.
    pub fn finish(&mut self) -> Result<(RideSummary, Vec<RideSample>), RecorderError> {
        if self.status == RecordingStatus::Idle {
            return Err(RecorderError::NotRecording);
        }
        self.status = RecordingStatus::Idle;

        let started_at = self.started_at.take().ok_or(RecorderError::NoData)?;
        let samples = std::mem::take(&mut self.samples);
        if samples.is_empty() {
            return Err(RecorderError::NoData);
        }

        let mut summary = RideSummary::from_samples(&samples, started_at, self.workout_name.take());
        summary.ended_at = Some(Utc::now());

        tracing::info!("Finished recording ride with {} samples", samples.len());
        Ok((summary, samples))
    }

    /// Discard the current recording.
    pub fn discard(&mut self) {
        self.started_at = None;
        self.workout_name = None;
        self.samples.clear();
        self.status = RecordingStatus::Idle;
        tracing::info!("Discarded recording");
    }

    /// Get the current recording status.
    pub fn status(&self) -> RecordingStatus {
        self.status
    }

    /// Samples recorded so far.
    pub fn samples(&self) -> &[RideSample] {
        &self.samples
    }

    /// Statistics over the samples recorded so far.
    pub fn live_summary(&self) -> Option<RideSummary> {
        let started_at = self.started_at?;
        Some(RideSummary::from_samples(
            &self.samples,
            started_at,
            self.workout_name.clone(),
        ))
    }
}
