//! Ride recording.

pub mod recorder;
pub mod types;

pub use recorder::RideRecorder;
pub use types::{RecorderError, RecordingStatus, RideSample, RideSummary};
