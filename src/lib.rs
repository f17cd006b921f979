//! RideLink - smart trainer telemetry and control
//!
//! Decodes BLE fitness-machine telemetry, turns revolution counters into
//! speed and cadence, and drives the trainer's resistance from an interval
//! schedule or the elevation profile of a GPS track.

pub mod metrics;
pub mod recording;
pub mod sensors;
pub mod session;
pub mod storage;
pub mod track;
pub mod workouts;

// Re-export commonly used types
pub use recording::recorder::RideRecorder;
pub use sensors::manager::SensorManager;
pub use session::hub::{HubSettings, SessionState, TelemetryHub};
pub use storage::config::AppConfig;
pub use track::Track;
pub use workouts::engine::WorkoutEngine;
