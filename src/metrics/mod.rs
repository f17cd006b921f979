//! Telemetry conditioning.

pub mod smoothing;

pub use smoothing::{estimate_speed_from_power, PowerSmoother};
