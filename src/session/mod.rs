//! Live session state.

pub mod hub;

pub use hub::{HubEvent, SessionState, TelemetryHub};
