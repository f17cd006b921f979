//! BLE trainer link: wire decoding, counters, control sequencing.

pub mod control;
pub mod counters;
pub mod ftms;
pub mod manager;
pub mod types;

pub use control::{CommandSequencer, ControlCommand};
pub use counters::CounterDifferencer;
pub use ftms::{decode_frame, CharacteristicKind, DecodeError, TelemetryFrame};
pub use manager::SensorManager;
pub use types::{
    AdvertisementFilter, ConnectionState, ControlError, DiscoveredSensor, Protocol, SensorConfig,
    SensorError, SensorEvent,
};
