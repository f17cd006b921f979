//! Sensor types and enums for the BLE trainer link.

use super::ftms::{
    CSC_SERVICE_UUID, CYCLING_POWER_SERVICE_UUID, FTMS_SERVICE_UUID, HEART_RATE_SERVICE_UUID,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

/// BLE service a peripheral advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// BLE Fitness Machine Service (0x1826)
    BleFtms,
    /// BLE Cycling Power Service (0x1818)
    BleCyclingPower,
    /// BLE Heart Rate Service (0x180D)
    BleHeartRate,
    /// BLE Cycling Speed and Cadence (0x1816)
    BleCsc,
}

impl Protocol {
    /// Map an advertised service UUID to a protocol.
    pub fn from_service(uuid: &Uuid) -> Option<Self> {
        match *uuid {
            u if u == FTMS_SERVICE_UUID => Some(Protocol::BleFtms),
            u if u == CYCLING_POWER_SERVICE_UUID => Some(Protocol::BleCyclingPower),
            u if u == HEART_RATE_SERVICE_UUID => Some(Protocol::BleHeartRate),
            u if u == CSC_SERVICE_UUID => Some(Protocol::BleCsc),
            _ => None,
        }
    }

    /// Pick the most capable protocol among advertised services.
    ///
    /// FTMS wins over Cycling Power, which wins over CSC, then Heart Rate.
    pub fn best_of(services: &[Uuid]) -> Option<Self> {
        let found: Vec<Protocol> = services.iter().filter_map(Protocol::from_service).collect();
        [
            Protocol::BleFtms,
            Protocol::BleCyclingPower,
            Protocol::BleCsc,
            Protocol::BleHeartRate,
        ]
        .into_iter()
        .find(|p| found.contains(p))
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::BleFtms => write!(f, "FTMS"),
            Protocol::BleCyclingPower => write!(f, "Cycling Power"),
            Protocol::BleHeartRate => write!(f, "Heart Rate"),
            Protocol::BleCsc => write!(f, "Cycling Speed/Cadence"),
        }
    }
}

/// Connection state of the peripheral link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected
    #[default]
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Active connection
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Connected => write!(f, "Connected"),
        }
    }
}

/// A peripheral discovered during BLE scanning.
#[derive(Debug, Clone)]
pub struct DiscoveredSensor {
    /// BLE device address/identifier
    pub device_id: String,
    /// Advertised local name
    pub name: String,
    /// Best protocol among the advertised services, if any
    pub protocol: Option<Protocol>,
    /// Signal strength (RSSI)
    pub signal_strength: Option<i16>,
    /// When the peripheral was last seen
    pub last_seen: Instant,
}

/// Decides which advertisements are worth showing.
///
/// A peripheral passes when it advertises a fitness service, or when a name
/// filter is configured and its local name contains it (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct AdvertisementFilter {
    name_filter: Option<String>,
}

impl AdvertisementFilter {
    pub fn new(name_filter: Option<String>) -> Self {
        Self {
            name_filter: name_filter
                .map(|n| n.trim().to_lowercase())
                .filter(|n| !n.is_empty()),
        }
    }

    pub fn matches(&self, local_name: Option<&str>, services: &[Uuid]) -> bool {
        if services.iter().any(|s| Protocol::from_service(s).is_some()) {
            return true;
        }

        match (&self.name_filter, local_name) {
            (Some(filter), Some(name)) => name.to_lowercase().contains(filter.as_str()),
            _ => false,
        }
    }
}

/// Events from the BLE link.
#[derive(Debug, Clone)]
pub enum SensorEvent {
    /// A new peripheral was discovered during scanning
    Discovered(DiscoveredSensor),
    /// Link state changed
    ConnectionChanged {
        device_id: String,
        state: ConnectionState,
    },
    /// Scan started
    ScanStarted,
    /// Scan stopped
    ScanStopped,
}

/// Configuration for the sensor manager.
#[derive(Debug, Clone)]
pub struct SensorConfig {
    /// Timeout for discovery scan in seconds
    pub discovery_timeout_secs: u64,
    /// Timeout for connection attempt in seconds
    pub connection_timeout_secs: u64,
    /// Optional substring match on advertised names
    pub name_filter: Option<String>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            discovery_timeout_secs: 10,
            connection_timeout_secs: 10,
            name_filter: None,
        }
    }
}

/// Errors that can occur in the sensor system.
#[derive(Debug, Error)]
pub enum SensorError {
    /// BLE adapter not found or unavailable
    #[error("Bluetooth adapter not found")]
    AdapterNotFound,

    /// Failed to start BLE scanning
    #[error("Failed to start scanning: {0}")]
    ScanFailed(String),

    /// Peripheral not found with given device ID
    #[error("Sensor not found: {0}")]
    SensorNotFound(String),

    /// Connection to peripheral failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection timed out
    #[error("Connection timed out")]
    ConnectionTimeout,

    /// Failed to subscribe to notifications
    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    /// Generic BLE error
    #[error("BLE error: {0}")]
    BleError(String),
}

impl From<btleplug::Error> for SensorError {
    fn from(e: btleplug::Error) -> Self {
        SensorError::BleError(e.to_string())
    }
}

/// Errors from commanding the trainer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// No peripheral connected; the command was dropped
    #[error("No trainer connected")]
    LinkUnavailable,

    /// A control point write failed; the pending command was dropped
    #[error("Control point write not acknowledged: {0}")]
    WriteNotAcknowledged(String),
}
