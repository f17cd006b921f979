//! GATT wire formats for fitness peripherals.
//!
//! Decodes Indoor Bike Data (0x2AD2), Cycling Power Measurement (0x2A63),
//! CSC Measurement (0x2A5B) and Heart Rate Measurement (0x2A37) notifications
//! into a [`TelemetryFrame`], and encodes Fitness Machine Control Point commands.
//!
//! All decoding is pure: the same bytes always produce the same frame.

use crate::sensors::counters::{CrankSample, WheelSample};
use thiserror::Error;
use uuid::Uuid;

/// FTMS Service UUID (0x1826)
pub const FTMS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1826_0000_1000_8000_0080_5f9b_34fb);

/// Indoor Bike Data Characteristic UUID (0x2AD2)
pub const INDOOR_BIKE_DATA_UUID: Uuid = Uuid::from_u128(0x0000_2ad2_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Control Point UUID (0x2AD9)
pub const FTMS_CONTROL_POINT_UUID: Uuid =
    Uuid::from_u128(0x0000_2ad9_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Service UUID (0x1818)
pub const CYCLING_POWER_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_1818_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Power Measurement UUID (0x2A63)
pub const CYCLING_POWER_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a63_0000_1000_8000_0080_5f9b_34fb);

/// Cycling Speed and Cadence Service UUID (0x1816)
pub const CSC_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1816_0000_1000_8000_0080_5f9b_34fb);

/// CSC Measurement UUID (0x2A5B)
pub const CSC_MEASUREMENT_UUID: Uuid = Uuid::from_u128(0x0000_2a5b_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Service UUID (0x180D)
pub const HEART_RATE_SERVICE_UUID: Uuid =
    Uuid::from_u128(0x0000_180d_0000_1000_8000_0080_5f9b_34fb);

/// Heart Rate Measurement UUID (0x2A37)
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_0080_5f9b_34fb);

/// Services accepted by the advertisement filter.
pub const FITNESS_SERVICE_UUIDS: [Uuid; 4] = [
    FTMS_SERVICE_UUID,
    CYCLING_POWER_SERVICE_UUID,
    CSC_SERVICE_UUID,
    HEART_RATE_SERVICE_UUID,
];

/// Notifying characteristic a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CharacteristicKind {
    IndoorBikeData,
    CyclingPowerMeasurement,
    CscMeasurement,
    HeartRateMeasurement,
}

impl CharacteristicKind {
    /// Map a characteristic UUID to the payload kind it carries.
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        [
            Self::IndoorBikeData,
            Self::CyclingPowerMeasurement,
            Self::CscMeasurement,
            Self::HeartRateMeasurement,
        ]
        .into_iter()
        .find(|kind| kind.uuid() == uuid)
    }

    /// Characteristic UUID for this kind.
    pub fn uuid(self) -> Uuid {
        match self {
            Self::IndoorBikeData => INDOOR_BIKE_DATA_UUID,
            Self::CyclingPowerMeasurement => CYCLING_POWER_MEASUREMENT_UUID,
            Self::CscMeasurement => CSC_MEASUREMENT_UUID,
            Self::HeartRateMeasurement => HEART_RATE_MEASUREMENT_UUID,
        }
    }

    /// Size of the fixed prefix every payload of this kind must carry.
    pub fn prefix_len(self) -> usize {
        match self {
            // flags
            Self::IndoorBikeData => 2,
            // flags + instantaneous power
            Self::CyclingPowerMeasurement => 4,
            // flags
            Self::CscMeasurement => 1,
            // flags + 8-bit heart rate
            Self::HeartRateMeasurement => 2,
        }
    }
}

impl std::fmt::Display for CharacteristicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndoorBikeData => write!(f, "Indoor Bike Data"),
            Self::CyclingPowerMeasurement => write!(f, "Cycling Power Measurement"),
            Self::CscMeasurement => write!(f, "CSC Measurement"),
            Self::HeartRateMeasurement => write!(f, "Heart Rate Measurement"),
        }
    }
}

/// Telemetry carried by a single notification.
///
/// Every field is optional; a field is `Some` only when the payload flags
/// declared it and the payload was long enough to hold it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryFrame {
    /// Instantaneous power in watts (negative readings clamp to 0)
    pub power_watts: Option<u16>,
    /// Cadence in RPM
    pub cadence_rpm: Option<u16>,
    /// Instantaneous speed in 0.01 km/h units
    pub speed_kmh_centi: Option<u16>,
    /// Heart rate in BPM
    pub heart_rate_bpm: Option<u8>,
    /// Total distance in meters
    pub total_distance_m: Option<u32>,
    /// Trainer-reported resistance level (unitless)
    pub resistance_level: Option<i16>,
    /// Cumulative wheel revolution counter
    pub wheel: Option<WheelSample>,
    /// Cumulative crank revolution counter
    pub crank: Option<CrankSample>,
}

impl TelemetryFrame {
    /// Instantaneous speed in km/h.
    pub fn speed_kmh(&self) -> Option<f32> {
        self.speed_kmh_centi.map(|s| s as f32 / 100.0)
    }

    /// True when the frame carries no telemetry at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Frame decoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload shorter than the fixed prefix for its kind.
    #[error("Malformed {kind} frame: {len} bytes, need at least {required}")]
    MalformedFrame {
        kind: CharacteristicKind,
        len: usize,
        required: usize,
    },
}

/// Sequential little-endian field reader.
///
/// A field that does not fit in the remaining payload is reported as absent
/// and so is everything after it, since later offsets can no longer be trusted.
struct FieldReader<'a> {
    data: &'a [u8],
    offset: usize,
    kind: CharacteristicKind,
    truncated: bool,
}

impl<'a> FieldReader<'a> {
    fn new(kind: CharacteristicKind, data: &'a [u8], offset: usize) -> Self {
        Self {
            data,
            offset,
            kind,
            truncated: false,
        }
    }

    fn take(&mut self, field: &'static str, width: usize) -> Option<&'a [u8]> {
        if self.truncated {
            return None;
        }

        let end = self.offset + width;
        if end > self.data.len() {
            tracing::warn!(
                kind = %self.kind,
                field,
                offset = self.offset,
                width,
                len = self.data.len(),
                "Flagged field exceeds payload, treating as absent"
            );
            self.truncated = true;
            return None;
        }

        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Some(bytes)
    }

    fn skip(&mut self, field: &'static str, width: usize) {
        let _ = self.take(field, width);
    }

    fn u8(&mut self, field: &'static str) -> Option<u8> {
        self.take(field, 1).map(|b| b[0])
    }

    fn u16(&mut self, field: &'static str) -> Option<u16> {
        self.take(field, 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn i16(&mut self, field: &'static str) -> Option<i16> {
        self.take(field, 2).map(|b| i16::from_le_bytes([b[0], b[1]]))
    }

    fn u24(&mut self, field: &'static str) -> Option<u32> {
        self.take(field, 3)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    fn u32(&mut self, field: &'static str) -> Option<u32> {
        self.take(field, 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn clamp_watts(raw: i16) -> u16 {
    raw.max(0) as u16
}

/// Decode a notification payload from a known characteristic.
pub fn decode_frame(kind: CharacteristicKind, data: &[u8]) -> Result<TelemetryFrame, DecodeError> {
    let required = kind.prefix_len();
    if data.len() < required {
        return Err(DecodeError::MalformedFrame {
            kind,
            len: data.len(),
            required,
        });
    }

    let frame = match kind {
        CharacteristicKind::IndoorBikeData => parse_indoor_bike_data(data),
        CharacteristicKind::CyclingPowerMeasurement => parse_cycling_power_measurement(data),
        CharacteristicKind::CscMeasurement => parse_csc_measurement(data),
        CharacteristicKind::HeartRateMeasurement => parse_heart_rate_measurement(data),
    };

    tracing::trace!(%kind, ?frame, "Decoded frame");
    Ok(frame)
}

/// Indoor Bike Data body. Caller guarantees the 2-byte flags prefix.
///
/// Bit 0 is "More Data": instantaneous speed is present when it is CLEAR.
fn parse_indoor_bike_data(data: &[u8]) -> TelemetryFrame {
    let flags = u16::from_le_bytes([data[0], data[1]]);
    let mut reader = FieldReader::new(CharacteristicKind::IndoorBikeData, data, 2);
    let mut frame = TelemetryFrame::default();

    if flags & 0x0001 == 0 {
        frame.speed_kmh_centi = reader.u16("instantaneous speed");
    }
    if flags & 0x0002 != 0 {
        reader.skip("average speed", 2);
    }
    if flags & 0x0004 != 0 {
        // 0.5 RPM resolution
        frame.cadence_rpm = reader.u16("instantaneous cadence").map(|c| c / 2);
    }
    if flags & 0x0008 != 0 {
        reader.skip("average cadence", 2);
    }
    if flags & 0x0010 != 0 {
        frame.total_distance_m = reader.u24("total distance");
    }
    if flags & 0x0020 != 0 {
        frame.resistance_level = reader.i16("resistance level");
    }
    if flags & 0x0040 != 0 {
        frame.power_watts = reader.i16("instantaneous power").map(clamp_watts);
    }
    if flags & 0x0080 != 0 {
        reader.skip("average power", 2);
    }
    if flags & 0x0100 != 0 {
        // total (u16), per hour (u16), per minute (u8)
        reader.skip("expended energy", 5);
    }
    if flags & 0x0200 != 0 {
        frame.heart_rate_bpm = reader.u8("heart rate");
    }

    frame
}

/// Cycling Power Measurement body. Caller guarantees flags + power.
fn parse_cycling_power_measurement(data: &[u8]) -> TelemetryFrame {
    let flags = u16::from_le_bytes([data[0], data[1]]);
    let power = i16::from_le_bytes([data[2], data[3]]);
    let mut reader = FieldReader::new(CharacteristicKind::CyclingPowerMeasurement, data, 4);

    let mut frame = TelemetryFrame {
        power_watts: Some(clamp_watts(power)),
        ..Default::default()
    };

    if flags & 0x0001 != 0 {
        reader.skip("pedal power balance", 1);
    }
    if flags & 0x0004 != 0 {
        reader.skip("accumulated torque", 2);
    }
    if flags & 0x0010 != 0 {
        if let (Some(revolutions), Some(event_time)) =
            (reader.u32("wheel revolutions"), reader.u16("wheel event time"))
        {
            frame.wheel = Some(WheelSample {
                revolutions,
                event_time,
            });
        }
    }
    if flags & 0x0020 != 0 {
        if let (Some(revolutions), Some(event_time)) =
            (reader.u16("crank revolutions"), reader.u16("crank event time"))
        {
            frame.crank = Some(CrankSample {
                revolutions,
                event_time,
            });
        }
    }

    frame
}

/// CSC Measurement body. Caller guarantees the 1-byte flags prefix.
fn parse_csc_measurement(data: &[u8]) -> TelemetryFrame {
    let flags = data[0];
    let mut reader = FieldReader::new(CharacteristicKind::CscMeasurement, data, 1);
    let mut frame = TelemetryFrame::default();

    if flags & 0x01 != 0 {
        if let (Some(revolutions), Some(event_time)) =
            (reader.u32("wheel revolutions"), reader.u16("wheel event time"))
        {
            frame.wheel = Some(WheelSample {
                revolutions,
                event_time,
            });
        }
    }
    if flags & 0x02 != 0 {
        if let (Some(revolutions), Some(event_time)) =
            (reader.u16("crank revolutions"), reader.u16("crank event time"))
        {
            frame.crank = Some(CrankSample {
                revolutions,
                event_time,
            });
        }
    }

    frame
}

/// Heart Rate Measurement body. Caller guarantees flags + one value byte.
fn parse_heart_rate_measurement(data: &[u8]) -> TelemetryFrame {
    let flags = data[0];
    let mut reader = FieldReader::new(CharacteristicKind::HeartRateMeasurement, data, 1);

    let heart_rate_bpm = if flags & 0x01 != 0 {
        reader
            .u16("heart rate (16-bit)")
            .map(|hr| u8::try_from(hr).unwrap_or(u8::MAX))
    } else {
        reader.u8("heart rate")
    };

    TelemetryFrame {
        heart_rate_bpm,
        ..Default::default()
    }
}

/// FTMS Control Point opcodes used by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FtmsControlOpcode {
    /// Request control of the fitness machine
    RequestControl = 0x00,
    /// Set target power
    SetTargetPower = 0x05,
    /// Start or resume training
    StartOrResume = 0x07,
    /// Set wheel circumference (0.1 mm units)
    SetWheelCircumference = 0x13,
    /// Response indication prefix
    ResponseCode = 0x80,
}

/// Build a control point command to request control.
pub fn build_request_control() -> Vec<u8> {
    vec![FtmsControlOpcode::RequestControl as u8]
}

/// Build a control point command to start training.
pub fn build_start_training() -> Vec<u8> {
    vec![FtmsControlOpcode::StartOrResume as u8]
}

/// Build a control point command to set target power (ERG mode).
pub fn build_set_target_power(target_watts: i16) -> Vec<u8> {
    let mut cmd = vec![FtmsControlOpcode::SetTargetPower as u8];
    cmd.extend_from_slice(&target_watts.to_le_bytes());
    cmd
}

/// Build a control point command to set wheel circumference.
///
/// `circumference_tenth_mm` - circumference in 0.1 mm units (21000 = 2100 mm)
pub fn build_set_wheel_circumference(circumference_tenth_mm: u16) -> Vec<u8> {
    let mut cmd = vec![FtmsControlOpcode::SetWheelCircumference as u8];
    cmd.extend_from_slice(&circumference_tenth_mm.to_le_bytes());
    cmd
}

/// Result code carried in a control point response indication.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResult {
    Success,
    NotSupported,
    InvalidParameter,
    OperationFailed,
    ControlNotPermitted,
    Unknown(u8),
}

impl From<u8> for ControlResult {
    fn from(code: u8) -> Self {
        match code {
            0x01 => Self::Success,
            0x02 => Self::NotSupported,
            0x03 => Self::InvalidParameter,
            0x04 => Self::OperationFailed,
            0x05 => Self::ControlNotPermitted,
            other => Self::Unknown(other),
        }
    }
}

/// Control point response indication (`0x80, request opcode, result`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlResponse {
    /// Opcode of the request being answered
    pub request_opcode: u8,
    /// Outcome reported by the peripheral
    pub result: ControlResult,
}

/// Parse a control point response indication.
pub fn parse_control_point_response(data: &[u8]) -> Option<ControlResponse> {
    match data {
        [code, request_opcode, result, ..] if *code == FtmsControlOpcode::ResponseCode as u8 => {
            Some(ControlResponse {
                request_opcode: *request_opcode,
                result: ControlResult::from(*result),
            })
        }
        _ => None,
    }
}
