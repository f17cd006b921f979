//! Wheel and crank revolution counter differencing.
//!
//! Peripherals report cumulative revolution counts together with a 16-bit
//! event time in 1/1024 s that wraps every 64 s. Speed and cadence come from
//! the difference between consecutive samples of the same stream.

use thiserror::Error;

/// Event time resolution (ticks per second).
pub const EVENT_TIME_TICKS_PER_SECOND: f64 = 1024.0;

/// Speeds at or above this are sensor noise.
pub const MAX_PLAUSIBLE_SPEED_KMH: f64 = 100.0;

/// Cadences above this are counter resets, not pedalling.
pub const MAX_PLAUSIBLE_CADENCE_RPM: u32 = 250;

/// Wheel revolution data (u32 revolutions + u16 event time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelSample {
    /// Cumulative wheel revolutions
    pub revolutions: u32,
    /// Last wheel event time in 1/1024 s
    pub event_time: u16,
}

/// Crank revolution data (u16 revolutions + u16 event time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrankSample {
    /// Cumulative crank revolutions
    pub revolutions: u16,
    /// Last crank event time in 1/1024 s
    pub event_time: u16,
}

/// Counter stream identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterStream {
    Wheel,
    Crank,
}

impl std::fmt::Display for CounterStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CounterStream::Wheel => write!(f, "wheel"),
            CounterStream::Crank => write!(f, "crank"),
        }
    }
}

/// Counter differencing errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CounterError {
    /// Delta or time window outside physical bounds. The new sample was still
    /// stored as the reference for the next one.
    #[error("Implausible {stream} sample: {reason}")]
    ImplausibleSample {
        stream: CounterStream,
        reason: String,
    },
}

impl CounterError {
    fn implausible(stream: CounterStream, reason: String) -> Self {
        CounterError::ImplausibleSample { stream, reason }
    }
}

/// Settings for the counter differencer.
#[derive(Debug, Clone, Copy)]
pub struct CounterConfig {
    /// Wheel circumference in meters
    pub wheel_circumference_m: f64,
    /// Shortest accepted wheel event window in seconds
    pub wheel_window_min_s: f64,
    /// Longest accepted wheel event window in seconds
    pub wheel_window_max_s: f64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            wheel_circumference_m: 2.105,
            wheel_window_min_s: 0.1,
            wheel_window_max_s: 5.0,
        }
    }
}

/// Difference between two event times, allowing for one wraparound.
pub fn event_time_delta(prior: u16, current: u16) -> u16 {
    current.wrapping_sub(prior)
}

/// Speed in km/h for `revolutions` over `ticks` 1/1024 s.
pub fn wheel_speed_kmh(revolutions: u32, ticks: u16, circumference_m: f64) -> f64 {
    let seconds = ticks as f64 / EVENT_TIME_TICKS_PER_SECOND;
    revolutions as f64 * circumference_m / seconds * 3.6
}

/// Cadence in RPM for `revolutions` over `ticks` 1/1024 s.
pub fn crank_cadence_rpm(revolutions: u16, ticks: u16) -> u32 {
    revolutions as u32 * 1024 * 60 / ticks as u32
}

/// Retains the last sample of each stream and turns new samples into
/// speed (wheel) and cadence (crank).
#[derive(Debug)]
pub struct CounterDifferencer {
    config: CounterConfig,
    last_wheel: Option<WheelSample>,
    last_crank: Option<CrankSample>,
}

impl CounterDifferencer {
    /// Create a differencer with the given settings.
    pub fn new(config: CounterConfig) -> Self {
        Self {
            config,
            last_wheel: None,
            last_crank: None,
        }
    }

    /// Feed a wheel sample.
    ///
    /// Returns `Ok(None)` for the first sample of a session, `Ok(Some(0.0))`
    /// when the revolution count did not increase, and the speed in km/h
    /// otherwise.
    pub fn push_wheel(&mut self, sample: WheelSample) -> Result<Option<f32>, CounterError> {
        let Some(prior) = self.last_wheel.replace(sample) else {
            tracing::debug!(?sample, "First wheel sample");
            return Ok(None);
        };

        let ticks = event_time_delta(prior.event_time, sample.event_time);
        let seconds = ticks as f64 / EVENT_TIME_TICKS_PER_SECOND;
        if seconds < self.config.wheel_window_min_s || seconds > self.config.wheel_window_max_s {
            return Err(CounterError::implausible(
                CounterStream::Wheel,
                format!("event window {seconds:.3}s outside plausible range"),
            ));
        }

        // A counter that stood still or went backwards means no wheel motion.
        let delta = sample.revolutions as i64 - prior.revolutions as i64;
        if delta <= 0 {
            return Ok(Some(0.0));
        }
        let revolutions = delta as u32;

        let speed = wheel_speed_kmh(revolutions, ticks, self.config.wheel_circumference_m);
        if !(0.0..MAX_PLAUSIBLE_SPEED_KMH).contains(&speed) {
            return Err(CounterError::implausible(
                CounterStream::Wheel,
                format!("speed {speed:.1} km/h out of range"),
            ));
        }

        tracing::trace!(revolutions, ticks, speed, "Wheel speed");
        Ok(Some(speed as f32))
    }

    /// Feed a crank sample.
    ///
    /// Returns `Ok(None)` for the first sample of a session, otherwise the
    /// cadence in RPM (0 when the revolution count did not increase).
    pub fn push_crank(&mut self, sample: CrankSample) -> Result<Option<u16>, CounterError> {
        let Some(prior) = self.last_crank.replace(sample) else {
            tracing::debug!(?sample, "First crank sample");
            return Ok(None);
        };

        let ticks = event_time_delta(prior.event_time, sample.event_time);
        if ticks == 0 {
            return Err(CounterError::implausible(
                CounterStream::Crank,
                "no time elapsed between crank events".to_string(),
            ));
        }

        let delta = sample.revolutions as i32 - prior.revolutions as i32;
        if delta <= 0 {
            return Ok(Some(0));
        }
        let revolutions = delta as u16;

        let cadence = crank_cadence_rpm(revolutions, ticks);
        if cadence > MAX_PLAUSIBLE_CADENCE_RPM {
            return Err(CounterError::implausible(
                CounterStream::Crank,
                format!("cadence {cadence} RPM out of range"),
            ));
        }

        tracing::trace!(revolutions, ticks, cadence, "Crank cadence");
        Ok(Some(cadence as u16))
    }

    /// Forget both retained samples.
    pub fn reset(&mut self) {
        self.last_wheel = None;
        self.last_crank = None;
    }

    /// Configured wheel circumference in meters.
    pub fn wheel_circumference_m(&self) -> f64 {
        self.config.wheel_circumference_m
    }
}

impl Default for CounterDifferencer {
    fn default() -> Self {
        Self::new(CounterConfig::default())
    }
}
