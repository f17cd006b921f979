//! Power smoothing and the power-to-speed fallback.

/// Default smoothing factor for power.
pub const DEFAULT_POWER_ALPHA: f32 = 0.85;

/// Air density at sea level (kg/m^3).
const AIR_DENSITY: f64 = 1.225;

/// Drag area of a rider on the hoods (m^2).
const DRAG_AREA_M2: f64 = 0.32;

/// Exponential smoother for instantaneous power.
///
/// `filtered = alpha * filtered + (1 - alpha) * raw`
#[derive(Debug, Clone)]
pub struct PowerSmoother {
    /// Weight kept from the previous value (0-1, higher = smoother)
    alpha: f32,
    /// Current filtered value
    filtered: f32,
}

impl PowerSmoother {
    /// Create a smoother with the given factor, clamped to [0, 1).
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 0.999),
            filtered: 0.0,
        }
    }

    /// Feed a raw reading and return the smoothed power in watts.
    ///
    /// A near-zero reading while the filter is already below 1 W leaves the
    /// filter untouched.
    pub fn update(&mut self, raw_watts: u16) -> u16 {
        if raw_watts <= 1 && self.filtered < 1.0 {
            return self.value();
        }

        self.filtered = self.alpha * self.filtered + (1.0 - self.alpha) * raw_watts as f32;
        self.value()
    }

    /// Current smoothed power in watts.
    pub fn value(&self) -> u16 {
        self.filtered as u16
    }

    /// Return to zero.
    pub fn reset(&mut self) {
        self.filtered = 0.0;
    }
}

impl Default for PowerSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_POWER_ALPHA)
    }
}

/// Rough flat-road speed for a given power, in km/h.
///
/// This is NOT a measurement. It assumes all power goes into aerodynamic
/// drag (`P = 0.5 * rho * CdA * v^3`) and ignores rolling resistance, weight
/// and wind. Only use it when the peripheral reports no speed at all.
pub fn estimate_speed_from_power(power_watts: u16) -> f32 {
    if power_watts == 0 {
        return 0.0;
    }

    let speed_mps = (power_watts as f64 / (0.5 * AIR_DENSITY * DRAG_AREA_M2)).cbrt();
    (speed_mps * 3.6) as f32
}
