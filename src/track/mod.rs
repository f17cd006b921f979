//! GPS track geometry.
//!
//! A [`Track`] is an ordered list of points with a materialized distance
//! index, built once from raw GPS points. It answers two questions for the
//! workout engine: where along the route a given distance lands, and how
//! steep the road is there.

pub mod gpx;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Half-width of the gradient window in meters.
pub const GRADIENT_WINDOW_M: f64 = 50.0;

/// Segments shorter than this are not interpolated.
pub const MIN_SEGMENT_M: f64 = 0.1;

/// Gradient windows shorter than this report a flat road.
pub const MIN_GRADIENT_SPAN_M: f64 = 1.0;

/// Raw GPS point as delivered by a file parser, in traversal order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters
    pub elevation: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub heart_rate: Option<u8>,
    pub cadence: Option<u16>,
    pub power: Option<u16>,
}

impl GpsPoint {
    /// Point with position and elevation only.
    pub fn new(latitude: f64, longitude: f64, elevation: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            elevation,
            ..Default::default()
        }
    }
}

/// A point on a materialized track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    /// Elevation in meters
    pub elevation_m: Option<f64>,
    /// Distance along the track from the first point
    pub distance_from_start_m: f64,
    pub timestamp: Option<DateTime<Utc>>,
    pub heart_rate: Option<u8>,
    pub cadence: Option<u16>,
    pub power: Option<u16>,
}

impl TrackPoint {
    fn from_gps(point: GpsPoint, distance_from_start_m: f64) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            elevation_m: point.elevation,
            distance_from_start_m,
            timestamp: point.timestamp,
            heart_rate: point.heart_rate,
            cadence: point.cadence,
            power: point.power,
        }
    }
}

/// Track construction errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    #[error("Track has no points")]
    Empty,

    #[error("Point {index} has a non-finite coordinate")]
    NonFiniteCoordinate { index: usize },
}

/// Errors while reading a track file.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid track: {0}")]
    InvalidTrack(#[from] TrackError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Calculate horizontal distance between two GPS points (Haversine formula)
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS: f64 = 6_371_000.0; // meters

    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS * c
}

fn lerp(a: f64, b: f64, t: f64) -> f64 {
    a + (b - a) * t
}

fn interpolate_elevation(e1: Option<f64>, e2: Option<f64>, ratio: f64) -> Option<f64> {
    match (e1, e2) {
        (Some(a), Some(b)) => Some(lerp(a, b, ratio)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// A named route with a materialized distance index.
#[derive(Debug, Clone, Serialize)]
pub struct Track {
    name: String,
    points: Vec<TrackPoint>,
    total_distance_m: f64,
}

impl Track {
    /// Build a track from points in traversal order, summing great-circle
    /// distances between neighbours. The first point sits at 0 m.
    pub fn materialize(name: impl Into<String>, points: Vec<GpsPoint>) -> Result<Self, TrackError> {
        if points.is_empty() {
            return Err(TrackError::Empty);
        }

        if let Some(index) = points
            .iter()
            .position(|p| !p.latitude.is_finite() || !p.longitude.is_finite())
        {
            return Err(TrackError::NonFiniteCoordinate { index });
        }

        let mut materialized = Vec::with_capacity(points.len());
        let mut distance = 0.0;
        let mut previous: Option<(f64, f64)> = None;

        for point in points {
            if let Some((lat, lon)) = previous {
                distance += haversine_distance(lat, lon, point.latitude, point.longitude);
            }
            previous = Some((point.latitude, point.longitude));
            materialized.push(TrackPoint::from_gps(point, distance));
        }

        let name = name.into();
        tracing::debug!(
            name = %name,
            points = materialized.len(),
            distance_m = distance,
            "Track materialized"
        );

        Ok(Self {
            name,
            points: materialized,
            total_distance_m: distance,
        })
    }

    /// Track name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Materialized points in traversal order.
    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    /// Length of the track in meters.
    pub fn total_distance_m(&self) -> f64 {
        self.total_distance_m
    }

    /// First point.
    pub fn first(&self) -> &TrackPoint {
        &self.points[0]
    }

    /// Last point.
    pub fn last(&self) -> &TrackPoint {
        &self.points[self.points.len() - 1]
    }

    fn clamp_distance(&self, distance_m: f64) -> f64 {
        if distance_m.is_nan() {
            0.0
        } else {
            distance_m.clamp(0.0, self.total_distance_m)
        }
    }

    /// Position at `distance_m` along the track.
    ///
    /// Distances are clamped to the track. Between points, latitude,
    /// longitude and elevation are linearly interpolated; segments shorter
    /// than [`MIN_SEGMENT_M`] return their start point unchanged.
    pub fn position_at(&self, distance_m: f64) -> TrackPoint {
        let distance = self.clamp_distance(distance_m);

        if distance <= 0.0 {
            return self.first().clone();
        }
        if distance >= self.total_distance_m {
            return self.last().clone();
        }

        // First point strictly beyond `distance`; the one before it brackets.
        let next = self
            .points
            .partition_point(|p| p.distance_from_start_m <= distance);
        if next >= self.points.len() {
            return self.last().clone();
        }

        let p1 = &self.points[next - 1];
        let p2 = &self.points[next];

        if distance == p1.distance_from_start_m {
            return p1.clone();
        }

        let segment = p2.distance_from_start_m - p1.distance_from_start_m;
        if segment < MIN_SEGMENT_M {
            return p1.clone();
        }

        let ratio = (distance - p1.distance_from_start_m) / segment;

        TrackPoint {
            latitude: lerp(p1.latitude, p2.latitude, ratio),
            longitude: lerp(p1.longitude, p2.longitude, ratio),
            elevation_m: interpolate_elevation(p1.elevation_m, p2.elevation_m, ratio),
            distance_from_start_m: distance,
            timestamp: None,
            heart_rate: None,
            cadence: None,
            power: None,
        }
    }

    /// Road gradient in percent around `distance_m`.
    ///
    /// Compares elevation [`GRADIENT_WINDOW_M`] behind and ahead (clamped to
    /// the track). Returns 0 when either end has no elevation or the window
    /// is shorter than [`MIN_GRADIENT_SPAN_M`].
    pub fn gradient_at(&self, distance_m: f64) -> f64 {
        let distance = self.clamp_distance(distance_m);

        let before = self.position_at((distance - GRADIENT_WINDOW_M).max(0.0));
        let after = self.position_at((distance + GRADIENT_WINDOW_M).min(self.total_distance_m));

        let (Some(start), Some(end)) = (before.elevation_m, after.elevation_m) else {
            return 0.0;
        };

        let span = after.distance_from_start_m - before.distance_from_start_m;
        if span < MIN_GRADIENT_SPAN_M {
            return 0.0;
        }

        (end - start) / span * 100.0
    }

    /// Total climbing in meters.
    pub fn elevation_gain_m(&self) -> f64 {
        self.points
            .windows(2)
            .filter_map(|w| match (w[0].elevation_m, w[1].elevation_m) {
                (Some(a), Some(b)) if b > a => Some(b - a),
                _ => None,
            })
            .sum()
    }

    /// Whether any point carries elevation.
    pub fn has_elevation(&self) -> bool {
        self.points.iter().any(|p| p.elevation_m.is_some())
    }

    /// Expected riding time in seconds at a steady average speed.
    pub fn estimated_duration_s(&self, average_speed_kmh: f64) -> u32 {
        if average_speed_kmh <= 0.0 {
            return 0;
        }
        (self.total_distance_m / 1000.0 / average_speed_kmh * 3600.0) as u32
    }
}
