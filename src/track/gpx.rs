//! GPX file reader producing raw GPS points for [`Track::materialize`].
//!
//! Geometry comes from the `gpx` crate. Per-point heart rate, cadence and
//! power live in `<extensions>` (usually a Garmin `TrackPointExtension`),
//! which that crate drops, so a second pass over the XML picks them up.
//!
//! [`Track::materialize`]: super::Track::materialize

use super::{GpsPoint, ImportError, Track};
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::path::Path;

/// Name used when the file carries none.
pub const UNNAMED_TRACK: &str = "Unnamed Track";

/// Points and name read from a GPX document.
#[derive(Debug, Clone)]
pub struct GpxRoute {
    pub name: String,
    pub points: Vec<GpsPoint>,
}

impl GpxRoute {
    /// Materialize into a track.
    pub fn into_track(self) -> Result<Track, ImportError> {
        Ok(Track::materialize(self.name, self.points)?)
    }
}

/// Convert gpx Time to chrono DateTime
fn gpx_time_to_chrono(time: gpx::Time) -> Option<DateTime<Utc>> {
    // gpx::Time wraps time::OffsetDateTime, convert via string format
    let formatted = time.format().ok()?;
    DateTime::parse_from_rfc3339(&formatted)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn to_gps_point(point: gpx::Waypoint) -> GpsPoint {
    GpsPoint {
        latitude: point.point().y(),
        longitude: point.point().x(),
        elevation: point.elevation,
        timestamp: point.time.and_then(gpx_time_to_chrono),
        heart_rate: None,
        cadence: None,
        power: None,
    }
}

/// Sensor values attached to one point.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct PointExtensions {
    heart_rate: Option<u8>,
    cadence: Option<u16>,
    power: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ExtensionField {
    HeartRate,
    Cadence,
    Power,
}

impl ExtensionField {
    /// Match an element's local name, ignoring namespace prefix and case.
    fn from_local_name(name: &[u8]) -> Option<Self> {
        match name.to_ascii_lowercase().as_slice() {
            b"hr" | b"heartrate" => Some(Self::HeartRate),
            b"cad" | b"cadence" => Some(Self::Cadence),
            b"power" | b"powerinwatts" => Some(Self::Power),
            _ => None,
        }
    }
}

impl PointExtensions {
    fn set(&mut self, field: ExtensionField, raw: &str) {
        let Ok(value) = raw.parse::<f64>() else {
            tracing::debug!(?field, raw, "Ignoring non-numeric extension value");
            return;
        };
        if !value.is_finite() || value < 0.0 {
            return;
        }
        let value = value.round() as u64;
        match field {
            ExtensionField::HeartRate => self.heart_rate = u8::try_from(value).ok(),
            ExtensionField::Cadence => self.cadence = u16::try_from(value).ok(),
            ExtensionField::Power => self.power = u16::try_from(value).ok(),
        }
    }

    fn apply(self, point: &mut GpsPoint) {
        point.heart_rate = self.heart_rate;
        point.cadence = self.cadence;
        point.power = self.power;
    }
}

/// Extensions of every `<trkpt>` and `<rtept>`, in document order.
#[derive(Debug, Default)]
struct ExtensionScan {
    track: Vec<PointExtensions>,
    route: Vec<PointExtensions>,
}

fn scan_point_extensions(content: &[u8]) -> Result<ExtensionScan, ImportError> {
    let mut reader = Reader::from_reader(content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut scan = ExtensionScan::default();
    // Point being read, and whether it is a route point
    let mut current: Option<(PointExtensions, bool)> = None;
    let mut in_extensions = false;
    let mut field: Option<ExtensionField> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"trkpt" => current = Some((PointExtensions::default(), false)),
                b"rtept" => current = Some((PointExtensions::default(), true)),
                b"extensions" if current.is_some() => in_extensions = true,
                name if in_extensions => field = ExtensionField::from_local_name(name),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"trkpt" => scan.track.push(PointExtensions::default()),
                b"rtept" => scan.route.push(PointExtensions::default()),
                _ => {}
            },
            Ok(Event::Text(text)) => {
                if let (Some(field), Some((point, _))) = (field, current.as_mut()) {
                    let value = text
                        .unescape()
                        .map_err(|e| ImportError::ParseError(format!("GPX text error: {}", e)))?;
                    point.set(field, value.trim());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"trkpt" | b"rtept" => {
                    if let Some((point, is_route)) = current.take() {
                        if is_route {
                            scan.route.push(point);
                        } else {
                            scan.track.push(point);
                        }
                    }
                    in_extensions = false;
                    field = None;
                }
                b"extensions" => {
                    in_extensions = false;
                    field = None;
                }
                _ => field = None,
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ImportError::ParseError(format!(
                    "GPX parse error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(scan)
}

fn attach_extensions(points: &mut [GpsPoint], extensions: &[PointExtensions]) {
    if extensions.len() != points.len() {
        tracing::warn!(
            points = points.len(),
            extensions = extensions.len(),
            "Point count mismatch, ignoring GPX extensions"
        );
        return;
    }
    for (point, ext) in points.iter_mut().zip(extensions) {
        ext.apply(point);
    }
}

/// Parse GPX content. Track points are used first, then route points.
pub fn parse_gpx(content: &[u8]) -> Result<GpxRoute, ImportError> {
    let gpx_data: gpx::Gpx = gpx::read(content)
        .map_err(|e| ImportError::ParseError(format!("GPX parse error: {}", e)))?;

    let mut name = gpx_data
        .tracks
        .iter()
        .find_map(|t| t.name.clone())
        .or_else(|| gpx_data.routes.iter().find_map(|r| r.name.clone()))
        .or_else(|| gpx_data.metadata.as_ref().and_then(|m| m.name.clone()));

    let mut points: Vec<GpsPoint> = gpx_data
        .tracks
        .into_iter()
        .flat_map(|track| track.segments)
        .flat_map(|segment| segment.points)
        .map(to_gps_point)
        .collect();

    let mut from_routes = false;
    if points.is_empty() {
        points = gpx_data
            .routes
            .into_iter()
            .flat_map(|route| route.points)
            .map(to_gps_point)
            .collect();
        from_routes = true;
    }

    if points.is_empty() {
        return Err(ImportError::ParseError(
            "No GPS points found in GPX file".to_string(),
        ));
    }

    match scan_point_extensions(content) {
        Ok(scan) if from_routes => attach_extensions(&mut points, &scan.route),
        Ok(scan) => attach_extensions(&mut points, &scan.track),
        Err(e) => tracing::warn!("Skipping GPX extensions: {}", e),
    }

    let name = name.take().unwrap_or_else(|| UNNAMED_TRACK.to_string());
    tracing::info!(name = %name, points = points.len(), "Parsed GPX route");

    Ok(GpxRoute { name, points })
}

/// Read and parse a GPX file from disk.
pub fn read_gpx_file(path: &Path) -> Result<GpxRoute, ImportError> {
    let content = std::fs::read(path)?;
    parse_gpx(&content)
}
