//! Unit tests for track materialization, position lookup and gradient.

use ridelink::track::{haversine_distance, GpsPoint, Track, TrackError};

fn three_point_track() -> Track {
    Track::materialize(
        "Three",
        vec![
            GpsPoint::new(45.0, 7.0, Some(100.0)),
            GpsPoint::new(45.005, 7.0, Some(120.0)),
            GpsPoint::new(45.005, 7.01, Some(110.0)),
        ],
    )
    .unwrap()
}

#[test]
fn test_haversine_one_degree_latitude() {
    let d = haversine_distance(0.0, 0.0, 1.0, 0.0);
    assert!((d - 111_195.0).abs() < 1.0);
    assert_eq!(haversine_distance(45.0, 7.0, 45.0, 7.0), 0.0);
}

#[test]
fn test_materialize_rejects_empty() {
    assert_eq!(
        Track::materialize("Empty", Vec::new()).unwrap_err(),
        TrackError::Empty
    );
}

#[test]
fn test_materialize_rejects_non_finite() {
    let err = Track::materialize(
        "Broken",
        vec![
            GpsPoint::new(45.0, 7.0, None),
            GpsPoint::new(f64::NAN, 7.0, None),
        ],
    )
    .unwrap_err();
    assert_eq!(err, TrackError::NonFiniteCoordinate { index: 1 });
}

#[test]
fn test_cumulative_distances() {
    let track = three_point_track();
    let points = track.points();

    assert_eq!(points[0].distance_from_start_m, 0.0);
    assert!(points[1].distance_from_start_m > 0.0);
    assert!(points[2].distance_from_start_m > points[1].distance_from_start_m);
    assert_eq!(track.total_distance_m(), points[2].distance_from_start_m);

    let leg = haversine_distance(45.0, 7.0, 45.005, 7.0);
    assert!((points[1].distance_from_start_m - leg).abs() < 1e-9);
}

#[test]
fn test_position_at_endpoints() {
    let track = three_point_track();

    assert_eq!(track.position_at(0.0), *track.first());
    assert_eq!(track.position_at(-25.0), *track.first());
    assert_eq!(track.position_at(f64::NAN), *track.first());
    assert_eq!(track.position_at(track.total_distance_m()), *track.last());
    assert_eq!(
        track.position_at(track.total_distance_m() + 500.0),
        *track.last()
    );
}

#[test]
fn test_position_at_stored_distances_returns_points() {
    let track = three_point_track();

    for point in track.points() {
        let found = track.position_at(point.distance_from_start_m);
        assert_eq!(found.latitude, point.latitude);
        assert_eq!(found.longitude, point.longitude);
        assert_eq!(found.elevation_m, point.elevation_m);
    }
}

#[test]
fn test_position_at_interpolates() {
    let track = Track::materialize(
        "North",
        vec![
            GpsPoint::new(45.0, 7.0, Some(100.0)),
            GpsPoint::new(45.01, 7.0, Some(150.0)),
        ],
    )
    .unwrap();

    let mid = track.position_at(track.total_distance_m() / 2.0);
    assert!((mid.latitude - 45.005).abs() < 1e-9);
    assert_eq!(mid.longitude, 7.0);
    assert!((mid.elevation_m.unwrap() - 125.0).abs() < 1e-6);
    assert!(mid.timestamp.is_none());
}

#[test]
fn test_position_at_missing_elevation_uses_known_end() {
    let track = Track::materialize(
        "Partial",
        vec![
            GpsPoint::new(45.0, 7.0, Some(200.0)),
            GpsPoint::new(45.01, 7.0, None),
        ],
    )
    .unwrap();

    let mid = track.position_at(track.total_distance_m() / 2.0);
    assert_eq!(mid.elevation_m, Some(200.0));
}

#[test]
fn test_duplicate_points_do_not_break_lookup() {
    let track = Track::materialize(
        "Stutter",
        vec![
            GpsPoint::new(45.0, 7.0, Some(100.0)),
            GpsPoint::new(45.0, 7.0, Some(100.0)),
            GpsPoint::new(45.01, 7.0, Some(150.0)),
        ],
    )
    .unwrap();

    let mid = track.position_at(track.total_distance_m() / 2.0);
    assert!(mid.latitude.is_finite());
    assert!(track.gradient_at(10.0).is_finite());
}

#[test]
fn test_single_point_track() {
    let track = Track::materialize("Dot", vec![GpsPoint::new(45.0, 7.0, Some(50.0))]).unwrap();

    assert_eq!(track.total_distance_m(), 0.0);
    assert_eq!(track.position_at(100.0), *track.first());
    assert_eq!(track.gradient_at(0.0), 0.0);
}

#[test]
fn test_gradient_without_elevation_is_flat() {
    let track = Track::materialize(
        "Flat",
        vec![
            GpsPoint::new(45.0, 7.0, None),
            GpsPoint::new(45.01, 7.0, None),
        ],
    )
    .unwrap();

    assert!(!track.has_elevation());
    for d in [0.0, 100.0, 500.0, track.total_distance_m()] {
        assert_eq!(track.gradient_at(d), 0.0);
    }
}

#[test]
fn test_gradient_on_steady_climb() {
    let track = Track::materialize(
        "Climb",
        vec![
            GpsPoint::new(45.0, 7.0, Some(100.0)),
            GpsPoint::new(45.01, 7.0, Some(150.0)),
        ],
    )
    .unwrap();

    let expected = 50.0 / track.total_distance_m() * 100.0;
    let gradient = track.gradient_at(track.total_distance_m() / 2.0);
    assert!((gradient - expected).abs() < 0.01);

    // Window clamps at the start but the slope is the same
    assert!((track.gradient_at(0.0) - expected).abs() < 0.01);
}

#[test]
fn test_gradient_on_descent_is_negative() {
    let track = Track::materialize(
        "Descent",
        vec![
            GpsPoint::new(45.0, 7.0, Some(300.0)),
            GpsPoint::new(45.01, 7.0, Some(250.0)),
        ],
    )
    .unwrap();

    assert!(track.gradient_at(500.0) < 0.0);
}

#[test]
fn test_elevation_gain_counts_climbs_only() {
    let track = Track::materialize(
        "Rolling",
        vec![
            GpsPoint::new(45.0, 7.0, Some(100.0)),
            GpsPoint::new(45.001, 7.0, Some(120.0)),
            GpsPoint::new(45.002, 7.0, Some(110.0)),
            GpsPoint::new(45.003, 7.0, Some(130.0)),
        ],
    )
    .unwrap();

    assert!((track.elevation_gain_m() - 40.0).abs() < 1e-9);
}

#[test]
fn test_estimated_duration() {
    let track = three_point_track();
    let expected = (track.total_distance_m() / 1000.0 / 20.0 * 3600.0) as u32;

    assert_eq!(track.estimated_duration_s(20.0), expected);
    assert_eq!(track.estimated_duration_s(0.0), 0);
}
