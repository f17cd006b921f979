//! Unit tests for interval schedule validation and loading.

use ridelink::workouts::types::{
    Interval, IntervalSchedule, ScheduleError, Target, Workout, WorkoutKind,
};
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

const PYRAMID_TOML: &str = r#"
name = "Pyramid"
total_duration_s = 30

[[intervals]]
duration_s = 10
resistance_pct = 20

[[intervals]]
duration_s = 10
resistance_pct = 50

[[intervals]]
duration_s = 10
resistance_pct = 20
"#;

const ERG_JSON: &str = r#"{
  "name": "Sweet spot",
  "total_duration_s": 600,
  "intervals": [
    { "duration_s": 300, "power_w": 180 },
    { "duration_s": 300, "power_w": 220 }
  ]
}"#;

fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_empty_schedule_rejected() {
    assert_eq!(
        IntervalSchedule::new(0, Vec::new()).unwrap_err(),
        ScheduleError::Empty
    );
}

#[test]
fn test_duration_sum_must_match() {
    let err = IntervalSchedule::new(
        30,
        vec![Interval::resistance(10, 20), Interval::resistance(10, 50)],
    )
    .unwrap_err();
    assert_eq!(
        err,
        ScheduleError::DurationMismatch {
            declared: 30,
            actual: 20
        }
    );
}

#[test]
fn test_resistance_above_100_rejected() {
    let err = IntervalSchedule::new(10, vec![Interval::resistance(10, 101)]).unwrap_err();
    assert_eq!(
        err,
        ScheduleError::ResistanceOutOfRange {
            index: 0,
            value: 101
        }
    );
}

#[test]
fn test_power_out_of_range_rejected() {
    let err = IntervalSchedule::new(
        20,
        vec![Interval::power(10, 200), Interval::power(10, 0)],
    )
    .unwrap_err();
    assert_eq!(err, ScheduleError::PowerOutOfRange { index: 1, value: 0 });
}

#[test]
fn test_mixed_kinds_rejected() {
    let err = IntervalSchedule::new(
        20,
        vec![Interval::power(10, 200), Interval::resistance(10, 50)],
    )
    .unwrap_err();
    assert_eq!(err, ScheduleError::MixedKinds);
}

#[test]
fn test_schedule_accessors() {
    let schedule = IntervalSchedule::new(
        20,
        vec![Interval::resistance(10, 20), Interval::resistance(10, 50)],
    )
    .unwrap()
    .with_name("Two step");

    assert_eq!(schedule.name(), Some("Two step"));
    assert_eq!(schedule.kind(), WorkoutKind::Resistance);
    assert_eq!(schedule.intervals().len(), 2);
    assert_eq!(schedule.interval_index(0), Some(0));
    assert_eq!(schedule.interval_index(10), Some(1));
    assert_eq!(schedule.interval_index(20), None);
    assert_eq!(schedule.remaining_s(5), 15);
    assert_eq!(schedule.remaining_s(50), 0);

    let workout = Workout::Intervals(schedule);
    assert_eq!(workout.name(), "Two step");
    assert_eq!(workout.estimated_duration_s(20.0), 20);
    assert!(workout.track().is_none());
}

#[test]
fn test_load_toml_schedule() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "pyramid.toml", PYRAMID_TOML);

    let schedule = IntervalSchedule::from_file(&path).unwrap();
    assert_eq!(schedule.name(), Some("Pyramid"));
    assert_eq!(schedule.total_duration_s(), 30);
    assert_eq!(
        schedule.current_interval(15).map(|i| i.target),
        Some(Target::ResistancePercent(50))
    );
}

#[test]
fn test_load_json_schedule() {
    let dir = TempDir::new().unwrap();
    let path = write_file(&dir, "erg.json", ERG_JSON);

    let schedule = IntervalSchedule::from_file(&path).unwrap();
    assert_eq!(schedule.kind(), WorkoutKind::Power);
    assert_eq!(
        schedule.current_interval(301).map(|i| i.target),
        Some(Target::PowerWatts(220))
    );
}

#[test]
fn test_interval_with_both_targets_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
total_duration_s = 10

[[intervals]]
duration_s = 10
resistance_pct = 20
power_w = 200
"#
    )
    .unwrap();

    let err = IntervalSchedule::from_file(file.path()).unwrap_err();
    assert_eq!(err, ScheduleError::AmbiguousTarget { index: 0 });
}

#[test]
fn test_interval_without_target_rejected() {
    let json = r#"{ "total_duration_s": 10, "intervals": [ { "duration_s": 10 } ] }"#;
    let result: Result<IntervalSchedule, _> = serde_json::from_str(json);
    assert!(result.is_err());
}

#[test]
fn test_declared_total_is_not_corrected() {
    let json = r#"{
        "total_duration_s": 25,
        "intervals": [ { "duration_s": 10, "resistance_pct": 20 } ]
    }"#;
    let result: Result<IntervalSchedule, _> = serde_json::from_str(json);
    assert!(result.is_err());
}

#[test]
fn test_missing_file_is_read_error() {
    let dir = TempDir::new().unwrap();
    let err = IntervalSchedule::from_file(&dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ScheduleError::Read(_)));
}

#[test]
fn test_schedule_serializes_as_definition() {
    let schedule = IntervalSchedule::new(
        20,
        vec![Interval::power(10, 150), Interval::power(10, 250)],
    )
    .unwrap();

    let json = serde_json::to_value(&schedule).unwrap();
    assert_eq!(json["total_duration_s"], 20);
    assert_eq!(json["intervals"][1]["power_w"], 250);
    assert!(json["intervals"][0].get("resistance_pct").is_none());
}
