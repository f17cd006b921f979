//! Unit tests for ride recording and summary statistics.

use chrono::Utc;
use ridelink::recording::types::{RecorderError, RecordingStatus, RideSample, RideSummary};
use ridelink::workouts::types::Target;
use ridelink::RideRecorder;

fn sample(elapsed: u32, power: u16, hr: u8, speed: f32) -> RideSample {
    RideSample {
        elapsed_seconds: elapsed,
        power_watts: power,
        cadence_rpm: 90,
        heart_rate_bpm: hr,
        speed_kmh: speed,
        distance_meters: elapsed as f64 * 10.0,
        ..Default::default()
    }
}

#[test]
fn test_summary_statistics() {
    let samples = vec![
        sample(1, 100, 0, 30.0),
        sample(2, 200, 140, 36.0),
        sample(3, 300, 150, 42.0),
    ];

    let summary = RideSummary::from_samples(&samples, Utc::now(), Some("Test".to_string()));

    assert_eq!(summary.workout_name.as_deref(), Some("Test"));
    assert_eq!(summary.duration_seconds, 3);
    assert_eq!(summary.distance_meters, 30.0);
    assert_eq!(summary.avg_power, 200);
    assert_eq!(summary.max_power, 300);
    assert!((summary.avg_speed_kmh - 36.0).abs() < 0.01);
    assert_eq!(summary.max_speed_kmh, 42.0);
    assert_eq!(summary.avg_cadence, 90);
    // Zero readings mean no monitor, not a stopped heart
    assert_eq!(summary.avg_heart_rate, Some(145));
    assert_eq!(summary.max_heart_rate, Some(150));
}

#[test]
fn test_summary_without_heart_rate() {
    let samples = vec![sample(1, 100, 0, 30.0)];
    let summary = RideSummary::from_samples(&samples, Utc::now(), None);

    assert_eq!(summary.avg_heart_rate, None);
    assert_eq!(summary.max_heart_rate, None);
}

#[test]
fn test_summary_of_nothing() {
    let summary = RideSummary::from_samples(&[], Utc::now(), None);
    assert_eq!(summary.duration_seconds, 0);
    assert_eq!(summary.avg_power, 0);
}

#[test]
fn test_sample_resistance_percent() {
    let mut s = RideSample::default();
    assert_eq!(s.resistance_percent(), None);

    s.target = Some(Target::ResistancePercent(40));
    assert_eq!(s.resistance_percent(), Some(40));

    s.target = Some(Target::PowerWatts(200));
    assert_eq!(s.resistance_percent(), None);
}

#[test]
fn test_recorder_pause_blocks_samples() {
    let mut recorder = RideRecorder::new();
    recorder.start(Some("Paused ride".to_string())).unwrap();
    recorder.record_sample(sample(1, 150, 0, 30.0)).unwrap();

    recorder.pause().unwrap();
    assert_eq!(recorder.status(), RecordingStatus::Paused);
    assert!(matches!(
        recorder.record_sample(sample(2, 150, 0, 30.0)),
        Err(RecorderError::NotRecording)
    ));

    recorder.resume().unwrap();
    recorder.record_sample(sample(3, 150, 0, 30.0)).unwrap();

    let live = recorder.live_summary().unwrap();
    assert_eq!(live.workout_name.as_deref(), Some("Paused ride"));

    let (summary, samples) = recorder.finish().unwrap();
    assert_eq!(samples.len(), 2);
    assert!(summary.ended_at.is_some());
}

#[test]
fn test_recorder_rejects_double_start() {
    let mut recorder = RideRecorder::new();
    recorder.start(None).unwrap();
    assert!(matches!(
        recorder.start(None),
        Err(RecorderError::AlreadyRecording)
    ));

    recorder.discard();
    assert_eq!(recorder.status(), RecordingStatus::Idle);
    assert!(recorder.samples().is_empty());
    assert!(recorder.start(None).is_ok());
}
