//! Unit tests for gradient curves, target lookup and the workout engine.

use ridelink::sensors::control::ControlCommand;
use ridelink::track::{GpsPoint, Track};
use ridelink::workouts::engine::{
    interval_target, resistance_to_power, track_target, GradientCurve, WorkoutEngine,
    RESET_TARGET,
};
use ridelink::workouts::types::{
    Interval, IntervalSchedule, Target, Workout, WorkoutError, WorkoutStatus,
};

fn two_step_schedule() -> IntervalSchedule {
    IntervalSchedule::new(
        20,
        vec![Interval::resistance(10, 20), Interval::resistance(10, 50)],
    )
    .unwrap()
}

fn flat_track() -> Track {
    Track::materialize(
        "Flat",
        vec![
            GpsPoint::new(45.0, 7.0, None),
            GpsPoint::new(45.01, 7.0, None),
        ],
    )
    .unwrap()
}

#[test]
fn test_progressive_curve_values() {
    let curve = GradientCurve::Progressive;

    assert_eq!(curve.resistance_for_gradient(-10.0), 5);
    assert_eq!(curve.resistance_for_gradient(-3.0), 5);
    assert_eq!(curve.resistance_for_gradient(-1.0), 10);
    assert_eq!(curve.resistance_for_gradient(0.0), 25);
    assert_eq!(curve.resistance_for_gradient(5.0), 77);
    assert_eq!(curve.resistance_for_gradient(10.0), 100);
    assert_eq!(curve.resistance_for_gradient(f64::NAN), 25);
}

#[test]
fn test_progressive_curve_monotonic_on_climbs() {
    let curve = GradientCurve::Progressive;
    let mut previous = curve.resistance_for_gradient(0.0);

    for step in 1..=200 {
        let g = step as f64 * 0.25;
        let r = curve.resistance_for_gradient(g);
        assert!(r >= previous, "resistance fell at {}%", g);
        previous = r;
    }
}

#[test]
fn test_curves_bounded() {
    for curve in [GradientCurve::Progressive, GradientCurve::Stepped] {
        for step in -500..=500 {
            let g = step as f64 / 10.0;
            assert!(curve.resistance_for_gradient(g) <= 100);
        }
        assert!(curve.resistance_for_gradient(f64::INFINITY) <= 100);
        assert!(curve.resistance_for_gradient(f64::NEG_INFINITY) <= 100);
    }
}

#[test]
fn test_stepped_curve_buckets() {
    let curve = GradientCurve::Stepped;

    assert_eq!(curve.resistance_for_gradient(-6.0), 0);
    assert_eq!(curve.resistance_for_gradient(-2.0), 10);
    assert_eq!(curve.resistance_for_gradient(0.0), 25);
    assert_eq!(curve.resistance_for_gradient(3.0), 45);
    assert_eq!(curve.resistance_for_gradient(6.0), 65);
    assert_eq!(curve.resistance_for_gradient(12.0), 85);
}

#[test]
fn test_resistance_to_power_anchors() {
    assert_eq!(resistance_to_power(0), 28);
    assert_eq!(resistance_to_power(50), 79);
    assert_eq!(resistance_to_power(100), 456);
    assert_eq!(resistance_to_power(250), 456);
}

#[test]
fn test_target_commands() {
    assert_eq!(
        Target::PowerWatts(250).to_command(),
        ControlCommand::SetTargetPower(250)
    );
    assert_eq!(
        Target::ResistancePercent(0).to_command(),
        ControlCommand::SetTargetPower(28)
    );
}

#[test]
fn test_interval_target_lookup() {
    let schedule = two_step_schedule();

    assert_eq!(
        interval_target(&schedule, 0),
        Some(Target::ResistancePercent(20))
    );
    assert_eq!(
        interval_target(&schedule, 5),
        Some(Target::ResistancePercent(20))
    );
    assert_eq!(
        interval_target(&schedule, 9),
        Some(Target::ResistancePercent(20))
    );
    assert_eq!(
        interval_target(&schedule, 10),
        Some(Target::ResistancePercent(50))
    );
    assert_eq!(
        interval_target(&schedule, 15),
        Some(Target::ResistancePercent(50))
    );
    assert_eq!(interval_target(&schedule, 20), None);
    assert_eq!(interval_target(&schedule, 500), None);
}

#[test]
fn test_track_target_on_flat_road() {
    let track = flat_track();
    assert_eq!(
        track_target(&track, 100.0, GradientCurve::Progressive),
        Target::ResistancePercent(25)
    );
    assert_eq!(
        track_target(&track, 100.0, GradientCurve::Stepped),
        Target::ResistancePercent(25)
    );
}

#[test]
fn test_engine_start_requires_workout() {
    let mut engine = WorkoutEngine::default();
    assert!(matches!(engine.start(), Err(WorkoutError::NoWorkoutLoaded)));
}

#[test]
fn test_engine_interval_run() {
    let mut engine = WorkoutEngine::default();
    engine.load(Workout::Intervals(two_step_schedule()));
    assert_eq!(engine.evaluate(0, 0.0), None);

    engine.start().unwrap();
    assert_eq!(engine.evaluate(0, 0.0), Some(Target::ResistancePercent(20)));
    // Unchanged targets are not handed out twice
    assert_eq!(engine.evaluate(1, 0.0), None);
    assert_eq!(engine.evaluate(10, 0.0), Some(Target::ResistancePercent(50)));
    assert_eq!(engine.commanded_target(), Some(Target::ResistancePercent(50)));

    assert_eq!(engine.evaluate(20, 0.0), Some(RESET_TARGET));
    assert_eq!(engine.status(), WorkoutStatus::Completed);
    assert_eq!(engine.evaluate(21, 0.0), None);
    assert!(!engine.is_active());
}

#[test]
fn test_engine_forget_commanded_resends() {
    let mut engine = WorkoutEngine::default();
    engine.load(Workout::Intervals(two_step_schedule()));
    engine.start().unwrap();

    engine.evaluate(0, 0.0);
    engine.forget_commanded();
    assert_eq!(engine.evaluate(1, 0.0), Some(Target::ResistancePercent(20)));
}

#[test]
fn test_engine_pause_and_resume() {
    let mut engine = WorkoutEngine::default();
    engine.load(Workout::Intervals(two_step_schedule()));
    engine.start().unwrap();
    engine.evaluate(0, 0.0);

    engine.pause().unwrap();
    assert_eq!(engine.status(), WorkoutStatus::Paused);
    assert_eq!(engine.evaluate(10, 0.0), None);
    assert!(engine.pause().is_err());

    engine.resume().unwrap();
    assert_eq!(engine.evaluate(10, 0.0), Some(Target::ResistancePercent(50)));
}

#[test]
fn test_engine_stop_resets_once() {
    let mut engine = WorkoutEngine::default();
    engine.load(Workout::Intervals(two_step_schedule()));
    engine.start().unwrap();
    engine.evaluate(0, 0.0);

    assert_eq!(engine.stop().unwrap(), Some(RESET_TARGET));
    assert_eq!(engine.status(), WorkoutStatus::Stopped);
    assert_eq!(engine.stop().unwrap(), None);
}

#[test]
fn test_engine_track_completes_at_end() {
    let track = flat_track();
    let total = track.total_distance_m();

    let mut engine = WorkoutEngine::new(GradientCurve::Progressive);
    engine.load(Workout::Track(track));
    engine.start().unwrap();

    assert_eq!(engine.evaluate(0, 0.0), Some(Target::ResistancePercent(25)));
    assert_eq!(engine.evaluate(60, total / 2.0), None);
    assert_eq!(engine.evaluate(120, total), Some(RESET_TARGET));
    assert_eq!(engine.status(), WorkoutStatus::Completed);
}

#[test]
fn test_power_schedule_targets() {
    let schedule = IntervalSchedule::new(
        60,
        vec![Interval::power(30, 150), Interval::power(30, 250)],
    )
    .unwrap();

    let mut engine = WorkoutEngine::default();
    engine.load(Workout::Intervals(schedule));
    engine.start().unwrap();

    let first = engine.evaluate(0, 0.0).unwrap();
    assert_eq!(first.to_command(), ControlCommand::SetTargetPower(150));
    let second = engine.evaluate(30, 0.0).unwrap();
    assert_eq!(second.to_command(), ControlCommand::SetTargetPower(250));
}
