//! Unit tests for wheel and crank counter differencing.

use ridelink::sensors::counters::{
    crank_cadence_rpm, event_time_delta, wheel_speed_kmh, CounterConfig, CounterDifferencer,
    CounterError, CounterStream, CrankSample, WheelSample,
};

fn wheel(revolutions: u32, event_time: u16) -> WheelSample {
    WheelSample {
        revolutions,
        event_time,
    }
}

fn crank(revolutions: u16, event_time: u16) -> CrankSample {
    CrankSample {
        revolutions,
        event_time,
    }
}

#[test]
fn test_event_time_wraparound() {
    assert_eq!(event_time_delta(65000, 500), 1036);
    assert_eq!(event_time_delta(0, 1024), 1024);
    assert_eq!(event_time_delta(1024, 1024), 0);
}

#[test]
fn test_wheel_speed_formula() {
    // 2 revolutions of 2.105 m in one second
    let speed = wheel_speed_kmh(2, 1024, 2.105);
    assert!((speed - 2.0 * 2.105 * 3.6).abs() < 1e-9);
}

#[test]
fn test_crank_cadence_formula() {
    assert_eq!(crank_cadence_rpm(1, 1024), 60);
    assert_eq!(crank_cadence_rpm(2, 2048), 60);
    assert_eq!(crank_cadence_rpm(3, 2048), 90);
}

#[test]
fn test_first_wheel_sample_has_no_speed() {
    let mut diff = CounterDifferencer::default();
    assert_eq!(diff.push_wheel(wheel(100, 0)).unwrap(), None);
}

#[test]
fn test_wheel_speed_from_consecutive_samples() {
    let mut diff = CounterDifferencer::default();
    diff.push_wheel(wheel(100, 0)).unwrap();

    let speed = diff.push_wheel(wheel(102, 1024)).unwrap().unwrap();
    assert!((speed - 15.156).abs() < 0.01);
}

#[test]
fn test_wheel_speed_across_event_time_wrap() {
    let mut diff = CounterDifferencer::default();
    diff.push_wheel(wheel(10, 65000)).unwrap();

    let speed = diff.push_wheel(wheel(12, 500)).unwrap().unwrap();
    let expected = wheel_speed_kmh(2, 1036, 2.105);
    assert!((speed as f64 - expected).abs() < 0.001);
}

#[test]
fn test_wheel_counter_going_backwards_is_zero_speed() {
    let mut diff = CounterDifferencer::default();
    diff.push_wheel(wheel(1000, 0)).unwrap();

    assert_eq!(diff.push_wheel(wheel(5, 1024)).unwrap(), Some(0.0));

    // The lower count is the new reference
    let speed = diff.push_wheel(wheel(7, 2048)).unwrap().unwrap();
    let expected = wheel_speed_kmh(2, 1024, 2.105);
    assert!((speed as f64 - expected).abs() < 0.001);
}

#[test]
fn test_backwards_wheel_counter_still_checks_window() {
    let mut diff = CounterDifferencer::default();
    diff.push_wheel(wheel(1000, 0)).unwrap();

    // 50 ms window
    assert!(diff.push_wheel(wheel(5, 51)).is_err());
}

#[test]
fn test_custom_circumference() {
    let mut diff = CounterDifferencer::new(CounterConfig {
        wheel_circumference_m: 2.0,
        ..Default::default()
    });
    diff.push_wheel(wheel(0, 0)).unwrap();

    let speed = diff.push_wheel(wheel(5, 1024)).unwrap().unwrap();
    assert!((speed - 36.0).abs() < 0.001);
    assert_eq!(diff.wheel_circumference_m(), 2.0);
}

#[test]
fn test_wheel_window_too_long() {
    let mut diff = CounterDifferencer::default();
    diff.push_wheel(wheel(0, 0)).unwrap();

    // Six seconds between events
    let err = diff.push_wheel(wheel(1, 6 * 1024)).unwrap_err();
    assert!(matches!(
        err,
        CounterError::ImplausibleSample {
            stream: CounterStream::Wheel,
            ..
        }
    ));
}

#[test]
fn test_wheel_speed_too_high() {
    let mut diff = CounterDifferencer::default();
    diff.push_wheel(wheel(0, 0)).unwrap();

    // 20 revolutions in about 0.1 s
    assert!(diff.push_wheel(wheel(20, 103)).is_err());
}

#[test]
fn test_first_crank_sample_has_no_cadence() {
    let mut diff = CounterDifferencer::default();
    assert_eq!(diff.push_crank(crank(10, 0)).unwrap(), None);
}

#[test]
fn test_crank_cadence_from_consecutive_samples() {
    let mut diff = CounterDifferencer::default();
    diff.push_crank(crank(10, 0)).unwrap();
    assert_eq!(diff.push_crank(crank(12, 1024)).unwrap(), Some(120));
}

#[test]
fn test_crank_counter_going_backwards_is_zero_cadence() {
    let mut diff = CounterDifferencer::default();
    diff.push_crank(crank(500, 0)).unwrap();
    assert_eq!(diff.push_crank(crank(10, 1024)).unwrap(), Some(0));
    assert_eq!(diff.push_crank(crank(11, 2048)).unwrap(), Some(60));
}

#[test]
fn test_stalled_crank_is_zero_cadence() {
    let mut diff = CounterDifferencer::default();
    diff.push_crank(crank(42, 0)).unwrap();
    assert_eq!(diff.push_crank(crank(42, 1024)).unwrap(), Some(0));
}

#[test]
fn test_crank_without_elapsed_time_rejected() {
    let mut diff = CounterDifferencer::default();
    diff.push_crank(crank(10, 500)).unwrap();
    assert!(diff.push_crank(crank(11, 500)).is_err());
}

#[test]
fn test_crank_cadence_too_high() {
    let mut diff = CounterDifferencer::default();
    diff.push_crank(crank(0, 0)).unwrap();

    // 300 RPM
    let err = diff.push_crank(crank(5, 1024)).unwrap_err();
    assert!(matches!(
        err,
        CounterError::ImplausibleSample {
            stream: CounterStream::Crank,
            ..
        }
    ));
}

#[test]
fn test_reset_forgets_reference() {
    let mut diff = CounterDifferencer::default();
    diff.push_wheel(wheel(0, 0)).unwrap();
    diff.push_crank(crank(0, 0)).unwrap();

    diff.reset();

    assert_eq!(diff.push_wheel(wheel(5, 1024)).unwrap(), None);
    assert_eq!(diff.push_crank(crank(1, 1024)).unwrap(), None);
}
