//! Interval schedules, track workouts and the target engine.

pub mod engine;
pub mod types;

pub use engine::{GradientCurve, WorkoutEngine};
pub use types::{Interval, IntervalSchedule, ScheduleError, Target, Workout, WorkoutStatus};
