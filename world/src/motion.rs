//! Constant-speed motion helpers shared by every chamber.

use std::time::Duration;

use cvd_walkthrough_core::Vec3;

/// Moves `current` toward `target` by at most `max_delta` units.
///
/// The step is clamped: when the remaining distance does not exceed
/// `max_delta` the result is exactly `target`, so arrival can be detected with
/// equality. A non-positive `max_delta` leaves `current` untouched.
#[must_use]
pub fn move_towards(current: Vec3, target: Vec3, max_delta: f32) -> Vec3 {
    if max_delta <= 0.0 {
        return current;
    }

    let delta = target - current;
    let distance = delta.length();
    if distance <= max_delta || distance == 0.0 {
        return target;
    }

    current + delta / distance * max_delta
}

/// Distance covered at `speed` units per second over `dt`.
#[must_use]
pub fn step_length(speed: f32, dt: Duration) -> f32 {
    speed * dt.as_secs_f32()
}
