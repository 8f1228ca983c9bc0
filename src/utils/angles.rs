//! Angle helpers.

use std::f64::consts::PI;

use crate::common::Pose2D;

const TWO_PI: f64 = 2.0 * PI;

/// Normalize angle to (-pi, pi].
pub fn wrap_to_pi(angle: f64) -> f64 {
    if !angle.is_finite() || (angle > -PI && angle <= PI) {
        return angle;
    }
    // rem_euclid may round up to exactly 2*pi for tiny negative inputs
    let wrapped = PI - (PI - angle).rem_euclid(TWO_PI);
    if wrapped <= -PI {
        wrapped + TWO_PI
    } else {
        wrapped
    }
}

/// Signed shortest rotation taking `b` to `a`, in (-pi, pi].
pub fn angle_diff(a: f64, b: f64) -> f64 {
    wrap_to_pi(a - b)
}

/// Linear interpolation between two poses.
///
/// Position is interpolated linearly, heading along the shortest arc.
/// The timestamp is interpolated as well. `fraction` is clamped to [0, 1].
pub fn interpolate_pose(from: &Pose2D, to: &Pose2D, fraction: f64) -> Pose2D {
    let f = fraction.clamp(0.0, 1.0);
    let dtheta = angle_diff(to.theta, from.theta);
    let utime = from.utime + ((to.utime - from.utime) as f64 * f).round() as i64;
    Pose2D::with_time(
        from.x + f * (to.x - from.x),
        from.y + f * (to.y - from.y),
        from.theta + f * dtheta,
        utime,
    )
}
