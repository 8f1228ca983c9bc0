//! Motion-compensated laser scan.
//!
//! A sweep takes a non-zero time to acquire, so each return was measured from
//! a slightly different robot pose. [`MovingLaserScan`] attributes to every
//! return a pose interpolated between the pose at scan start and the pose at
//! scan end, proportional to the return's position in the sweep, and turns it
//! into a world-frame ray. Both the mapper and the sensor model consume these
//! rays.

use crate::common::{LaserScan, Point2D, Pose2D};
use crate::mapping::OccupancyGrid;
use crate::utils::angles::{interpolate_pose, wrap_to_pi};
use crate::utils::grid_utils::global_position_to_grid_position;

/// A ray in the world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdjustedRay {
    /// Sensor position when the return was measured.
    pub origin: Point2D,
    /// Measured range [m].
    pub range: f64,
    /// World heading of the ray [rad].
    pub theta: f64,
}

impl AdjustedRay {
    /// World coordinates of the ray end.
    pub fn endpoint(&self) -> Point2D {
        Point2D::new(
            self.origin.x + self.range * self.theta.cos(),
            self.origin.y + self.range * self.theta.sin(),
        )
    }

    /// Ray origin and end in continuous grid coordinates.
    pub fn grid_segment(&self, grid: &OccupancyGrid) -> (Point2D, Point2D) {
        let start = global_position_to_grid_position(self.origin, grid);
        let length = self.range * grid.cells_per_meter();
        let end = Point2D::new(
            start.x + length * self.theta.cos(),
            start.y + length * self.theta.sin(),
        );
        (start, end)
    }
}

/// Scan whose rays have been unwound against the robot motion during the sweep.
#[derive(Debug, Clone, Default)]
pub struct MovingLaserScan {
    rays: Vec<AdjustedRay>,
}

impl MovingLaserScan {
    /// Unwind `scan` between `begin_pose` and `end_pose`.
    ///
    /// Every `ray_stride`-th return is kept (a stride of 0 is treated as 1).
    /// Returns with a range not above `min_range`, or a non-finite range, are
    /// dropped. Return `i` of `n` is attributed the pose at fraction
    /// `i / (n - 1)` of the motion, so the first return sits at `begin_pose`
    /// and the last at `end_pose`.
    pub fn new(
        scan: &LaserScan,
        begin_pose: &Pose2D,
        end_pose: &Pose2D,
        ray_stride: usize,
        min_range: f64,
    ) -> Self {
        let n = scan.returns.len();
        if n == 0 {
            return Self::default();
        }

        let stride = ray_stride.max(1);
        let denominator = if n > 1 { (n - 1) as f64 } else { 1.0 };

        let rays = scan
            .returns
            .iter()
            .enumerate()
            .step_by(stride)
            .filter(|(_, ret)| ret.range.is_finite() && ret.range > min_range)
            .map(|(i, ret)| {
                let pose = interpolate_pose(begin_pose, end_pose, i as f64 / denominator);
                AdjustedRay {
                    origin: pose.position(),
                    range: ret.range,
                    theta: wrap_to_pi(pose.theta + ret.bearing),
                }
            })
            .collect();

        MovingLaserScan { rays }
    }

    pub fn rays(&self) -> &[AdjustedRay] {
        &self.rays
    }

    pub fn len(&self) -> usize {
        self.rays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rays.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AdjustedRay> {
        self.rays.iter()
    }
}

impl<'a> IntoIterator for &'a MovingLaserScan {
    type Item = &'a AdjustedRay;
    type IntoIter = std::slice::Iter<'a, AdjustedRay>;

    fn into_iter(self) -> Self::IntoIter {
        self.rays.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::LaserReturn;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn scan_of(ranges: &[f64]) -> LaserScan {
        let bearings = vec![0.0; ranges.len()];
        LaserScan::from_ranges(0, ranges, &bearings, 100_000)
    }

    #[test]
    fn test_static_pose_keeps_bearings() {
        let scan = LaserScan::new(
            0,
            vec![
                LaserReturn { range: 1.0, bearing: 0.0, utime: 0 },
                LaserReturn { range: 2.0, bearing: FRAC_PI_2, utime: 0 },
            ],
        );
        let pose = Pose2D::new(1.0, 2.0, FRAC_PI_2);
        let moving = MovingLaserScan::new(&scan, &pose, &pose, 1, 0.0);
        assert_eq!(moving.len(), 2);

        let end = moving.rays()[0].endpoint();
        assert_abs_diff_eq!(end.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(end.y, 3.0, epsilon = 1e-12);

        let end = moving.rays()[1].endpoint();
        assert_abs_diff_eq!(end.x, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(end.y, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_origins_interpolate_across_sweep() {
        let scan = scan_of(&[1.0, 1.0, 1.0, 1.0, 1.0]);
        let begin = Pose2D::new(0.0, 0.0, 0.0);
        let end = Pose2D::new(1.0, 0.0, 0.4);
        let moving = MovingLaserScan::new(&scan, &begin, &end, 1, 0.0);

        let rays = moving.rays();
        assert_abs_diff_eq!(rays[0].origin.x, 0.0);
        assert_abs_diff_eq!(rays[2].origin.x, 0.5);
        assert_abs_diff_eq!(rays[2].theta, 0.2, epsilon = 1e-12);
        assert_abs_diff_eq!(rays[4].origin.x, 1.0);
        assert_abs_diff_eq!(rays[4].theta, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_stride_and_min_range_filter() {
        let scan = scan_of(&[1.0, 0.05, 1.0, 1.0, 0.0, f64::NAN, 2.0]);
        let pose = Pose2D::origin();

        let all = MovingLaserScan::new(&scan, &pose, &pose, 1, 0.1);
        assert_eq!(all.len(), 4);

        let strided = MovingLaserScan::new(&scan, &pose, &pose, 2, 0.1);
        // indices 0, 2, 4, 6 -> index 4 has zero range
        assert_eq!(strided.len(), 3);

        let zero_stride = MovingLaserScan::new(&scan, &pose, &pose, 0, 0.1);
        assert_eq!(zero_stride.len(), 4);
    }

    #[test]
    fn test_empty_scan() {
        let moving = MovingLaserScan::new(&LaserScan::default(), &Pose2D::origin(), &Pose2D::origin(), 1, 0.0);
        assert!(moving.is_empty());
    }
}
