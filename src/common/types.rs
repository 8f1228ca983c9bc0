//! Common types used throughout mcl_slam

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::utils::angles::wrap_to_pi;

/// 2D point representation
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn origin() -> Self {
        Self { x: 0.0, y: 0.0 }
    }

    pub fn distance(&self, other: &Point2D) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    pub fn to_vector(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }
}

impl From<(f64, f64)> for Point2D {
    fn from(tuple: (f64, f64)) -> Self {
        Self { x: tuple.0, y: tuple.1 }
    }
}

impl From<Vector2<f64>> for Point2D {
    fn from(v: Vector2<f64>) -> Self {
        Self { x: v[0], y: v[1] }
    }
}

/// Timestamped 2D pose (position + heading).
///
/// `utime` is in microseconds. `theta` is kept in (-pi, pi] by every
/// constructor and operation in this crate, deserialization included.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "PoseRecord")]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub utime: i64,
}

/// Serialized pose fields, wrapped on the way in.
#[derive(Deserialize)]
struct PoseRecord {
    x: f64,
    y: f64,
    theta: f64,
    #[serde(default)]
    utime: i64,
}

impl From<PoseRecord> for Pose2D {
    fn from(record: PoseRecord) -> Self {
        Pose2D::with_time(record.x, record.y, record.theta, record.utime)
    }
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta: wrap_to_pi(theta), utime: 0 }
    }

    pub fn with_time(x: f64, y: f64, theta: f64, utime: i64) -> Self {
        Self { x, y, theta: wrap_to_pi(theta), utime }
    }

    pub fn origin() -> Self {
        Self::default()
    }

    pub fn position(&self) -> Point2D {
        Point2D::new(self.x, self.y)
    }

    pub fn to_vector(&self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.theta)
    }

    /// Same pose stamped with a different time.
    pub fn stamped(mut self, utime: i64) -> Self {
        self.utime = utime;
        self
    }

    /// Euclidean distance between the two positions, heading ignored.
    pub fn distance(&self, other: &Pose2D) -> f64 {
        self.position().distance(&other.position())
    }
}

impl From<Vector3<f64>> for Pose2D {
    fn from(v: Vector3<f64>) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

/// Integer cell coordinates in an occupancy grid. May lie outside the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub fn new(x: i32, y: i32) -> Self {
        GridCell { x, y }
    }
}

/// One pose hypothesis of the particle filter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Particle {
    /// Hypothesized robot pose.
    pub pose: Pose2D,
    /// Pose before the last motion sample was applied.
    pub parent_pose: Pose2D,
    /// Importance weight, non-negative.
    pub weight: f64,
}

impl Particle {
    pub fn new(pose: Pose2D, weight: f64) -> Self {
        Particle { pose, parent_pose: pose, weight }
    }
}

/// A single range-finder return.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LaserReturn {
    /// Measured range [m].
    pub range: f64,
    /// Bearing in the robot frame, counter-clockwise positive [rad].
    pub bearing: f64,
    /// Acquisition time of this return [us].
    pub utime: i64,
}

/// One sweep of a planar range finder.
///
/// Returns are stored in acquisition order: the first return was measured
/// at the scan start pose and the last one at the scan end pose.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LaserScan {
    /// Time the sweep started [us].
    pub utime: i64,
    pub returns: Vec<LaserReturn>,
}

impl LaserScan {
    pub fn new(utime: i64, returns: Vec<LaserReturn>) -> Self {
        LaserScan { utime, returns }
    }

    /// Build a scan from parallel range/bearing slices, spreading timestamps
    /// evenly over `duration_us`.
    pub fn from_ranges(utime: i64, ranges: &[f64], bearings: &[f64], duration_us: i64) -> Self {
        let n = ranges.len().min(bearings.len());
        let returns = ranges
            .iter()
            .zip(bearings.iter())
            .enumerate()
            .map(|(i, (&range, &bearing))| {
                let offset = if n > 1 {
                    duration_us * i as i64 / (n as i64 - 1)
                } else {
                    0
                };
                LaserReturn { range, bearing, utime: utime + offset }
            })
            .collect();
        LaserScan { utime, returns }
    }

    pub fn len(&self) -> usize {
        self.returns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }
}
