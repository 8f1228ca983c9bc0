//! Geometry and grid helpers shared by mapping and localization

pub mod angles;
pub mod grid_utils;
pub mod ray_trace;

pub use angles::{angle_diff, interpolate_pose, wrap_to_pi};
pub use ray_trace::{bresenham, cast_ray, divide_and_step, RayCells};
