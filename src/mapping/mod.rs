//! Occupancy grid mapping
//!
//! - [`occupancy_grid`]: saturating `i8` log-odds grid
//! - [`moving_laser_scan`]: motion-compensated scan rays
//! - [`mapper`]: endpoint and free-space log-odds updates

pub mod mapper;
pub mod moving_laser_scan;
pub mod occupancy_grid;

pub use mapper::{MapUpdateStats, Mapping, MappingConfig, RayTraversal};
pub use moving_laser_scan::{AdjustedRay, MovingLaserScan};
pub use occupancy_grid::OccupancyGrid;
