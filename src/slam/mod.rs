//! Occupancy grid SLAM: particle filter localization coupled to log-odds mapping

pub mod config;
pub mod grid_slam;

pub use config::{GridConfig, SlamConfig, SlamMode};
pub use grid_slam::OccupancyGridSlam;
