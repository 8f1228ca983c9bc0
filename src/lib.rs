//! mcl_slam - Monte Carlo Localization with occupancy grid mapping
//!
//! This crate estimates a mobile robot's pose from wheel odometry and planar
//! laser scans with a particle filter, and builds a log-odds occupancy grid
//! of the environment from the same scans.

// Core modules
pub mod common;
pub mod utils;

// Algorithm modules
pub mod localization;
pub mod mapping;
pub mod slam;

// Re-export common types for convenience
pub use common::{GridCell, LaserReturn, LaserScan, Particle, Point2D, Pose2D};
pub use common::LikelihoodModel;
pub use common::{SlamError, SlamResult};
pub use localization::{ParticleFilter, ParticleFilterConfig};
pub use mapping::{Mapping, MappingConfig, OccupancyGrid};
pub use slam::{OccupancyGridSlam, SlamConfig, SlamMode};
