//! SLAM configuration
//!
//! Every section has defaults, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! mode: full_slam
//! grid:
//!   width: 400
//!   height: 400
//!   meters_per_cell: 0.05
//! particle_filter:
//!   num_particles: 300
//!   sensor_model:
//!     ray_stride: 4
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::common::{Point2D, Pose2D, SlamError, SlamResult};
use crate::localization::ParticleFilterConfig;
use crate::mapping::{MappingConfig, OccupancyGrid};

/// Which estimators run and whether the map is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlamMode {
    /// Odometry is trusted and only the map is built
    MappingOnly,
    /// The map is given and never written
    LocalizationOnly,
    /// Localize against the map and extend it
    #[default]
    FullSlam,
    /// Propagate particles with odometry only
    ActionOnly,
}

impl SlamMode {
    pub fn writes_map(self) -> bool {
        matches!(self, SlamMode::MappingOnly | SlamMode::FullSlam)
    }

    pub fn localizes(self) -> bool {
        matches!(self, SlamMode::LocalizationOnly | SlamMode::FullSlam)
    }
}

/// Occupancy grid geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Width in cells
    pub width: usize,
    /// Height in cells
    pub height: usize,
    pub meters_per_cell: f64,
    /// World position of the lower-left corner of cell (0, 0)
    pub origin: Point2D,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            meters_per_cell: 0.05,
            origin: Point2D::new(-5.0, -5.0),
        }
    }
}

impl GridConfig {
    /// Empty grid with this geometry.
    pub fn build(&self) -> SlamResult<OccupancyGrid> {
        OccupancyGrid::with_origin(self.width, self.height, self.meters_per_cell, self.origin)
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlamConfig {
    pub mode: SlamMode,
    pub grid: GridConfig,
    pub particle_filter: ParticleFilterConfig,
    pub mapping: MappingConfig,
    /// Pose the filter starts at
    pub initial_pose: Pose2D,
    /// Scatter particles over free space instead (localization only)
    pub random_initial_pose: bool,
    /// Integrate the scan of the very first cycle into the map
    pub map_first_scan: bool,
    /// Motion needed before the next map update [m]
    pub map_update_distance: f64,
    /// Rotation needed before the next map update [rad]
    pub map_update_angle: f64,
}

impl Default for SlamConfig {
    fn default() -> Self {
        Self {
            mode: SlamMode::FullSlam,
            grid: GridConfig::default(),
            particle_filter: ParticleFilterConfig::default(),
            mapping: MappingConfig::default(),
            initial_pose: Pose2D::origin(),
            random_initial_pose: false,
            map_first_scan: true,
            map_update_distance: 0.05,
            map_update_angle: 0.05,
        }
    }
}

impl SlamConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> SlamResult<Self> {
        let config: SlamConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> SlamResult<Self> {
        let yaml = fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml_string(&self) -> SlamResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> SlamResult<()> {
        if self.grid.width == 0 || self.grid.height == 0 {
            return Err(SlamError::InvalidParameter(format!(
                "grid dimensions must be positive, got {}x{}",
                self.grid.width, self.grid.height
            )));
        }
        if !(self.grid.meters_per_cell > 0.0 && self.grid.meters_per_cell.is_finite()) {
            return Err(SlamError::InvalidParameter(format!(
                "meters_per_cell must be positive, got {}",
                self.grid.meters_per_cell
            )));
        }
        if !(self.map_update_distance >= 0.0 && self.map_update_angle >= 0.0) {
            return Err(SlamError::InvalidParameter(
                "map update thresholds must be non-negative".to_string(),
            ));
        }
        self.particle_filter.validate()?;
        self.mapping.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::{LikelihoodMode, ResamplingStrategy};

    #[test]
    fn test_default_config_is_valid() {
        assert!(SlamConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
mode: localization_only
grid:
  width: 100
particle_filter:
  num_particles: 64
  resampling: importance
  sensor_model:
    mode: endpoint_hit
mapping:
  hit_odds: 5
"#;
        let config = SlamConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.mode, SlamMode::LocalizationOnly);
        assert_eq!(config.grid.width, 100);
        assert_eq!(config.grid.height, 200);
        assert_eq!(config.particle_filter.num_particles, 64);
        assert_eq!(config.particle_filter.resampling, ResamplingStrategy::Importance);
        assert_eq!(config.particle_filter.sensor_model.mode, LikelihoodMode::EndpointHit);
        assert_eq!(config.particle_filter.sensor_model.ray_stride, 7);
        assert_eq!(config.mapping.hit_odds, 5);
        assert_eq!(config.mapping.miss_odds, 1);
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = SlamConfig {
            mode: SlamMode::MappingOnly,
            ..Default::default()
        };
        let yaml = config.to_yaml_string().unwrap();
        assert_eq!(SlamConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_initial_pose_heading_wrapped_on_load() {
        let config = SlamConfig::from_yaml_str("initial_pose: { x: 1.0, y: -2.0, theta: 4.0 }\n").unwrap();
        let pose = config.initial_pose;
        assert_eq!((pose.x, pose.y, pose.utime), (1.0, -2.0, 0));
        assert!((pose.theta - (4.0 - 2.0 * std::f64::consts::PI)).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = SlamConfig::from_yaml_str("particle_filter:\n  num_particles: 0\n").unwrap_err();
        assert!(matches!(err, SlamError::InvalidParameter(_)));

        let err = SlamConfig::from_yaml_str("grid:\n  meters_per_cell: -0.1\n").unwrap_err();
        assert!(matches!(err, SlamError::InvalidParameter(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = SlamConfig::from_yaml_str("mode: [not, a, mode]").unwrap_err();
        assert!(matches!(err, SlamError::Config(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = SlamConfig::from_yaml_file("/nonexistent/slam.yaml").unwrap_err();
        assert!(matches!(err, SlamError::Io(_)));
    }

    #[test]
    fn test_mode_flags() {
        assert!(SlamMode::FullSlam.writes_map() && SlamMode::FullSlam.localizes());
        assert!(SlamMode::MappingOnly.writes_map() && !SlamMode::MappingOnly.localizes());
        assert!(!SlamMode::LocalizationOnly.writes_map());
        assert!(!SlamMode::ActionOnly.writes_map() && !SlamMode::ActionOnly.localizes());
    }
}
