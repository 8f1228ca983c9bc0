//! Log-odds occupancy grid mapping from laser scans.
//!
//! Each scan is unwound between the previous trusted pose and the current
//! one, then folded into the grid in two passes:
//!
//! 1. every ray endpoint cell gains `hit_odds`,
//! 2. every cell a ray passes through (endpoint excluded) loses `miss_odds`.
//!
//! Both passes saturate at the `i8` bounds. Because saturating addition is not
//! order independent the endpoint pass always runs to completion before the
//! free-space pass starts.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::common::{GridCell, LaserScan, Pose2D, SlamError, SlamResult};
use crate::mapping::moving_laser_scan::{AdjustedRay, MovingLaserScan};
use crate::mapping::OccupancyGrid;
use crate::utils::grid_utils::grid_position_to_cell;
use crate::utils::ray_trace::{divide_and_step, RayCells};

/// How the cells between a ray's origin and endpoint are enumerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RayTraversal {
    /// Every cell of the Bresenham line
    #[default]
    Bresenham,
    /// Half-cell sampling along the ray
    DivideAndStep,
}

/// Configuration for occupancy grid mapping
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// Rays with a range at or beyond this are treated as no-return [m]
    pub max_laser_distance: f64,
    /// Rays with a range at or below this are treated as invalid [m]
    pub min_range: f64,
    /// Log-odds added to an endpoint cell
    pub hit_odds: i8,
    /// Log-odds removed from a pass-through cell
    pub miss_odds: i8,
    /// Use every n-th return of a scan
    pub ray_stride: usize,
    pub traversal: RayTraversal,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            max_laser_distance: 5.0,
            min_range: 0.1,
            hit_odds: 3,
            miss_odds: 1,
            ray_stride: 1,
            traversal: RayTraversal::Bresenham,
        }
    }
}

impl MappingConfig {
    pub fn validate(&self) -> SlamResult<()> {
        if self.hit_odds < 0 || self.miss_odds < 0 {
            return Err(SlamError::InvalidParameter(format!(
                "hit_odds and miss_odds must be non-negative, got {} and {}",
                self.hit_odds, self.miss_odds
            )));
        }
        if !(self.max_laser_distance > self.min_range && self.min_range >= 0.0) {
            return Err(SlamError::InvalidParameter(format!(
                "laser range window [{}, {}) is empty",
                self.min_range, self.max_laser_distance
            )));
        }
        Ok(())
    }
}

/// Cell counts touched by one map update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapUpdateStats {
    /// Rays inside the valid range window
    pub rays: usize,
    /// Endpoint cells incremented
    pub hits: usize,
    /// Pass-through cells decremented
    pub misses: usize,
}

/// Occupancy grid mapper.
#[derive(Debug, Clone)]
pub struct Mapping {
    config: MappingConfig,
    previous_pose: Option<Pose2D>,
}

impl Mapping {
    pub fn new(config: MappingConfig) -> SlamResult<Self> {
        config.validate()?;
        Ok(Mapping {
            config,
            previous_pose: None,
        })
    }

    pub fn config(&self) -> &MappingConfig {
        &self.config
    }

    /// Pose the previous scan was integrated at.
    pub fn previous_pose(&self) -> Option<Pose2D> {
        self.previous_pose
    }

    /// Forget the previous pose; the next scan is treated as stationary.
    pub fn reset(&mut self) {
        self.previous_pose = None;
    }

    /// Unwind the next scan from `pose` without integrating anything.
    pub fn reset_previous(&mut self, pose: &Pose2D) {
        self.previous_pose = Some(*pose);
    }

    /// Fold `scan`, measured while moving to `pose`, into `map`.
    pub fn update_map(&mut self, scan: &LaserScan, pose: &Pose2D, map: &mut OccupancyGrid) -> MapUpdateStats {
        let previous = self.previous_pose.unwrap_or(*pose);
        let moving_scan = MovingLaserScan::new(
            scan,
            &previous,
            pose,
            self.config.ray_stride,
            self.config.min_range,
        );

        let mut stats = MapUpdateStats::default();
        let in_range: Vec<&AdjustedRay> = moving_scan
            .iter()
            .filter(|ray| ray.range < self.config.max_laser_distance)
            .collect();
        stats.rays = in_range.len();

        for ray in &in_range {
            if self.score_endpoint(ray, map) {
                stats.hits += 1;
            }
        }
        for ray in &in_range {
            stats.misses += self.score_ray(ray, map);
        }

        debug!(
            "map update at ({:.3}, {:.3}, {:.3}): {} rays, {} hits, {} misses",
            pose.x, pose.y, pose.theta, stats.rays, stats.hits, stats.misses
        );

        self.previous_pose = Some(*pose);
        stats
    }

    /// Increase the odds of the cell the ray ended in.
    fn score_endpoint(&self, ray: &AdjustedRay, map: &mut OccupancyGrid) -> bool {
        let (_, end) = ray_cells(ray, map);
        map.increase_log_odds(end.x, end.y, self.config.hit_odds)
    }

    /// Decrease the odds of every cell the ray passed through.
    fn score_ray(&self, ray: &AdjustedRay, map: &mut OccupancyGrid) -> usize {
        let (start, end) = ray_cells(ray, map);
        let cells: Vec<GridCell> = match self.config.traversal {
            RayTraversal::Bresenham => RayCells::new(start, end)
                .take_while(|cell| *cell != end)
                .collect(),
            RayTraversal::DivideAndStep => {
                let (origin, _) = ray.grid_segment(map);
                let range_cells = ray.range * map.cells_per_meter();
                divide_and_step(origin, ray.theta, range_cells, 0.5)
                    .into_iter()
                    .filter(|cell| *cell != end)
                    .collect()
            }
        };

        cells
            .into_iter()
            .filter(|cell| map.decrease_log_odds(cell.x, cell.y, self.config.miss_odds))
            .count()
    }
}

/// Origin and endpoint cells of a ray.
pub fn ray_cells(ray: &AdjustedRay, map: &OccupancyGrid) -> (GridCell, GridCell) {
    let (start, end) = ray.grid_segment(map);
    (grid_position_to_cell(start), grid_position_to_cell(end))
}
