//! Laser scan sensor model
//!
//! Scores how well a particle explains a scan against the occupancy grid. The
//! scan is unwound between the particle's parent pose and its pose, and every
//! ray endpoint is compared with the map:
//!
//! - [`LikelihoodMode::NearestOccupied`]: find the nearest occupied cell
//!   around the endpoint within `search_range` cells and score
//!   `exp(-d^2 / (2 sigma^2))` with `d` in meters.
//! - [`LikelihoodMode::EndpointHit`]: score 1 if the endpoint cell itself is
//!   occupied.
//!
//! Each ray scores in [0, 1], so the scan total divided by the ray count is a
//! match quality in [0, 1].

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::common::{LaserScan, LikelihoodModel, Particle, SlamError, SlamResult};
use crate::mapping::{AdjustedRay, MovingLaserScan, OccupancyGrid};
use crate::utils::grid_utils::global_position_to_grid_cell;

/// How a single ray endpoint is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikelihoodMode {
    #[default]
    NearestOccupied,
    EndpointHit,
}

/// Sensor model parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorModelConfig {
    /// Standard deviation of the endpoint error [m]
    pub sigma_hit: f64,
    /// Log-odds above which a cell counts as occupied
    pub occupancy_threshold: i8,
    /// Use every n-th return
    pub ray_stride: usize,
    /// Returns at or below this range are ignored [m]
    pub min_range: f64,
    /// Returns at or beyond this range are no-returns and ignored [m]
    pub max_range: f64,
    /// Neighborhood searched around the endpoint [cells]
    pub search_range: i32,
    pub mode: LikelihoodMode,
}

impl Default for SensorModelConfig {
    fn default() -> Self {
        Self {
            sigma_hit: 0.075,
            occupancy_threshold: 0,
            ray_stride: 7,
            min_range: 0.1,
            max_range: 5.0,
            search_range: 2,
            mode: LikelihoodMode::NearestOccupied,
        }
    }
}

impl SensorModelConfig {
    pub fn validate(&self) -> SlamResult<()> {
        if !(self.sigma_hit > 0.0 && self.sigma_hit.is_finite()) {
            return Err(SlamError::InvalidParameter(format!(
                "sigma_hit must be positive, got {}",
                self.sigma_hit
            )));
        }
        if self.search_range < 0 {
            return Err(SlamError::InvalidParameter(format!(
                "search_range must be non-negative, got {}",
                self.search_range
            )));
        }
        if !(self.max_range > self.min_range && self.min_range >= 0.0) {
            return Err(SlamError::InvalidParameter(format!(
                "sensor range window ({}, {}) is empty",
                self.min_range, self.max_range
            )));
        }
        Ok(())
    }
}

/// Summed ray scores of one scan.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScanScore {
    /// Sum of per-ray scores
    pub total: f64,
    /// Rays that were scored
    pub rays: usize,
}

impl ScanScore {
    /// Mean ray score in [0, 1], zero for an empty scan.
    pub fn quality(&self) -> f64 {
        if self.rays == 0 {
            0.0
        } else {
            self.total / self.rays as f64
        }
    }
}

/// Neighbor cell offset with its distance in cells.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CellOffset {
    dx: i32,
    dy: i32,
    distance: f64,
}

/// Ray endpoint likelihood model.
#[derive(Debug, Clone)]
pub struct SensorModel {
    config: SensorModelConfig,
    /// Search neighborhood, nearest first
    offsets: Vec<CellOffset>,
}

impl SensorModel {
    pub fn new(config: SensorModelConfig) -> SlamResult<Self> {
        config.validate()?;
        let offsets = search_offsets(config.search_range);
        Ok(SensorModel { config, offsets })
    }

    pub fn config(&self) -> &SensorModelConfig {
        &self.config
    }

    /// Score every valid ray of `scan` as seen from `particle`.
    pub fn score_scan(&self, particle: &Particle, scan: &LaserScan, map: &OccupancyGrid) -> ScanScore {
        let moving_scan = MovingLaserScan::new(
            scan,
            &particle.parent_pose,
            &particle.pose,
            self.config.ray_stride,
            self.config.min_range,
        );

        moving_scan
            .iter()
            .filter(|ray| ray.range < self.config.max_range)
            .fold(ScanScore::default(), |acc, ray| ScanScore {
                total: acc.total + self.score_ray(ray, map),
                rays: acc.rays + 1,
            })
    }

    /// Score of a single ray in [0, 1].
    pub fn score_ray(&self, ray: &AdjustedRay, map: &OccupancyGrid) -> f64 {
        let end = global_position_to_grid_cell(ray.endpoint(), map);
        if !map.is_cell_in_grid(end.x, end.y) {
            return 0.0;
        }

        let threshold = self.config.occupancy_threshold;
        match self.config.mode {
            LikelihoodMode::EndpointHit => {
                if map.is_occupied(end.x, end.y, threshold) {
                    1.0
                } else {
                    0.0
                }
            }
            LikelihoodMode::NearestOccupied => self
                .nearest_occupied_distance(end.x, end.y, map)
                .map(|cells| {
                    let d = cells * map.meters_per_cell();
                    (-d * d / (2.0 * self.config.sigma_hit.powi(2))).exp()
                })
                .unwrap_or(0.0),
        }
    }

    /// Distance in cells to the nearest occupied cell around `(x, y)`.
    fn nearest_occupied_distance(&self, x: i32, y: i32, map: &OccupancyGrid) -> Option<f64> {
        let threshold = self.config.occupancy_threshold;
        self.offsets
            .iter()
            .find(|o| map.is_occupied(x + o.dx, y + o.dy, threshold))
            .map(|o| o.distance)
    }
}

impl LikelihoodModel for SensorModel {
    fn likelihood(&self, particle: &Particle, scan: &LaserScan, map: &OccupancyGrid) -> f64 {
        self.score_scan(particle, scan, map).total
    }

    fn valid_ray_count(&self, scan: &LaserScan) -> usize {
        let stride = self.config.ray_stride.max(1);
        scan.returns
            .iter()
            .step_by(stride)
            .filter(|ret| {
                ret.range.is_finite()
                    && ret.range > self.config.min_range
                    && ret.range < self.config.max_range
            })
            .count()
    }
}

/// Offsets of a square neighborhood sorted by Euclidean distance.
fn search_offsets(search_range: i32) -> Vec<CellOffset> {
    let r = search_range.max(0);
    let mut offsets: Vec<CellOffset> = iproduct!(-r..=r, -r..=r)
        .map(|(dx, dy)| CellOffset {
            dx,
            dy,
            distance: ((dx * dx + dy * dy) as f64).sqrt(),
        })
        .collect();
    offsets.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{LaserReturn, Pose2D};
    use approx::assert_abs_diff_eq;

    /// 4m x 2m at 5cm with a wall in column 60 (x in [3.0, 3.05)).
    fn wall_map() -> OccupancyGrid {
        let mut map = OccupancyGrid::new(80, 40, 0.05).unwrap();
        for y in 0..40 {
            map.set_log_odds(60, y, 100);
        }
        map
    }

    fn config() -> SensorModelConfig {
        SensorModelConfig { ray_stride: 1, ..Default::default() }
    }

    fn forward_scan(range: f64) -> LaserScan {
        LaserScan::new(0, vec![LaserReturn { range, bearing: 0.0, utime: 0 }])
    }

    fn particle_at(x: f64) -> Particle {
        Particle::new(Pose2D::new(x, 1.025, 0.0), 1.0)
    }

    #[test]
    fn test_offsets_sorted_nearest_first() {
        let offsets = search_offsets(2);
        assert_eq!(offsets.len(), 25);
        assert_eq!((offsets[0].dx, offsets[0].dy), (0, 0));
        assert!(offsets.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert_abs_diff_eq!(offsets[24].distance, 8f64.sqrt());
    }

    #[test]
    fn test_endpoint_on_wall_scores_one() {
        let model = SensorModel::new(config()).unwrap();
        let score = model.score_scan(&particle_at(1.025), &forward_scan(2.0), &wall_map());
        assert_eq!(score.rays, 1);
        assert_abs_diff_eq!(score.total, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(score.quality(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nearby_wall_scores_gaussian() {
        let model = SensorModel::new(config()).unwrap();
        // endpoint one cell short of the wall
        let score = model.score_scan(&particle_at(0.975), &forward_scan(2.0), &wall_map());
        let expected = (-(0.05f64).powi(2) / (2.0 * 0.075f64.powi(2))).exp();
        assert_abs_diff_eq!(score.total, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_wall_outside_search_range_scores_zero() {
        let model = SensorModel::new(config()).unwrap();
        let score = model.score_scan(&particle_at(0.525), &forward_scan(2.0), &wall_map());
        assert_eq!(score.rays, 1);
        assert_eq!(score.total, 0.0);
    }

    #[test]
    fn test_better_pose_scores_higher() {
        let model = SensorModel::new(config()).unwrap();
        let map = wall_map();
        let scan = forward_scan(2.0);
        let good = model.likelihood(&particle_at(1.025), &scan, &map);
        let close = model.likelihood(&particle_at(1.075), &scan, &map);
        let far = model.likelihood(&particle_at(1.5), &scan, &map);
        assert!(good > close);
        assert!(close > far);
    }

    #[test]
    fn test_endpoint_hit_mode() {
        let model = SensorModel::new(SensorModelConfig { mode: LikelihoodMode::EndpointHit, ..config() }).unwrap();
        let map = wall_map();
        assert_eq!(model.likelihood(&particle_at(1.025), &forward_scan(2.0), &map), 1.0);
        assert_eq!(model.likelihood(&particle_at(0.975), &forward_scan(2.0), &map), 0.0);
    }

    #[test]
    fn test_endpoint_outside_grid_scores_zero() {
        let model = SensorModel::new(config()).unwrap();
        let score = model.score_scan(&particle_at(1.025), &forward_scan(4.5), &wall_map());
        assert_eq!(score.rays, 1);
        assert_eq!(score.total, 0.0);
    }

    #[test]
    fn test_invalid_rays_not_counted() {
        let model = SensorModel::new(config()).unwrap();
        let scan = LaserScan::new(
            0,
            vec![
                LaserReturn { range: 0.05, bearing: 0.0, utime: 0 },
                LaserReturn { range: 8.0, bearing: 0.0, utime: 0 },
                LaserReturn { range: f64::INFINITY, bearing: 0.0, utime: 0 },
                LaserReturn { range: 2.0, bearing: 0.0, utime: 0 },
            ],
        );
        assert_eq!(model.valid_ray_count(&scan), 1);
        assert_eq!(model.score_scan(&particle_at(1.025), &scan, &wall_map()).rays, 1);
    }

    #[test]
    fn test_return_at_max_range_is_no_return() {
        let model = SensorModel::new(config()).unwrap();
        let scan = forward_scan(5.0);
        assert_eq!(model.valid_ray_count(&scan), 0);
        assert_eq!(model.score_scan(&particle_at(1.025), &scan, &wall_map()).rays, 0);

        let just_inside = forward_scan(4.99);
        assert_eq!(model.valid_ray_count(&just_inside), 1);
    }

    #[test]
    fn test_quality_of_empty_score() {
        assert_eq!(ScanScore::default().quality(), 0.0);
    }

    #[test]
    fn test_invalid_config() {
        assert!(SensorModel::new(SensorModelConfig { sigma_hit: 0.0, ..config() }).is_err());
        assert!(SensorModel::new(SensorModelConfig { search_range: -1, ..config() }).is_err());
    }
}
