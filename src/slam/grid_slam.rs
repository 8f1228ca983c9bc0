//! Occupancy grid SLAM
//!
//! Couples the particle filter with the log-odds mapper. Within one cycle the
//! filter scores particles against the grid as it stood at the start of the
//! cycle, and only then is the scan integrated at the new pose estimate.

use log::{debug, info};

use crate::common::{LaserScan, Particle, Pose2D, SlamResult};
use crate::localization::{CycleOutcome, ParticleFilter};
use crate::mapping::{Mapping, OccupancyGrid};
use crate::slam::config::{SlamConfig, SlamMode};
use crate::utils::angles::angle_diff;

/// Localization and mapping over a single occupancy grid.
pub struct OccupancyGridSlam {
    config: SlamConfig,
    filter: ParticleFilter,
    mapper: Mapping,
    map: OccupancyGrid,
    pose: Pose2D,
    last_map_pose: Option<Pose2D>,
    map_updates: usize,
    initialized: bool,
}

impl OccupancyGridSlam {
    /// Start from an unknown grid built from `config.grid`.
    pub fn new(config: SlamConfig) -> SlamResult<Self> {
        config.validate()?;
        let map = config.grid.build()?;
        Self::with_map(config, map)
    }

    /// Start from an existing map, e.g. for localization only.
    pub fn with_map(config: SlamConfig, map: OccupancyGrid) -> SlamResult<Self> {
        config.validate()?;
        Ok(OccupancyGridSlam {
            filter: ParticleFilter::new(config.particle_filter)?,
            mapper: Mapping::new(config.mapping)?,
            map,
            pose: config.initial_pose,
            last_map_pose: None,
            map_updates: 0,
            initialized: false,
            config,
        })
    }

    /// Run one cycle with the latest odometry and, if available, a scan.
    ///
    /// Returns the best pose estimate after the cycle.
    pub fn process(&mut self, odometry: &Pose2D, scan: Option<&LaserScan>) -> SlamResult<Pose2D> {
        if !self.initialized {
            return self.initialize(odometry, scan);
        }

        let mode = self.config.mode;
        let empty = LaserScan::default();
        self.pose = match mode {
            SlamMode::MappingOnly => *odometry,
            SlamMode::ActionOnly => self.filter.update_filter_action_only(odometry),
            SlamMode::LocalizationOnly | SlamMode::FullSlam => {
                self.filter
                    .update_filter(odometry, scan.unwrap_or(&empty), &self.map)
            }
        };

        if mode.writes_map() {
            if let Some(scan) = scan {
                let stationary = mode.localizes()
                    && self.filter.state().last_outcome == Some(CycleOutcome::Stationary);
                if !stationary && self.should_update_map(&self.pose) {
                    self.update_map(scan);
                } else {
                    self.mapper.reset_previous(&self.pose);
                }
            }
        }

        Ok(self.pose)
    }

    fn initialize(&mut self, odometry: &Pose2D, scan: Option<&LaserScan>) -> SlamResult<Pose2D> {
        let mode = self.config.mode;
        match mode {
            SlamMode::MappingOnly => {
                self.pose = *odometry;
            }
            SlamMode::ActionOnly => {
                self.filter.initialize_filter_at_pose(odometry);
                self.pose = *odometry;
            }
            SlamMode::LocalizationOnly if self.config.random_initial_pose => {
                self.filter.initialize_filter_randomly(&self.map)?;
                self.pose = self.filter.pose_estimate().stamped(odometry.utime);
            }
            SlamMode::LocalizationOnly | SlamMode::FullSlam => {
                let initial = self.config.initial_pose;
                let start = Pose2D::with_time(initial.x, initial.y, initial.theta, odometry.utime);
                self.filter.initialize_filter_at_pose(&start);
                self.pose = start;
            }
        }
        self.filter.reset_odometry(odometry);
        self.initialized = true;
        info!("slam started in {:?} mode", mode);

        if mode.writes_map() && self.config.map_first_scan {
            if let Some(scan) = scan {
                self.update_map(scan);
            }
        }
        Ok(self.pose)
    }

    fn should_update_map(&self, pose: &Pose2D) -> bool {
        match self.last_map_pose {
            None => true,
            Some(last) => {
                let distance = last.distance(pose);
                let angle = angle_diff(pose.theta, last.theta).abs();
                (distance > 0.0 || angle > 0.0)
                    && (distance >= self.config.map_update_distance
                        || angle >= self.config.map_update_angle)
            }
        }
    }

    fn update_map(&mut self, scan: &LaserScan) {
        let stats = self.mapper.update_map(scan, &self.pose, &mut self.map);
        self.last_map_pose = Some(self.pose);
        self.map_updates += 1;
        debug!("map update {}: {:?}", self.map_updates, stats);
    }

    /// Forget the map and start building it again from the current pose.
    pub fn reset_map(&mut self) {
        self.map.reset();
        self.mapper.reset();
        self.last_map_pose = None;
        info!("map reset after {} updates", self.map_updates);
        self.map_updates = 0;
    }

    pub fn pose(&self) -> Pose2D {
        self.pose
    }

    pub fn particles(&self) -> &[Particle] {
        self.filter.particles()
    }

    pub fn filter(&self) -> &ParticleFilter {
        &self.filter
    }

    pub fn map(&self) -> &OccupancyGrid {
        &self.map
    }

    pub fn into_map(self) -> OccupancyGrid {
        self.map
    }

    /// Number of scans integrated into the map so far.
    pub fn map_updates(&self) -> usize {
        self.map_updates
    }

    pub fn mode(&self) -> SlamMode {
        self.config.mode
    }

    pub fn config(&self) -> &SlamConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{LaserReturn, Point2D};
    use crate::localization::{ActionModelConfig, ParticleFilterConfig, SensorModelConfig};
    use crate::mapping::MappingConfig;
    use crate::slam::config::GridConfig;
    use crate::utils::angles::interpolate_pose;
    use crate::utils::ray_trace::cast_ray;
    use std::f64::consts::PI;

    /// 3m x 3m room, walls on the border cells, origin at (0, 0).
    fn room() -> OccupancyGrid {
        let mut map = OccupancyGrid::new(60, 60, 0.05).unwrap();
        for i in 0..60 {
            map.set_log_odds(i, 0, 100);
            map.set_log_odds(i, 59, 100);
            map.set_log_odds(0, i, 100);
            map.set_log_odds(59, i, 100);
        }
        map
    }

    /// Scan swept while moving from `from` to `to`.
    fn scan_between(from: &Pose2D, to: &Pose2D, world: &OccupancyGrid) -> LaserScan {
        let beams = 72;
        let returns = (0..beams)
            .map(|i| {
                let pose = interpolate_pose(from, to, i as f64 / (beams - 1) as f64);
                let bearing = -PI + 2.0 * PI * i as f64 / beams as f64;
                let range = cast_ray(world, pose.position(), pose.theta + bearing, 4.9, 10).unwrap_or(4.9);
                LaserReturn { range, bearing, utime: pose.utime }
            })
            .collect();
        LaserScan::new(from.utime, returns)
    }

    fn scan_at(pose: &Pose2D, world: &OccupancyGrid) -> LaserScan {
        scan_between(pose, pose, world)
    }

    fn config(mode: SlamMode) -> SlamConfig {
        SlamConfig {
            mode,
            grid: GridConfig { width: 60, height: 60, meters_per_cell: 0.05, origin: Point2D::origin() },
            particle_filter: ParticleFilterConfig {
                num_particles: 100,
                seed: Some(3),
                action_model: ActionModelConfig { seed: Some(4), ..Default::default() },
                sensor_model: SensorModelConfig { ray_stride: 1, ..Default::default() },
                ..Default::default()
            },
            mapping: MappingConfig { max_laser_distance: 4.9, ..Default::default() },
            initial_pose: Pose2D::new(1.0, 1.5, 0.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_mapping_only_builds_walls_and_free_space() {
        let world = room();
        let mut slam = OccupancyGridSlam::new(config(SlamMode::MappingOnly)).unwrap();

        let mut previous = Pose2D::new(1.025, 1.525, 0.0);
        for k in 0..10 {
            let odometry = Pose2D::with_time(1.025 + 0.1 * k as f64, 1.525, 0.0, k * 1000);
            let scan = scan_between(&previous, &odometry, &world);
            let pose = slam.process(&odometry, Some(&scan)).unwrap();
            assert_eq!(pose, odometry);
            previous = odometry;
        }

        let map = slam.map();
        assert_eq!(slam.map_updates(), 10);
        assert!(map.is_occupied(59, 30, 0));
        assert!(map.is_occupied(0, 30, 0));
        assert!((0..60).filter(|&x| map.is_occupied(x, 59, 0)).count() >= 10);
        assert!((0..60).filter(|&x| map.is_occupied(x, 0, 0)).count() >= 10);
        assert!(map.is_free(30, 30));
        assert!(map.is_free(10, 30));
        assert!(!map.is_occupied(30, 30, 0));
    }

    #[test]
    fn test_localization_only_never_writes_map() {
        let world = room();
        let mut slam = OccupancyGridSlam::with_map(config(SlamMode::LocalizationOnly), world.clone()).unwrap();

        for k in 0..5 {
            let odometry = Pose2D::with_time(1.0 + 0.1 * k as f64, 1.5, 0.0, k * 1000);
            slam.process(&odometry, Some(&scan_at(&odometry, &world))).unwrap();
        }

        assert_eq!(slam.map(), &world);
        assert_eq!(slam.map_updates(), 0);
        assert_eq!(slam.particles().len(), 100);
    }

    #[test]
    fn test_stationary_robot_leaves_map_unchanged() {
        let world = room();
        let mut slam = OccupancyGridSlam::new(config(SlamMode::FullSlam)).unwrap();
        let odometry = Pose2D::new(1.0, 1.5, 0.0);
        let scan = scan_at(&odometry, &world);

        slam.process(&odometry, Some(&scan)).unwrap();
        let snapshot = slam.map().clone();
        let pose = slam.pose();

        for k in 1..5 {
            let p = slam.process(&odometry.stamped(k * 1000), Some(&scan)).unwrap();
            assert_eq!((p.x, p.y, p.theta), (pose.x, pose.y, pose.theta));
            assert_eq!(p.utime, k * 1000);
        }
        assert_eq!(slam.map(), &snapshot);
        assert_eq!(slam.map_updates(), 1);
    }

    #[test]
    fn test_map_updates_are_gated_by_motion() {
        let world = room();
        let mut cfg = config(SlamMode::MappingOnly);
        cfg.map_update_distance = 0.24;
        cfg.map_update_angle = 1.0;
        let mut slam = OccupancyGridSlam::new(cfg).unwrap();

        for k in 0..=10 {
            let odometry = Pose2D::with_time(1.0 + 0.05 * k as f64, 1.5, 0.0, k);
            slam.process(&odometry, Some(&scan_at(&odometry, &world))).unwrap();
        }
        // first scan, then at 0.25 m and 0.5 m
        assert_eq!(slam.map_updates(), 3);
    }

    #[test]
    fn test_first_scan_can_be_skipped() {
        let world = room();
        let mut cfg = config(SlamMode::MappingOnly);
        cfg.map_first_scan = false;
        let mut slam = OccupancyGridSlam::new(cfg).unwrap();
        let odometry = Pose2D::new(1.0, 1.5, 0.0);
        slam.process(&odometry, Some(&scan_at(&odometry, &world))).unwrap();
        assert_eq!(slam.map_updates(), 0);
        assert_eq!(slam.map().occupied_cell_count(0), 0);
    }

    #[test]
    fn test_action_only_follows_odometry() {
        let mut slam = OccupancyGridSlam::new(config(SlamMode::ActionOnly)).unwrap();
        slam.process(&Pose2D::origin(), None).unwrap();
        let odometry = Pose2D::with_time(0.3, 0.0, 0.1, 10);
        assert_eq!(slam.process(&odometry, None).unwrap(), odometry);
        assert_eq!(slam.map_updates(), 0);
        assert_eq!(slam.filter().state().last_outcome, Some(CycleOutcome::ActionOnly));
    }

    #[test]
    fn test_missing_scan_propagates_motion() {
        let world = room();
        let mut slam = OccupancyGridSlam::with_map(config(SlamMode::LocalizationOnly), world).unwrap();
        slam.process(&Pose2D::new(1.0, 1.5, 0.0), None).unwrap();
        let pose = slam.process(&Pose2D::with_time(1.2, 1.5, 0.0, 5), None).unwrap();

        assert_eq!(slam.filter().state().last_outcome, Some(CycleOutcome::NoSensorEvidence));
        assert!((pose.x - 1.2).abs() < 1e-9);
    }

    #[test]
    fn test_reset_map() {
        let world = room();
        let mut slam = OccupancyGridSlam::new(config(SlamMode::MappingOnly)).unwrap();
        let odometry = Pose2D::new(1.0, 1.5, 0.0);
        slam.process(&odometry, Some(&scan_at(&odometry, &world))).unwrap();
        assert!(slam.map().occupied_cell_count(0) > 0);

        slam.reset_map();
        assert_eq!(slam.map_updates(), 0);
        assert_eq!(slam.into_map().occupied_cell_count(0), 0);
    }

    #[test]
    fn test_initial_pose_heading_is_wrapped() {
        let mut cfg = config(SlamMode::LocalizationOnly);
        cfg.initial_pose = Pose2D { x: 1.0, y: 1.5, theta: 4.0, utime: 0 };
        let mut slam = OccupancyGridSlam::with_map(cfg, room()).unwrap();
        let pose = slam.process(&Pose2D::with_time(0.0, 0.0, 0.0, 7), None).unwrap();

        assert!((pose.theta - (4.0 - 2.0 * PI)).abs() < 1e-12);
        assert!(slam.particles().iter().all(|p| p.pose.theta == pose.theta));
        assert_eq!(pose.utime, 7);
    }

    #[test]
    fn test_random_initialization_needs_free_space() {
        let mut full = OccupancyGrid::new(4, 4, 0.5).unwrap();
        for x in 0..4 {
            for y in 0..4 {
                full.set_log_odds(x, y, 100);
            }
        }
        let mut cfg = config(SlamMode::LocalizationOnly);
        cfg.random_initial_pose = true;
        let mut slam = OccupancyGridSlam::with_map(cfg, full).unwrap();
        assert!(slam.process(&Pose2D::origin(), None).is_err());
    }
}
