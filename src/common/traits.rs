//! Common traits defining the seams between estimator components

use crate::common::types::{LaserScan, Particle};
use crate::mapping::OccupancyGrid;

/// Scores a pose hypothesis against a scan and a map.
///
/// Implementations must be pure with respect to their inputs so the particle
/// filter can evaluate all particles in parallel.
pub trait LikelihoodModel: Sync {
    /// Unnormalized, non-negative likelihood of `particle` given `scan` and `map`.
    fn likelihood(&self, particle: &Particle, scan: &LaserScan, map: &OccupancyGrid) -> f64;

    /// Number of rays in `scan` that can contribute evidence.
    fn valid_ray_count(&self, scan: &LaserScan) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{LaserReturn, Pose2D};

    struct ConstantModel(f64);

    impl LikelihoodModel for ConstantModel {
        fn likelihood(&self, _particle: &Particle, _scan: &LaserScan, _map: &OccupancyGrid) -> f64 {
            self.0
        }

        fn valid_ray_count(&self, scan: &LaserScan) -> usize {
            scan.len()
        }
    }

    #[test]
    fn test_likelihood_model_trait_object() {
        let model: Box<dyn LikelihoodModel> = Box::new(ConstantModel(2.0));
        let map = OccupancyGrid::new(10, 10, 0.1).unwrap();
        let scan = LaserScan::new(0, vec![LaserReturn { range: 1.0, bearing: 0.0, utime: 0 }]);
        let particle = Particle::new(Pose2D::origin(), 1.0);
        assert_eq!(model.likelihood(&particle, &scan, &map), 2.0);
        assert_eq!(model.valid_ray_count(&scan), 1);
    }
}
