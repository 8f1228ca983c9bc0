//! Uniform pose sampling over the free space of a map.
//!
//! Used for global initialization and for reinvigorating a collapsed particle
//! set. Cells believed free are preferred; on a map with no free cells yet the
//! sampler falls back to every cell that is not occupied.

use std::f64::consts::PI;

use rand::Rng;

use crate::common::{GridCell, Particle, Point2D, Pose2D, SlamError, SlamResult};
use crate::mapping::OccupancyGrid;

/// Draws poses uniformly from a fixed set of candidate cells.
#[derive(Debug, Clone)]
pub struct RandomPoseSampler {
    cells: Vec<GridCell>,
    origin: Point2D,
    meters_per_cell: f64,
}

impl RandomPoseSampler {
    /// Collect candidate cells from `map`.
    ///
    /// Fails with [`SlamError::NoFreeSpace`] if every cell is occupied.
    pub fn new(map: &OccupancyGrid, occupancy_threshold: i8) -> SlamResult<Self> {
        let mut cells = map.free_cells();
        if cells.is_empty() {
            cells = map.unoccupied_cells(occupancy_threshold);
        }
        if cells.is_empty() {
            return Err(SlamError::NoFreeSpace);
        }

        Ok(RandomPoseSampler {
            cells,
            origin: map.origin(),
            meters_per_cell: map.meters_per_cell(),
        })
    }

    /// Number of candidate cells.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Uniform pose inside a random candidate cell with a uniform heading.
    pub fn sample_pose<R: Rng + ?Sized>(&self, rng: &mut R, utime: i64) -> Pose2D {
        let cell = self.cells[rng.gen_range(0..self.cells.len())];
        let x = (cell.x as f64 + rng.gen::<f64>()) * self.meters_per_cell + self.origin.x;
        let y = (cell.y as f64 + rng.gen::<f64>()) * self.meters_per_cell + self.origin.y;
        let theta = rng.gen_range(-PI..PI);
        Pose2D::with_time(x, y, theta, utime)
    }

    /// Random particle with the given weight. Its parent is itself.
    pub fn sample_particle<R: Rng + ?Sized>(&self, rng: &mut R, weight: f64, utime: i64) -> Particle {
        Particle::new(self.sample_pose(rng, utime), weight)
    }
}
