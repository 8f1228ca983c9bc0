//! Ray traversal over grid cells.
//!
//! [`RayCells`] walks the cells of a discrete line with Bresenham's
//! algorithm using integer arithmetic only. [`divide_and_step`] is a coarser
//! alternative that samples the ray at sub-cell steps. [`cast_ray`] marches a
//! ray through an occupancy grid and reports the range to the first occupied
//! cell, which is how expected scans are synthesized.

use crate::common::{GridCell, Point2D};
use crate::mapping::OccupancyGrid;
use crate::utils::grid_utils::{global_position_to_grid_position, grid_position_to_cell};

/// Iterator over the cells of a Bresenham line, both endpoints included.
#[derive(Debug, Clone)]
pub struct RayCells {
    x: i32,
    y: i32,
    x1: i32,
    y1: i32,
    dx: i32,
    dy: i32,
    sx: i32,
    sy: i32,
    err: i32,
    finished: bool,
}

impl RayCells {
    pub fn new(start: GridCell, end: GridCell) -> Self {
        let dx = (end.x - start.x).abs();
        let dy = (end.y - start.y).abs();
        let sx = if start.x < end.x { 1 } else { -1 };
        let sy = if start.y < end.y { 1 } else { -1 };

        RayCells {
            x: start.x,
            y: start.y,
            x1: end.x,
            y1: end.y,
            dx,
            dy,
            sx,
            sy,
            err: dx - dy,
            finished: false,
        }
    }
}

impl Iterator for RayCells {
    type Item = GridCell;

    fn next(&mut self) -> Option<GridCell> {
        if self.finished {
            return None;
        }

        let cell = GridCell::new(self.x, self.y);

        if self.x == self.x1 && self.y == self.y1 {
            self.finished = true;
            return Some(cell);
        }

        let e2 = 2 * self.err;
        if e2 >= -self.dy {
            self.err -= self.dy;
            self.x += self.sx;
        }
        if e2 <= self.dx {
            self.err += self.dx;
            self.y += self.sy;
        }

        Some(cell)
    }
}

/// All cells on the Bresenham line from `start` to `end`, endpoints included.
pub fn bresenham(start: GridCell, end: GridCell) -> Vec<GridCell> {
    RayCells::new(start, end).collect()
}

/// Cells touched by sampling a ray every `step` cells.
///
/// `origin` is in continuous grid coordinates and `range` in cells. Consecutive
/// duplicates are dropped. Unlike [`bresenham`], diagonal moves may skip a
/// corner-touching cell.
pub fn divide_and_step(origin: Point2D, theta: f64, range: f64, step: f64) -> Vec<GridCell> {
    if step <= 0.0 || range < 0.0 {
        return Vec::new();
    }

    let (sin_t, cos_t) = theta.sin_cos();
    let num_steps = (range / step).floor() as usize;
    let mut cells: Vec<GridCell> = Vec::with_capacity(num_steps + 1);

    for i in 0..=num_steps {
        let d = i as f64 * step;
        let cell = grid_position_to_cell(Point2D::new(origin.x + d * cos_t, origin.y + d * sin_t));
        if cells.last() != Some(&cell) {
            cells.push(cell);
        }
    }
    cells
}

/// Range to the first cell along a ray whose log-odds exceed `occupancy_threshold`.
///
/// The ray starts at the world point `origin` with world heading `theta`.
/// Returns the distance from `origin` to the hit cell's center projected onto
/// the ray, or `None` if nothing is hit within `max_range` or the ray leaves
/// the grid first.
pub fn cast_ray(
    grid: &OccupancyGrid,
    origin: Point2D,
    theta: f64,
    max_range: f64,
    occupancy_threshold: i8,
) -> Option<f64> {
    let start = global_position_to_grid_position(origin, grid);
    let start_cell = grid_position_to_cell(start);
    let range_cells = max_range * grid.cells_per_meter();
    let end = Point2D::new(
        start.x + range_cells * theta.cos(),
        start.y + range_cells * theta.sin(),
    );
    let end_cell = grid_position_to_cell(end);

    for cell in RayCells::new(start_cell, end_cell) {
        let value = grid.log_odds(cell.x, cell.y)?;
        if value > occupancy_threshold {
            let cx = cell.x as f64 + 0.5;
            let cy = cell.y as f64 + 0.5;
            let along = (cx - start.x) * theta.cos() + (cy - start.y) * theta.sin();
            let range = along.max(0.0) * grid.meters_per_cell();
            return if range <= max_range { Some(range) } else { None };
        }
    }
    None
}
