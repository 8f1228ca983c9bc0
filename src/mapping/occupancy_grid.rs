//! Log-odds occupancy grid.
//!
//! Each cell stores an `i8` log-odds value: positive means likely occupied,
//! negative likely free, zero unknown. Updates saturate at the `i8` bounds
//! instead of wrapping, so a cell hit a thousand times stays at 127.

use itertools::iproduct;
use nalgebra::DMatrix;

use crate::common::{GridCell, Point2D, SlamError, SlamResult};

/// Fixed-size 2D occupancy grid.
///
/// Cell `(0, 0)` has its lower-left corner at `origin` in world coordinates;
/// cell `(x, y)` covers `origin + [x, x+1) * meters_per_cell` along each axis.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    /// Log-odds values indexed `(x, y)`
    data: DMatrix<i8>,
    width: usize,
    height: usize,
    meters_per_cell: f64,
    origin: Point2D,
}

impl OccupancyGrid {
    /// Create an unknown grid whose cell (0, 0) starts at the world origin.
    pub fn new(width: usize, height: usize, meters_per_cell: f64) -> SlamResult<Self> {
        Self::with_origin(width, height, meters_per_cell, Point2D::origin())
    }

    /// Create an unknown grid anchored at `origin`.
    pub fn with_origin(
        width: usize,
        height: usize,
        meters_per_cell: f64,
        origin: Point2D,
    ) -> SlamResult<Self> {
        if width == 0 || height == 0 {
            return Err(SlamError::InvalidParameter(format!(
                "grid dimensions must be positive, got {}x{}",
                width, height
            )));
        }
        if !(meters_per_cell > 0.0 && meters_per_cell.is_finite()) {
            return Err(SlamError::InvalidParameter(format!(
                "meters_per_cell must be positive, got {}",
                meters_per_cell
            )));
        }
        if i32::try_from(width).is_err() || i32::try_from(height).is_err() {
            return Err(SlamError::InvalidParameter(
                "grid dimensions exceed i32 cell indexing".to_string(),
            ));
        }

        Ok(OccupancyGrid {
            data: DMatrix::from_element(width, height, 0),
            width,
            height,
            meters_per_cell,
            origin,
        })
    }

    /// Create a grid of the given metric size centered on the world origin.
    pub fn centered(width_m: f64, height_m: f64, meters_per_cell: f64) -> SlamResult<Self> {
        if !(width_m > 0.0 && height_m > 0.0) {
            return Err(SlamError::InvalidParameter(format!(
                "grid size must be positive, got {}x{} m",
                width_m, height_m
            )));
        }
        if !(meters_per_cell > 0.0 && meters_per_cell.is_finite()) {
            return Err(SlamError::InvalidParameter(format!(
                "meters_per_cell must be positive, got {}",
                meters_per_cell
            )));
        }
        let width = (width_m / meters_per_cell).round() as usize;
        let height = (height_m / meters_per_cell).round() as usize;
        Self::with_origin(
            width,
            height,
            meters_per_cell,
            Point2D::new(-width_m / 2.0, -height_m / 2.0),
        )
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn meters_per_cell(&self) -> f64 {
        self.meters_per_cell
    }

    pub fn cells_per_meter(&self) -> f64 {
        1.0 / self.meters_per_cell
    }

    /// World coordinates of the lower-left corner of cell (0, 0).
    pub fn origin(&self) -> Point2D {
        self.origin
    }

    /// Raw cell storage, indexed `(x, y)`.
    pub fn cells(&self) -> &DMatrix<i8> {
        &self.data
    }

    pub fn is_cell_in_grid(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Log-odds of a cell, `None` outside the grid.
    pub fn log_odds(&self, x: i32, y: i32) -> Option<i8> {
        if self.is_cell_in_grid(x, y) {
            Some(self.data[(x as usize, y as usize)])
        } else {
            None
        }
    }

    /// Log-odds of a cell, `None` outside the grid.
    pub fn cell_log_odds(&self, cell: GridCell) -> Option<i8> {
        self.log_odds(cell.x, cell.y)
    }

    /// Overwrite a cell. Returns false if the cell is outside the grid.
    pub fn set_log_odds(&mut self, x: i32, y: i32, value: i8) -> bool {
        if !self.is_cell_in_grid(x, y) {
            return false;
        }
        self.data[(x as usize, y as usize)] = value;
        true
    }

    /// Saturating increment. Returns false if the cell is outside the grid.
    pub fn increase_log_odds(&mut self, x: i32, y: i32, delta: i8) -> bool {
        if !self.is_cell_in_grid(x, y) {
            return false;
        }
        let cell = &mut self.data[(x as usize, y as usize)];
        *cell = cell.saturating_add(delta);
        true
    }

    /// Saturating decrement. Returns false if the cell is outside the grid.
    pub fn decrease_log_odds(&mut self, x: i32, y: i32, delta: i8) -> bool {
        if !self.is_cell_in_grid(x, y) {
            return false;
        }
        let cell = &mut self.data[(x as usize, y as usize)];
        *cell = cell.saturating_sub(delta);
        true
    }

    /// True if the cell is in the grid and its log-odds exceed `threshold`.
    pub fn is_occupied(&self, x: i32, y: i32, threshold: i8) -> bool {
        matches!(self.log_odds(x, y), Some(v) if v > threshold)
    }

    /// True if the cell is in the grid and believed free (negative log-odds).
    pub fn is_free(&self, x: i32, y: i32) -> bool {
        matches!(self.log_odds(x, y), Some(v) if v < 0)
    }

    /// Cells with negative log-odds.
    pub fn free_cells(&self) -> Vec<GridCell> {
        self.cells_where(|v| v < 0)
    }

    /// Cells with log-odds not above `threshold`.
    pub fn unoccupied_cells(&self, threshold: i8) -> Vec<GridCell> {
        self.cells_where(|v| v <= threshold)
    }

    /// Number of cells whose log-odds exceed `threshold`.
    pub fn occupied_cell_count(&self, threshold: i8) -> usize {
        self.data.iter().filter(|&&v| v > threshold).count()
    }

    fn cells_where<F: Fn(i8) -> bool>(&self, predicate: F) -> Vec<GridCell> {
        iproduct!(0..self.height, 0..self.width)
            .filter(|&(y, x)| predicate(self.data[(x, y)]))
            .map(|(y, x)| GridCell::new(x as i32, y as i32))
            .collect()
    }

    /// True if the world point falls inside the grid.
    pub fn contains_point(&self, point: Point2D) -> bool {
        let x = ((point.x - self.origin.x) / self.meters_per_cell).floor();
        let y = ((point.y - self.origin.y) / self.meters_per_cell).floor();
        x >= 0.0 && y >= 0.0 && x < self.width as f64 && y < self.height as f64
    }

    /// Copy of the cells in row-major order (row `y`, then column `x`).
    pub fn cells_row_major(&self) -> Vec<i8> {
        iproduct!(0..self.height, 0..self.width)
            .map(|(y, x)| self.data[(x, y)])
            .collect()
    }

    /// Forget everything: every cell back to unknown.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }
}
