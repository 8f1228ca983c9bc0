//! Conversions between world coordinates and occupancy grid cells.
//!
//! "Grid position" is a continuous coordinate measured in cells from the grid
//! origin; "grid cell" is the integer cell containing it.

use crate::common::{GridCell, Point2D};
use crate::mapping::OccupancyGrid;

/// World point to continuous grid coordinates.
pub fn global_position_to_grid_position(point: Point2D, grid: &OccupancyGrid) -> Point2D {
    let origin = grid.origin();
    let cpm = grid.cells_per_meter();
    Point2D::new((point.x - origin.x) * cpm, (point.y - origin.y) * cpm)
}

/// World point to the integer cell containing it.
pub fn global_position_to_grid_cell(point: Point2D, grid: &OccupancyGrid) -> GridCell {
    grid_position_to_cell(global_position_to_grid_position(point, grid))
}

/// Continuous grid coordinates back to world coordinates.
pub fn grid_position_to_global_position(position: Point2D, grid: &OccupancyGrid) -> Point2D {
    let origin = grid.origin();
    let mpc = grid.meters_per_cell();
    Point2D::new(position.x * mpc + origin.x, position.y * mpc + origin.y)
}

/// World coordinates of a cell's center.
pub fn grid_cell_center(cell: GridCell, grid: &OccupancyGrid) -> Point2D {
    grid_position_to_global_position(
        Point2D::new(cell.x as f64 + 0.5, cell.y as f64 + 0.5),
        grid,
    )
}

/// Floor continuous grid coordinates to a cell.
pub fn grid_position_to_cell(position: Point2D) -> GridCell {
    GridCell::new(position.x.floor() as i32, position.y.floor() as i32)
}
