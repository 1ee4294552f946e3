//! Statistics grid geometry
//!
//! The accelerator averages the image over a rectangular grid of cells.
//! Cell sizes are powers of two, so the grid covering a given output size is
//! chosen to minimise the uncovered (or overshooting) margin.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

const MIN_GRID_WIDTH: u32 = 16;
const MAX_GRID_WIDTH: u32 = 80;
const MIN_GRID_HEIGHT: u32 = 16;
const MAX_GRID_HEIGHT: u32 = 60;
const MIN_CELL_SIZE_LOG2: u32 = 3;
const MAX_CELL_SIZE_LOG2: u32 = 6;

/// Image dimensions in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Layout of the per-cell statistics in the raw buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Cells per row
    pub width: u32,
    /// Cells per column
    pub height: u32,
    pub block_width_log2: u32,
    pub block_height_log2: u32,
    /// Cells between the starts of two consecutive rows in the raw buffer
    pub stride: u32,
}

impl GridConfig {
    /// Grid with explicit geometry, as supplied by a pipeline that computed it itself
    pub fn new(width: u32, height: u32, stride: u32) -> Result<Self, ConfigError> {
        let grid = Self {
            width,
            height,
            block_width_log2: MIN_CELL_SIZE_LOG2,
            block_height_log2: MIN_CELL_SIZE_LOG2,
            stride,
        };
        grid.validate()?;
        Ok(grid)
    }

    /// Pick the grid that best covers `output` with power-of-two cells.
    ///
    /// The hardware pads each row to a multiple of four cells, which sets the
    /// stride.
    pub fn from_output_size(output: Size) -> Result<Self, ConfigError> {
        if output.is_empty() {
            return Err(ConfigError::InvalidGeometry(format!(
                "output size {}x{} has a zero dimension",
                output.width, output.height
            )));
        }

        let (width, block_width_log2) = best_fit(output.width, MIN_GRID_WIDTH, MAX_GRID_WIDTH);
        let (height, block_height_log2) =
            best_fit(output.height, MIN_GRID_HEIGHT, MAX_GRID_HEIGHT);

        let grid = Self {
            width,
            height,
            block_width_log2,
            block_height_log2,
            stride: width.next_multiple_of(4),
        };

        log::debug!(
            "Grid for {}x{}: {}x{} cells of {}x{} pixels, stride {}",
            output.width,
            output.height,
            grid.width,
            grid.height,
            1u32 << grid.block_width_log2,
            1u32 << grid.block_height_log2,
            grid.stride
        );

        Ok(grid)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidGeometry(format!(
                "grid {}x{} has a zero dimension",
                self.width, self.height
            )));
        }
        if self.stride < self.width {
            return Err(ConfigError::InvalidGeometry(format!(
                "stride {} is smaller than grid width {}",
                self.stride, self.width
            )));
        }
        Ok(())
    }

    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Number of cells the raw buffer must hold to back this grid
    pub fn required_cells(&self) -> usize {
        (self.height as usize - 1) * self.stride as usize + self.width as usize
    }

    /// Raw buffer index of every cell, row by row
    pub fn cell_positions(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.height as usize).flat_map(move |y| {
            (0..self.width as usize).map(move |x| y * self.stride as usize + x)
        })
    }
}

/// Returns (cells, log2 cell size) minimising |cells << log2 - length|.
fn best_fit(length: u32, min_cells: u32, max_cells: u32) -> (u32, u32) {
    let mut best = (min_cells, MIN_CELL_SIZE_LOG2);
    let mut min_error = u32::MAX;

    for shift in MIN_CELL_SIZE_LOG2..=MAX_CELL_SIZE_LOG2 {
        let cells = (length >> shift).clamp(min_cells, max_cells);
        let error = (cells << shift).abs_diff(length);
        if error >= min_error {
            continue;
        }
        min_error = error;
        best = (cells, shift);
    }

    best
}
