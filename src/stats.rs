//! Accelerator statistics and parameter layouts
//!
//! Raw statistics arrive as hardware-formatted byte buffers. Each buffer is
//! decoded once into a typed, bounds-checked view before any controller reads
//! it; nothing downstream touches the raw layout.

use crate::errors::StatsError;
use crate::grid::GridConfig;

/// Capacity of the AF y-table, in items
pub const AF_Y_TABLE_MAX_ITEMS: usize = 8192;
/// Bytes per AF y-table item: two little-endian `u16`
pub const AF_Y_TABLE_ITEM_SIZE: usize = 4;
/// Bytes per AWB set item: Gr, R, B, Gb, saturation ratio and three pad bytes
pub const AWB_SET_ITEM_SIZE: usize = 8;

/// One AF filter response
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AfCell {
    /// Low-pass filtered luma average
    pub low_pass: u16,
    /// High-pass filtered luma average, the contrast measure
    pub high_pass: u16,
}

/// Decoded AF statistics, truncated at the first cell without a high-pass response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AfStatistics {
    cells: Vec<AfCell>,
}

impl AfStatistics {
    /// Decode a raw y-table.
    ///
    /// The accelerator leaves unused entries zeroed, so decoding stops at the
    /// first zero high-pass value or after [`AF_Y_TABLE_MAX_ITEMS`] entries.
    pub fn decode(raw: &[u8]) -> Result<Self, StatsError> {
        if raw.len() % AF_Y_TABLE_ITEM_SIZE != 0 {
            return Err(StatsError::MisalignedBuffer(raw.len()));
        }

        let cells = raw
            .chunks_exact(AF_Y_TABLE_ITEM_SIZE)
            .take(AF_Y_TABLE_MAX_ITEMS)
            .map(|item| AfCell {
                low_pass: u16::from_le_bytes([item[0], item[1]]),
                high_pass: u16::from_le_bytes([item[2], item[3]]),
            })
            .take_while(|cell| cell.high_pass != 0)
            .collect();

        Ok(Self { cells })
    }

    pub fn from_cells(cells: Vec<AfCell>) -> Self {
        let cells = cells
            .into_iter()
            .take(AF_Y_TABLE_MAX_ITEMS)
            .take_while(|cell| cell.high_pass != 0)
            .collect();
        Self { cells }
    }

    pub fn cells(&self) -> &[AfCell] {
        &self.cells
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Per-cell colour averages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AwbCell {
    pub gr: u8,
    pub r: u8,
    pub b: u8,
    pub gb: u8,
    pub sat_ratio: u8,
}

impl AwbCell {
    pub fn uniform(value: u8) -> Self {
        Self {
            gr: value,
            r: value,
            b: value,
            gb: value,
            sat_ratio: 0,
        }
    }

    /// Mean of the two green samples, rounded down
    pub fn green(&self) -> u8 {
        ((u16::from(self.gr) + u16::from(self.gb)) / 2) as u8
    }
}

/// Decoded AWB statistics covering exactly the cells of one grid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwbStatistics {
    grid: GridConfig,
    cells: Vec<AwbCell>,
}

impl AwbStatistics {
    /// Decode the cells of `grid` out of a raw AWB buffer laid out with the grid stride.
    pub fn decode(raw: &[u8], grid: &GridConfig) -> Result<Self, StatsError> {
        let needed = grid.required_cells() * AWB_SET_ITEM_SIZE;
        if raw.len() < needed {
            return Err(StatsError::BufferTooShort {
                needed,
                actual: raw.len(),
            });
        }

        let cells = grid
            .cell_positions()
            .map(|position| {
                let item = &raw[position * AWB_SET_ITEM_SIZE..][..AWB_SET_ITEM_SIZE];
                AwbCell {
                    gr: item[0],
                    r: item[1],
                    b: item[2],
                    gb: item[3],
                    sat_ratio: item[4],
                }
            })
            .collect();

        Ok(Self { grid: *grid, cells })
    }

    /// Build statistics from cells listed row by row, `grid.width` per row
    pub fn from_cells(grid: &GridConfig, cells: Vec<AwbCell>) -> Result<Self, StatsError> {
        if cells.len() != grid.cell_count() {
            return Err(StatsError::BufferTooShort {
                needed: grid.cell_count() * AWB_SET_ITEM_SIZE,
                actual: cells.len() * AWB_SET_ITEM_SIZE,
            });
        }
        Ok(Self { grid: *grid, cells })
    }

    pub fn grid(&self) -> &GridConfig {
        &self.grid
    }

    pub fn cells(&self) -> &[AwbCell] {
        &self.cells
    }
}

/// Statistics for one frame, as handed to the controllers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameStatistics {
    pub af: AfStatistics,
    pub awb: AwbStatistics,
}

impl FrameStatistics {
    pub fn decode(af_raw: &[u8], awb_raw: &[u8], grid: &GridConfig) -> Result<Self, StatsError> {
        Ok(Self {
            af: AfStatistics::decode(af_raw)?,
            awb: AwbStatistics::decode(awb_raw, grid)?,
        })
    }
}

/// AF filter coefficients and noise-filter shifts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AfFilterConfig {
    pub y1_coeff_0: [u8; 4],
    pub y1_coeff_1: [u8; 4],
    pub y1_coeff_2: [u8; 4],
    pub y1_sign_vec: u32,
    pub y2_coeff_0: [u8; 4],
    pub y2_coeff_1: [u8; 4],
    pub y2_coeff_2: [u8; 4],
    pub y2_sign_vec: u32,
    /// Weights of the four Bayer channels in the luma calculation
    pub y_calc: [u8; 4],
    pub nf: [u8; 5],
}

impl Default for AfFilterConfig {
    fn default() -> Self {
        Self {
            y1_coeff_0: [0, 0, 0, 0],
            y1_coeff_1: [0, 0, 0, 0],
            y1_coeff_2: [0, 0, 0, 128],
            y1_sign_vec: 0,
            y2_coeff_0: [0, 0, 0, 0],
            y2_coeff_1: [0, 0, 0, 0],
            y2_coeff_2: [0, 0, 0, 128],
            y2_sign_vec: 0,
            y_calc: [8, 8, 8, 8],
            nf: [0, 7, 0, 7, 0],
        }
    }
}

/// AF statistics grid placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AfGridConfig {
    pub width: u8,
    pub height: u8,
    pub block_width_log2: u8,
    pub block_height_log2: u8,
    pub x_start: u16,
    pub y_start: u16,
    /// Y start enable bit; the accelerator ignores `y_start` without it
    pub y_start_enabled: bool,
}

impl Default for AfGridConfig {
    fn default() -> Self {
        Self {
            width: 16,
            height: 16,
            block_width_log2: 3,
            block_height_log2: 3,
            x_start: 10,
            y_start: 2,
            y_start_enabled: true,
        }
    }
}

/// AF accelerator block
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AfAcceleratorConfig {
    pub filter: AfFilterConfig,
    pub grid: AfGridConfig,
}

/// Accelerator parameters programmed ahead of a future frame
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceleratorParams {
    /// Set when the AF block below must be applied
    pub use_af: bool,
    pub af: AfAcceleratorConfig,
}
