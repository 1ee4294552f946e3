//! Synthetic statistics shaped like real accelerator output
//!
//! The focus model gives every lens position a contrast amplitude that peaks
//! at a chosen position and falls off linearly on both sides, so a sweep sees
//! a single, unambiguous maximum.

use crate::context::{ConfigInfo, SensorControls, SensorInfo};
use crate::grid::{GridConfig, Size};
use crate::stats::{
    AfCell, AfStatistics, AwbCell, AwbStatistics, AF_Y_TABLE_ITEM_SIZE, AWB_SET_ITEM_SIZE,
};

/// Stream configuration of a 2592x1944 sensor binned to 1280x720 statistics
///
/// Lines last 10us; exposure ranges from 4 to 8000 lines, gain from 1x to 16x.
pub fn synthetic_config_info() -> ConfigInfo {
    ConfigInfo {
        sensor: SensorInfo {
            line_length: 3000,
            pixel_rate: 300_000_000,
            output_size: Size::new(2592, 1944),
        },
        controls: SensorControls {
            min_exposure: 4,
            max_exposure: 8000,
            min_analogue_gain: 1.0,
            max_analogue_gain: 16.0,
        },
        bds_output_size: Size::new(1280, 720),
    }
}

/// Raw AF y-table holding the given (low-pass, high-pass) pairs
pub fn af_raw_buffer(cells: &[AfCell]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(cells.len() * AF_Y_TABLE_ITEM_SIZE);
    for cell in cells {
        raw.extend_from_slice(&cell.low_pass.to_le_bytes());
        raw.extend_from_slice(&cell.high_pass.to_le_bytes());
    }
    raw
}

/// Raw AWB buffer for `grid`, laid out with its stride; padding cells are zero
pub fn awb_raw_buffer(grid: &GridConfig, cell: AwbCell) -> Vec<u8> {
    let mut raw = vec![0u8; grid.required_cells() * AWB_SET_ITEM_SIZE];
    for position in grid.cell_positions() {
        raw[position * AWB_SET_ITEM_SIZE..][..AWB_SET_ITEM_SIZE].copy_from_slice(&[
            cell.gr,
            cell.r,
            cell.b,
            cell.gb,
            cell.sat_ratio,
            0,
            0,
            0,
        ]);
    }
    raw
}

/// Every cell of `grid` reporting the same level on all channels
pub fn uniform_awb_statistics(grid: &GridConfig, value: u8) -> AwbStatistics {
    let cells = vec![AwbCell::uniform(value); grid.cell_count()];
    AwbStatistics::from_cells(grid, cells).expect("cell count matches the grid")
}

/// A scene whose sharpness depends on the lens position
#[derive(Debug, Clone, Copy)]
pub struct FocusScene {
    /// Lens position of perfect focus
    pub peak_position: u32,
    /// Contrast amplitude at perfect focus
    pub peak_amplitude: u16,
    /// Amplitude lost per lens step away from the peak
    pub falloff: f64,
    /// Number of AF cells reported per frame
    pub cells: usize,
}

impl Default for FocusScene {
    fn default() -> Self {
        Self {
            peak_position: 150,
            peak_amplitude: 2000,
            falloff: 2.0,
            cells: 64,
        }
    }
}

impl FocusScene {
    /// Contrast amplitude seen with the lens at `position`
    pub fn amplitude(&self, position: u32) -> u16 {
        let distance = f64::from(position.abs_diff(self.peak_position));
        (f64::from(self.peak_amplitude) - distance * self.falloff).max(0.0) as u16
    }

    /// AF cells alternating around a base level by the amplitude at `position`.
    ///
    /// The variance of the high-pass values is `amplitude^2 / 4` for amplitudes
    /// up to 8192; larger ones clip at zero on the low side.
    pub fn cells_at(&self, position: u32) -> Vec<AfCell> {
        let base = 4096u16;
        let amplitude = self.amplitude(position) / 2;
        (0..self.cells)
            .map(|i| AfCell {
                low_pass: base,
                high_pass: if i % 2 == 0 {
                    base.saturating_add(amplitude)
                } else {
                    base.saturating_sub(amplitude)
                },
            })
            .collect()
    }

    pub fn statistics_at(&self, position: u32) -> AfStatistics {
        AfStatistics::from_cells(self.cells_at(position))
    }
}

/// AF statistics for each position of a sweep over `positions`
pub fn focus_sweep_statistics(
    scene: &FocusScene,
    positions: impl IntoIterator<Item = u32>,
) -> Vec<AfStatistics> {
    positions
        .into_iter()
        .map(|position| scene.statistics_at(position))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::af::contrast_variance;

    #[test]
    fn test_focus_scene_peaks_at_position() {
        let scene = FocusScene::default();
        let peak = contrast_variance(&scene.statistics_at(150));
        assert_eq!(peak, 1000.0 * 1000.0);
        assert!(contrast_variance(&scene.statistics_at(145)) < peak);
        assert!(contrast_variance(&scene.statistics_at(155)) < peak);
        assert!(contrast_variance(&scene.statistics_at(1020)) < peak);
    }

    #[test]
    fn test_large_amplitude_clips_instead_of_wrapping() {
        let scene = FocusScene {
            peak_amplitude: u16::MAX,
            ..Default::default()
        };
        let cells = scene.cells_at(scene.peak_position);
        assert_eq!(cells[0].high_pass, 4096 + u16::MAX / 2);
        assert_eq!(cells[1].high_pass, 0);
    }

    #[test]
    fn test_af_raw_buffer_decodes() {
        let scene = FocusScene::default();
        let cells = scene.cells_at(100);
        let decoded = AfStatistics::decode(&af_raw_buffer(&cells)).unwrap();
        assert_eq!(decoded.cells(), cells.as_slice());
    }

    #[test]
    fn test_awb_raw_buffer_decodes() {
        let grid = GridConfig::new(3, 2, 4).unwrap();
        let raw = awb_raw_buffer(&grid, AwbCell::uniform(77));
        let decoded = AwbStatistics::decode(&raw, &grid).unwrap();
        assert_eq!(decoded, uniform_awb_statistics(&grid, 77));
    }

    #[test]
    fn test_sweep_length() {
        let sweep = focus_sweep_statistics(&FocusScene::default(), (0..=1025).step_by(5));
        assert_eq!(sweep.len(), 206);
    }
}
