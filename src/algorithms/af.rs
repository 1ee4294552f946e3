//! Contrast-search autofocus
//!
//! The AF accelerator reports, per grid cell, a low-pass and a high-pass
//! filtered luma average. A sharp image carries more high-frequency energy,
//! so the variance of the high-pass responses across the grid is used as the
//! focus score. The lens is swept across its whole range, the position with
//! the highest score is kept, and the lens stays there until the score drifts
//! far enough for long enough to justify a new sweep.

use super::Algorithm;
use crate::assert_invariant;
use crate::config::AfTuning;
use crate::context::{AfFrameContext, AfSession, ConfigInfo, IpaContext};
use crate::errors::ConfigError;
use crate::grid::Size;
use crate::invariant_ppt::AF_SCAN_MONOTONIC;
use crate::stats::{AcceleratorParams, AfAcceleratorConfig, AfStatistics, FrameStatistics};

/// Autofocus mode together with the data that mode needs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AfState {
    /// Sweeping the lens and tracking the sharpest position seen so far
    Scanning {
        position: u32,
        best_position: u32,
        best_variance: f64,
        /// Frames still to skip before scoring resumes
        ignore_frames: u32,
    },
    /// Lens locked on the sharpest position of the last sweep
    Stable {
        locked_position: u32,
        /// Score of the locked position, the reference for drift detection
        best_variance: f64,
        /// Frames of sustained drift still tolerated
        ignore_frames: u32,
    },
}

impl AfState {
    fn scanning(ignore_frames: u32) -> Self {
        AfState::Scanning {
            position: 0,
            best_position: 0,
            best_variance: 0.0,
            ignore_frames,
        }
    }

    /// Lens position requested for the next frame
    pub fn focus(&self) -> u32 {
        match *self {
            AfState::Scanning { position, .. } => position,
            AfState::Stable {
                locked_position, ..
            } => locked_position,
        }
    }

    pub fn is_stable(&self) -> bool {
        matches!(self, AfState::Stable { .. })
    }

    pub fn best_variance(&self) -> f64 {
        match *self {
            AfState::Scanning { best_variance, .. } | AfState::Stable { best_variance, .. } => {
                best_variance
            }
        }
    }

    pub fn ignore_frames(&self) -> u32 {
        match *self {
            AfState::Scanning { ignore_frames, .. } | AfState::Stable { ignore_frames, .. } => {
                ignore_frames
            }
        }
    }

    /// Feed one frame's focus score and return the next state.
    pub fn advance(self, variance: f64, tuning: &AfTuning) -> Self {
        match self {
            AfState::Stable {
                locked_position,
                best_variance,
                ignore_frames,
            } => {
                // Increases and decreases are both measured against the locked
                // score, so a brighter or busier scene can exceed 1.0 easily.
                // The difference is counted in whole units. A zero reference
                // yields inf (a change of at least 1) or NaN (anything less).
                let difference = (variance - best_variance)
                    .abs()
                    .trunc()
                    .min(f64::from(u32::MAX));
                let ratio = difference / best_variance;
                log::debug!(
                    "Change ratio: {:.3} current focus: {}",
                    ratio,
                    locked_position
                );

                if ratio > tuning.max_variance_change {
                    if ignore_frames == 0 {
                        log::debug!("Focus lost at position {}, restarting scan", locked_position);
                        // The old lock stands until the new scan scores above zero
                        AfState::Scanning {
                            position: 0,
                            best_position: locked_position,
                            best_variance: 0.0,
                            ignore_frames: tuning.retrigger_ignore_frames,
                        }
                    } else {
                        AfState::Stable {
                            locked_position,
                            best_variance,
                            ignore_frames: ignore_frames - 1,
                        }
                    }
                } else {
                    AfState::Stable {
                        locked_position,
                        best_variance,
                        ignore_frames: tuning.ignore_frames,
                    }
                }
            }
            AfState::Scanning {
                position,
                best_position,
                best_variance,
                ignore_frames,
            } if ignore_frames > 0 => AfState::Scanning {
                position,
                best_position,
                best_variance,
                ignore_frames: ignore_frames - 1,
            },
            AfState::Scanning {
                position,
                mut best_position,
                mut best_variance,
                ..
            } => {
                if variance > best_variance {
                    best_variance = variance;
                    best_position = position;
                }

                let next = if position > tuning.max_focus_steps {
                    AfState::Stable {
                        locked_position: best_position,
                        best_variance,
                        ignore_frames: 0,
                    }
                } else {
                    let next_position = position.saturating_add(tuning.search_step);
                    assert_invariant!(next_position >= position, AF_SCAN_MONOTONIC, "af");
                    AfState::Scanning {
                        position: next_position,
                        best_position,
                        best_variance,
                        ignore_frames: 0,
                    }
                };

                log::debug!(
                    "Focus searching max variance is: {} Focus step is {} Current scan is {}",
                    best_variance,
                    best_position,
                    position
                );
                next
            }
        }
    }
}

/// Variance of the high-pass responses, the frame's focus score.
///
/// Empty statistics score zero.
pub fn contrast_variance(stats: &AfStatistics) -> f64 {
    let cells = stats.cells();
    if cells.is_empty() {
        return 0.0;
    }

    let count = cells.len() as f64;
    let mean = cells
        .iter()
        .map(|cell| f64::from(cell.high_pass))
        .sum::<f64>()
        / count;

    cells
        .iter()
        .map(|cell| {
            let deviation = f64::from(cell.high_pass) - mean;
            deviation * deviation
        })
        .sum::<f64>()
        / count
}

/// Autofocus controller
#[derive(Debug, Clone)]
pub struct Af {
    tuning: AfTuning,
    state: AfState,
    last_variance: f64,
}

impl Default for Af {
    fn default() -> Self {
        Self::new(AfTuning::default())
    }
}

impl Af {
    pub fn new(tuning: AfTuning) -> Self {
        let state = AfState::scanning(tuning.ignore_frames);
        Self {
            tuning,
            state,
            last_variance: 0.0,
        }
    }

    pub fn state(&self) -> AfState {
        self.state
    }

    /// Focus score of the most recently processed frame
    pub fn last_variance(&self) -> f64 {
        self.last_variance
    }

    /// Reset the search and centre the AF window on the statistics image.
    pub fn configure_session(
        &mut self,
        bds_output_size: Size,
        session: &mut AfSession,
        frame: &mut AfFrameContext,
    ) -> Result<(), ConfigError> {
        self.tuning.validate()?;
        if bds_output_size.is_empty() {
            return Err(ConfigError::InvalidGeometry(format!(
                "AF window cannot be placed in a {}x{} image",
                bds_output_size.width, bds_output_size.height
            )));
        }

        let half_window = self.tuning.window_size / 2;
        *session = AfSession {
            start_x: (bds_output_size.width / 2).saturating_sub(half_window),
            start_y: (bds_output_size.height / 2).saturating_sub(half_window),
        };

        self.state = AfState::scanning(self.tuning.ignore_frames);
        self.last_variance = 0.0;
        *frame = AfFrameContext {
            focus: 0,
            stable: false,
        };

        log::debug!(
            "BDS X: {} Y: {}",
            bds_output_size.width,
            bds_output_size.height
        );
        log::debug!(
            "AF start from X: {} Y: {}",
            session.start_x,
            session.start_y
        );

        Ok(())
    }

    /// Accelerator AF block for the configured window
    pub fn accelerator_config(&self, session: &AfSession) -> AfAcceleratorConfig {
        let mut config = AfAcceleratorConfig::default();
        config.grid.x_start = u16::try_from(session.start_x).unwrap_or(u16::MAX);
        config.grid.y_start = u16::try_from(session.start_y).unwrap_or(u16::MAX);
        config.grid.y_start_enabled = true;
        config
    }

    /// Score the frame and step the search.
    pub fn process_statistics(&mut self, frame: &mut AfFrameContext, stats: &AfStatistics) {
        let variance = contrast_variance(stats);
        log::debug!("variance: {}", variance);

        self.last_variance = variance;
        self.state = self.state.advance(variance, &self.tuning);

        frame.focus = self.state.focus();
        frame.stable = self.state.is_stable();
    }
}

impl Algorithm for Af {
    fn name(&self) -> &'static str {
        "af"
    }

    fn configure(
        &mut self,
        context: &mut IpaContext,
        _config: &ConfigInfo,
    ) -> Result<(), ConfigError> {
        let bds_output_size = context.configuration.grid.bds_output_size;
        self.configure_session(
            bds_output_size,
            &mut context.configuration.af,
            &mut context.frame_context.af,
        )
    }

    fn prepare(&self, context: &IpaContext, params: &mut AcceleratorParams) {
        params.use_af = true;
        params.af = self.accelerator_config(&context.configuration.af);
    }

    fn process(&mut self, context: &mut IpaContext, stats: &FrameStatistics) {
        self.process_statistics(&mut context.frame_context.af, &stats.af);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::AfCell;

    fn stats_with(values: &[u16]) -> AfStatistics {
        AfStatistics::from_cells(
            values
                .iter()
                .map(|&high_pass| AfCell {
                    low_pass: 0,
                    high_pass,
                })
                .collect(),
        )
    }

    fn stable(best_variance: f64, ignore_frames: u32) -> AfState {
        AfState::Stable {
            locked_position: 300,
            best_variance,
            ignore_frames,
        }
    }

    #[test]
    fn test_contrast_variance() {
        assert_eq!(contrast_variance(&stats_with(&[10, 10, 10])), 0.0);
        // mean 20, deviations -10 and +10
        assert_eq!(contrast_variance(&stats_with(&[10, 30])), 100.0);
        // cells after the first zero are not part of the grid
        assert_eq!(contrast_variance(&stats_with(&[10, 30, 0, 5000])), 100.0);
        assert_eq!(contrast_variance(&stats_with(&[])), 0.0);
        assert_eq!(contrast_variance(&stats_with(&[0, 100])), 0.0);
    }

    #[test]
    fn test_configure_centres_window() {
        let mut af = Af::default();
        let mut session = AfSession::default();
        let mut frame = AfFrameContext {
            focus: 500,
            stable: true,
        };

        af.configure_session(Size::new(1280, 720), &mut session, &mut frame)
            .unwrap();

        assert_eq!(session, AfSession { start_x: 576, start_y: 296 });
        assert_eq!(frame, AfFrameContext::default());
        assert_eq!(af.state(), AfState::scanning(10));
    }

    #[test]
    fn test_configure_failure_keeps_state() {
        let mut af = Af::new(AfTuning::default());
        af.state = stable(42.0, 10);
        let mut session = AfSession { start_x: 1, start_y: 2 };
        let mut frame = AfFrameContext::default();

        assert!(af
            .configure_session(Size::new(0, 720), &mut session, &mut frame)
            .is_err());
        assert_eq!(af.state(), stable(42.0, 10));
        assert_eq!(session, AfSession { start_x: 1, start_y: 2 });
    }

    #[test]
    fn test_configure_rejects_invalid_tuning() {
        let mut af = Af::new(AfTuning {
            search_step: 0,
            ..Default::default()
        });
        let mut session = AfSession::default();
        let mut frame = AfFrameContext::default();

        assert!(matches!(
            af.configure_session(Size::new(1280, 720), &mut session, &mut frame),
            Err(ConfigError::InvalidTuning(_))
        ));
        assert_eq!(session, AfSession::default());
    }

    #[test]
    fn test_accelerator_config_uses_window() {
        let af = Af::default();
        let config = af.accelerator_config(&AfSession {
            start_x: 576,
            start_y: 296,
        });
        assert_eq!(config.grid.x_start, 576);
        assert_eq!(config.grid.y_start, 296);
        assert!(config.grid.y_start_enabled);
        assert_eq!((config.grid.width, config.grid.height), (16, 16));
        assert_eq!(config.filter.y_calc, [8, 8, 8, 8]);
    }

    #[test]
    fn test_scanning_skips_ignored_frames() {
        let tuning = AfTuning::default();
        let state = AfState::scanning(2).advance(1000.0, &tuning);
        assert_eq!(state, AfState::scanning(1));
        let state = state.advance(1000.0, &tuning);
        assert_eq!(state, AfState::scanning(0));
        let state = state.advance(1000.0, &tuning);
        assert_eq!(
            state,
            AfState::Scanning {
                position: 5,
                best_position: 0,
                best_variance: 1000.0,
                ignore_frames: 0
            }
        );
    }

    #[test]
    fn test_scan_end_locks_best_position() {
        let tuning = AfTuning::default();
        let state = AfState::Scanning {
            position: 1025,
            best_position: 250,
            best_variance: 900.0,
            ignore_frames: 0,
        };
        assert_eq!(
            state.advance(10.0, &tuning),
            AfState::Stable {
                locked_position: 250,
                best_variance: 900.0,
                ignore_frames: 0
            }
        );
    }

    #[test]
    fn test_stable_small_change_replenishes_budget() {
        let tuning = AfTuning::default();
        assert_eq!(stable(100.0, 3).advance(150.0, &tuning), stable(100.0, 10));
    }

    #[test]
    fn test_stable_large_change_consumes_budget() {
        let tuning = AfTuning::default();
        // |20 - 100| / 100 = 0.8 is not above the threshold
        assert_eq!(stable(100.0, 3).advance(20.0, &tuning), stable(100.0, 10));
        assert_eq!(stable(100.0, 3).advance(10.0, &tuning), stable(100.0, 2));
        // increases are asymmetric: 2.5x the reference is a 1.5 ratio
        assert_eq!(stable(100.0, 3).advance(250.0, &tuning), stable(100.0, 2));
        assert_eq!(
            stable(100.0, 0).advance(10.0, &tuning),
            AfState::Scanning {
                position: 0,
                best_position: 300,
                best_variance: 0.0,
                ignore_frames: 60
            }
        );
    }

    #[test]
    fn test_stable_zero_reference() {
        let tuning = AfTuning::default();
        assert_eq!(stable(0.0, 5).advance(0.0, &tuning), stable(0.0, 10));
        // sub-unit changes truncate to zero: 0 / 0 is not drift
        assert_eq!(stable(0.0, 5).advance(0.5, &tuning), stable(0.0, 10));
        assert_eq!(stable(0.0, 5).advance(1.0, &tuning), stable(0.0, 4));
    }

    #[test]
    fn test_change_ratio_counts_whole_units() {
        let tuning = AfTuning::default();
        // |10.9 - 1| truncates to 9: ratio 9, drift
        assert_eq!(stable(1.0, 5).advance(10.9, &tuning), stable(1.0, 4));
        // |1.7 - 1| truncates to 0: no drift
        assert_eq!(stable(1.0, 5).advance(1.7, &tuning), stable(1.0, 10));
    }

    #[test]
    fn test_process_writes_frame_context() {
        let mut af = Af::new(AfTuning {
            ignore_frames: 0,
            ..Default::default()
        });
        let mut frame = AfFrameContext::default();

        af.process_statistics(&mut frame, &stats_with(&[10, 30]));
        assert_eq!(frame, AfFrameContext { focus: 5, stable: false });
        assert_eq!(af.last_variance(), 100.0);
    }
}
