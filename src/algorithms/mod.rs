//! Per-frame 3A control algorithms
//!
//! Every algorithm follows the same lifecycle:
//! 1. `configure` once per stream configuration
//! 2. `prepare` before the accelerator captures statistics for a future frame
//! 3. `process` with the statistics of the frame that just completed
pub mod af;
pub mod agc;

pub use af::{Af, AfState};
pub use agc::Agc;

use crate::context::{ConfigInfo, IpaContext};
use crate::errors::ConfigError;
use crate::stats::{AcceleratorParams, FrameStatistics};

/// A statistics-driven controller run once per frame.
pub trait Algorithm {
    fn name(&self) -> &'static str;

    /// Reset the session state for a new stream configuration.
    ///
    /// On error the controller keeps its previous state.
    fn configure(&mut self, context: &mut IpaContext, config: &ConfigInfo)
        -> Result<(), ConfigError>;

    /// Fill the accelerator parameters for a future frame.
    fn prepare(&self, _context: &IpaContext, _params: &mut AcceleratorParams) {}

    /// Consume the statistics of the current frame.
    fn process(&mut self, context: &mut IpaContext, stats: &FrameStatistics);
}
