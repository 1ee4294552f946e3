//! ipa3a: statistics-driven 3A control core for camera image pipelines
//!
//! Per-frame algorithms that turn accelerator statistics into actuator
//! decisions for the next captured frame: lens focus position, sensor
//! exposure time and analogue gain.
//!
//! # Features
//! - Contrast-search autofocus with drift detection and automatic rescans
//! - Auto-exposure/gain combining a top-quantile and a relative-luminance estimator
//! - Temporal exposure filtering and shutter-first exposure splitting
//! - Typed, bounds-checked decoding of raw accelerator buffers
//! - TOML tuning files
//!
//! # Usage
//! ```rust,ignore
//! use ipa3a::{IpaPipeline, SensorFrameContext, TuningConfig};
//!
//! let mut ipa = IpaPipeline::new(TuningConfig::load_or_default());
//! ipa.configure(&config_info)?;
//!
//! // before the hardware captures statistics for frame n + 2
//! let params = ipa.prepare(n + 2);
//!
//! // once the statistics of frame n are available
//! if let Some(frame) = ipa.process_raw(n, sensor, &af_raw, &awb_raw)? {
//!     set_lens(frame.af.focus);
//!     set_exposure(frame.agc.exposure, frame.agc.gain);
//! }
//! ```
pub mod algorithms;
pub mod config;
pub mod context;
pub mod errors;
pub mod grid;
pub mod histogram;
pub mod invariant_ppt;
pub mod pipeline;
pub mod stats;

// Synthetic statistics for offline testing
pub mod testing;

pub use algorithms::{Af, AfState, Agc, Algorithm};
pub use config::{AfTuning, AgcTuning, TuningConfig};
pub use context::{
    AwbGains, ConfigInfo, FrameContext, IpaContext, SensorControls, SensorFrameContext,
    SensorInfo, SessionConfiguration,
};
pub use errors::{ConfigError, StatsError};
pub use grid::{GridConfig, Size};
pub use histogram::Histogram;
pub use pipeline::IpaPipeline;
pub use stats::{AcceleratorParams, AfStatistics, AwbStatistics, FrameStatistics};

/// Initialize logging for the control core
pub fn init_logging() {
    let env = env_logger::Env::default().default_filter_or("ipa3a=info");
    let _ = env_logger::Builder::from_env(env).try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        assert_eq!(NAME, "ipa3a");
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
