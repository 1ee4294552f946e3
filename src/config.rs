//! Tuning configuration for the 3A controllers
//!
//! Every constant the autofocus and exposure controllers rely on lives here
//! so a tuning file can override it per sensor module. Values missing from
//! the file fall back to the built-in defaults.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root tuning structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub af: AfTuning,
    pub agc: AgcTuning,
}

/// Autofocus contrast-search tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AfTuning {
    /// Largest lens position the voice coil motor accepts
    pub max_focus_steps: u32,
    /// Lens positions advanced per scored frame
    pub search_step: u32,
    /// Relative variance change above which a locked focus is considered lost
    pub max_variance_change: f64,
    /// Frames skipped after configure and replenished while focus holds
    pub ignore_frames: u32,
    /// Frames of sustained change tolerated before a new scan starts
    pub retrigger_ignore_frames: u32,
    /// Side of the square AF window in output pixels
    pub window_size: u32,
}

/// Auto-exposure/gain tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgcTuning {
    pub min_analogue_gain: f64,
    pub max_analogue_gain: f64,
    /// Hardware ceiling for the shutter time, in microseconds
    pub max_shutter_us: u64,
    pub histogram_bins: usize,
    /// Target for the mean of the brightest quantile, as a fraction of full scale
    pub ev_gain_target: f64,
    pub quantile_low: f64,
    pub quantile_high: f64,
    /// Frames after configure during which the filter adapts instantly
    pub startup_frames: u32,
    pub relative_luminance_target: f64,
    pub luminance_iterations: u32,
    pub max_extra_gain: f64,
    /// Extra gain below which the luminance estimate is considered converged
    pub convergence_threshold: f64,
    pub filter_speed: f64,
    /// Half width of the band around the filtered value where the filter speeds up
    pub filter_near_band: f64,
    pub luminance_epsilon: f64,
}

impl Default for AfTuning {
    fn default() -> Self {
        Self {
            max_focus_steps: 1023,
            search_step: 5,
            max_variance_change: 0.8,
            ignore_frames: 10,
            retrigger_ignore_frames: 60,
            window_size: 128,
        }
    }
}

impl Default for AgcTuning {
    fn default() -> Self {
        Self {
            min_analogue_gain: 1.0,
            max_analogue_gain: 8.0,
            max_shutter_us: 60_000,
            histogram_bins: 256,
            ev_gain_target: 0.5,
            quantile_low: 0.98,
            quantile_high: 1.0,
            startup_frames: 10,
            relative_luminance_target: 0.16,
            luminance_iterations: 8,
            max_extra_gain: 10.0,
            convergence_threshold: 1.01,
            filter_speed: 0.2,
            filter_near_band: 0.2,
            luminance_epsilon: 0.001,
        }
    }
}

impl TuningConfig {
    /// Load tuning from a TOML file, falling back to defaults when it is absent
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Tuning file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;
        let config: TuningConfig = toml::from_str(&contents)?;
        config.validate()?;

        log::info!("Loaded tuning from {:?}", path);
        Ok(config)
    }

    /// Save tuning to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let toml_string = toml::to_string_pretty(self)?;
        fs::write(path, toml_string)?;

        log::info!("Saved tuning to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("ipa3a.toml")
    }

    /// Load from the default location or use defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load tuning, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate tuning values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.af.validate()?;
        self.agc.validate()
    }
}

fn invalid(msg: &str) -> Result<(), ConfigError> {
    Err(ConfigError::InvalidTuning(msg.to_string()))
}

impl AfTuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_step == 0 {
            return invalid("AF search step must be non-zero");
        }
        if self.max_focus_steps == 0 {
            return invalid("AF max focus steps must be non-zero");
        }
        if !(self.max_variance_change > 0.0 && self.max_variance_change.is_finite()) {
            return invalid("AF max variance change must be positive");
        }
        if self.window_size == 0 {
            return invalid("AF window size must be non-zero");
        }
        Ok(())
    }
}

impl AgcTuning {
    pub fn max_shutter(&self) -> Duration {
        Duration::from_micros(self.max_shutter_us)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min_analogue_gain > 0.0 && self.min_analogue_gain <= self.max_analogue_gain) {
            return invalid("AGC gain range must satisfy 0 < min <= max");
        }
        if !self.max_analogue_gain.is_finite() {
            return invalid("AGC max gain must be finite");
        }
        if self.max_shutter_us == 0 {
            return invalid("AGC max shutter must be non-zero");
        }
        if self.histogram_bins < 2 {
            return invalid("AGC histogram needs at least 2 bins");
        }
        if !(0.0..1.0).contains(&self.quantile_low)
            || !(self.quantile_low < self.quantile_high && self.quantile_high <= 1.0)
        {
            return invalid("AGC quantile range must satisfy 0 <= low < high <= 1");
        }
        if !(self.ev_gain_target > 0.0 && self.relative_luminance_target > 0.0) {
            return invalid("AGC brightness targets must be positive");
        }
        if self.luminance_iterations == 0 {
            return invalid("AGC needs at least one luminance iteration");
        }
        if !(self.max_extra_gain >= 1.0 && self.convergence_threshold >= 1.0) {
            return invalid("AGC extra gain cap and convergence threshold must be >= 1");
        }
        if !(self.filter_speed > 0.0 && self.filter_speed <= 1.0) {
            return invalid("AGC filter speed must be in (0, 1]");
        }
        if !(0.0..1.0).contains(&self.filter_near_band) {
            return invalid("AGC filter band must be in [0, 1)");
        }
        if !(self.luminance_epsilon > 0.0) {
            return invalid("AGC luminance epsilon must be positive");
        }
        Ok(())
    }
}
