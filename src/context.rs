//! Session and per-frame context shared between the pipeline and the controllers
//!
//! Both structures are split into one subsection per owner. A controller only
//! writes its own subsection; everything else it receives is read-only.

use crate::errors::ConfigError;
use crate::grid::{GridConfig, Size};
use std::time::Duration;

/// Sensor timing and geometry reported when a stream is configured
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorInfo {
    /// Line length in pixels, blanking included
    pub line_length: u32,
    /// Pixel clock in pixels per second
    pub pixel_rate: u64,
    pub output_size: Size,
}

/// Exposure and gain ranges exposed by the sensor driver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorControls {
    /// Exposure limits in lines
    pub min_exposure: u32,
    pub max_exposure: u32,
    pub min_analogue_gain: f64,
    pub max_analogue_gain: f64,
}

/// Everything the pipeline supplies on stream (re)configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfigInfo {
    pub sensor: SensorInfo,
    pub controls: SensorControls,
    /// Size of the image the statistics are gathered on
    pub bds_output_size: Size,
}

/// Statistics grid of the session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridSession {
    pub bds_output_size: Size,
    pub bds_grid: GridConfig,
}

/// AF window placement, owned by the autofocus controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AfSession {
    pub start_x: u32,
    pub start_y: u32,
}

/// Sensor-reported shutter and gain ranges, before controller clamping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgcSession {
    pub min_shutter: Duration,
    pub max_shutter: Duration,
    pub min_analogue_gain: f64,
    pub max_analogue_gain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorSession {
    pub line_duration: Duration,
}

/// Read-only session configuration, rebuilt on every stream configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfiguration {
    pub grid: GridSession,
    pub af: AfSession,
    pub agc: AgcSession,
    pub sensor: SensorSession,
}

impl SessionConfiguration {
    /// Derive the session from the pipeline configuration.
    ///
    /// The line duration is `line_length / pixel_rate`; shutter limits are the
    /// sensor exposure limits converted from lines to time.
    pub fn from_config_info(info: &ConfigInfo) -> Result<Self, ConfigError> {
        let bds_grid = GridConfig::from_output_size(info.bds_output_size)?;

        let line_duration = match info.sensor.pixel_rate {
            0 => Duration::ZERO,
            rate => Duration::from_nanos(u64::from(info.sensor.line_length) * 1_000_000_000 / rate),
        };
        if line_duration.is_zero() {
            return Err(ConfigError::InvalidSensorLimits(format!(
                "line length {} at pixel rate {} gives no line duration",
                info.sensor.line_length, info.sensor.pixel_rate
            )));
        }

        let controls = &info.controls;
        if controls.min_exposure > controls.max_exposure {
            return Err(ConfigError::InvalidSensorLimits(format!(
                "exposure range {}..{} lines is inverted",
                controls.min_exposure, controls.max_exposure
            )));
        }
        if !(controls.min_analogue_gain <= controls.max_analogue_gain) {
            return Err(ConfigError::InvalidSensorLimits(format!(
                "gain range {}..{} is inverted",
                controls.min_analogue_gain, controls.max_analogue_gain
            )));
        }

        Ok(Self {
            grid: GridSession {
                bds_output_size: info.bds_output_size,
                bds_grid,
            },
            af: AfSession::default(),
            agc: AgcSession {
                min_shutter: line_duration * controls.min_exposure,
                max_shutter: line_duration * controls.max_exposure,
                min_analogue_gain: controls.min_analogue_gain,
                max_analogue_gain: controls.max_analogue_gain,
            },
            sensor: SensorSession { line_duration },
        })
    }
}

/// Autofocus output for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AfFrameContext {
    /// Lens position to apply
    pub focus: u32,
    /// Set once a scan has converged
    pub stable: bool,
}

/// Exposure output for one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgcFrameContext {
    /// Exposure time in lines
    pub exposure: u32,
    pub gain: f64,
}

impl Default for AgcFrameContext {
    fn default() -> Self {
        Self {
            exposure: 0,
            gain: 1.0,
        }
    }
}

/// White balance gains applied to the frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AwbGains {
    pub red: f64,
    pub green: f64,
    pub blue: f64,
}

impl Default for AwbGains {
    fn default() -> Self {
        Self {
            red: 1.0,
            green: 1.0,
            blue: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AwbFrameContext {
    pub gains: AwbGains,
}

/// Exposure and gain the sensor actually used for the frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrameContext {
    /// Exposure time in lines
    pub exposure: u32,
    pub gain: f64,
}

impl Default for SensorFrameContext {
    fn default() -> Self {
        Self {
            exposure: 0,
            gain: 1.0,
        }
    }
}

/// Context of one in-flight frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameContext {
    /// Frame sequence number
    pub frame: u32,
    pub af: AfFrameContext,
    pub agc: AgcFrameContext,
    pub awb: AwbFrameContext,
    pub sensor: SensorFrameContext,
}

/// Session configuration plus the context of the frame being processed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IpaContext {
    pub configuration: SessionConfiguration,
    pub frame_context: FrameContext,
}

impl IpaContext {
    pub fn new(configuration: SessionConfiguration) -> Self {
        Self {
            configuration,
            frame_context: FrameContext::default(),
        }
    }
}
