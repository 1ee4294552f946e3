//! Per-stream driver for the 3A controllers
//!
//! The pipeline owns the session configuration, the controllers and the
//! context of the most recent frame. One instance serves one camera stream
//! and is driven from that stream's control thread only.

use crate::algorithms::{Af, Agc, Algorithm};
use crate::config::TuningConfig;
use crate::context::{
    AwbFrameContext, AwbGains, ConfigInfo, FrameContext, IpaContext, SensorFrameContext,
    SessionConfiguration,
};
use crate::errors::{ConfigError, StatsError};
use crate::stats::{AcceleratorParams, FrameStatistics};

/// Autofocus and exposure control for one camera stream
#[derive(Debug, Clone)]
pub struct IpaPipeline {
    af: Af,
    agc: Agc,
    context: Option<IpaContext>,
    awb_gains: AwbGains,
    last_frame: Option<u32>,
}

impl Default for IpaPipeline {
    fn default() -> Self {
        Self::new(TuningConfig::default())
    }
}

impl IpaPipeline {
    pub fn new(tuning: TuningConfig) -> Self {
        Self {
            af: Af::new(tuning.af),
            agc: Agc::new(tuning.agc),
            context: None,
            awb_gains: AwbGains::default(),
            last_frame: None,
        }
    }

    pub fn af(&self) -> &Af {
        &self.af
    }

    pub fn agc(&self) -> &Agc {
        &self.agc
    }

    /// Session configuration and latest frame context, once configured
    pub fn context(&self) -> Option<&IpaContext> {
        self.context.as_ref()
    }

    /// Configure every controller for a new stream configuration.
    ///
    /// The new session only replaces the current one if all controllers
    /// accept it.
    pub fn configure(&mut self, config: &ConfigInfo) -> Result<(), ConfigError> {
        let session = SessionConfiguration::from_config_info(config)?;
        let mut context = IpaContext::new(session);
        context.frame_context.awb.gains = self.awb_gains;

        let mut af = self.af.clone();
        let mut agc = self.agc.clone();
        {
            let algorithms: [&mut dyn Algorithm; 2] = [&mut af, &mut agc];
            for algorithm in algorithms {
                algorithm.configure(&mut context, config).map_err(|e| {
                    log::warn!("{} rejected the configuration: {}", algorithm.name(), e);
                    e
                })?;
            }
        }

        self.af = af;
        self.agc = agc;
        self.context = Some(context);
        self.last_frame = None;

        log::info!(
            "Configured for {}x{} statistics on a {}x{} grid",
            session.grid.bds_output_size.width,
            session.grid.bds_output_size.height,
            session.grid.bds_grid.width,
            session.grid.bds_grid.height
        );
        Ok(())
    }

    /// White balance gains applied from the next processed frame on
    pub fn set_awb_gains(&mut self, gains: AwbGains) {
        self.awb_gains = gains;
    }

    /// Accelerator parameters to program before statistics of `frame` are captured
    pub fn prepare(&self, frame: u32) -> AcceleratorParams {
        let mut params = AcceleratorParams::default();
        if let Some(context) = &self.context {
            self.af.prepare(context, &mut params);
            self.agc.prepare(context, &mut params);
            log::trace!("Prepared accelerator parameters for frame {}", frame);
        }
        params
    }

    /// Run every controller on the statistics of `frame`.
    ///
    /// `sensor` holds the exposure and gain the sensor actually used for the
    /// frame. Returns the new frame context, or `None` when the pipeline is
    /// not configured or `frame` does not follow the previous frame.
    pub fn process(
        &mut self,
        frame: u32,
        sensor: SensorFrameContext,
        stats: &FrameStatistics,
    ) -> Option<&FrameContext> {
        let Some(context) = self.context.as_mut() else {
            log::warn!("Frame {} received before configuration", frame);
            return None;
        };

        if let Some(last) = self.last_frame {
            if frame <= last {
                log::warn!("Frame {} out of order after frame {}, ignored", frame, last);
                return None;
            }
        }
        self.last_frame = Some(frame);

        // Controller outputs carry over until the controller rewrites them
        let previous = context.frame_context;
        context.frame_context = FrameContext {
            frame,
            af: previous.af,
            agc: previous.agc,
            awb: AwbFrameContext {
                gains: self.awb_gains,
            },
            sensor,
        };

        let algorithms: [&mut dyn Algorithm; 2] = [&mut self.af, &mut self.agc];
        for algorithm in algorithms {
            algorithm.process(context, stats);
        }

        log::debug!(
            "Frame {}: focus {} (stable {}), exposure {} lines, gain {:.3}",
            frame,
            context.frame_context.af.focus,
            context.frame_context.af.stable,
            context.frame_context.agc.exposure,
            context.frame_context.agc.gain
        );

        Some(&context.frame_context)
    }

    /// Decode raw accelerator buffers and process them.
    ///
    /// A buffer that cannot back the configured grid is reported and the frame
    /// skipped, leaving the previous exposure and focus in place.
    pub fn process_raw(
        &mut self,
        frame: u32,
        sensor: SensorFrameContext,
        af_raw: &[u8],
        awb_raw: &[u8],
    ) -> Result<Option<&FrameContext>, StatsError> {
        let Some(context) = &self.context else {
            log::warn!("Frame {} received before configuration", frame);
            return Ok(None);
        };

        let stats = FrameStatistics::decode(af_raw, awb_raw, &context.configuration.grid.bds_grid)
            .map_err(|e| {
                log::warn!("Skipping frame {}: {}", frame, e);
                e
            })?;

        Ok(self.process(frame, sensor, &stats))
    }
}
