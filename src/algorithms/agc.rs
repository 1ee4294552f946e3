//! Mean-based auto-exposure and gain control
//!
//! Two brightness estimators run on the AWB grid statistics of every frame:
//!
//! - the mean of the brightest 2% of the green histogram, driven towards half
//!   of full scale
//! - the relative luminance of the whole frame, driven towards a mid-grey target
//!
//! The larger of the two required gains wins. The resulting exposure value is
//! smoothed over time, then split into shutter time first and analogue gain
//! second, so gain (and its noise) is only added once the shutter is maxed out.
//!
//! All cells weigh the same, as in average metering.

use super::Algorithm;
use crate::assert_invariant;
use crate::config::AgcTuning;
use crate::context::{
    AgcFrameContext, AgcSession, AwbFrameContext, ConfigInfo, IpaContext, SensorFrameContext,
};
use crate::errors::ConfigError;
use crate::histogram::Histogram;
use crate::invariant_ppt::{AGC_FILTERED_BOUNDED, AGC_SPLIT_IN_RANGE};
use crate::stats::{AwbStatistics, FrameStatistics};
use std::time::Duration;

/// Rec. 601 luma weights
const RED_WEIGHT: f64 = 0.299;
const GREEN_WEIGHT: f64 = 0.587;
const BLUE_WEIGHT: f64 = 0.114;

/// Auto-exposure/gain controller
#[derive(Debug, Clone)]
pub struct Agc {
    tuning: AgcTuning,
    frame_count: u32,
    line_duration: Duration,
    min_shutter: Duration,
    max_shutter: Duration,
    min_gain: f64,
    max_gain: f64,
    /// Temporally smoothed exposure value
    filtered_exposure: Duration,
    /// Target exposure value of the latest frame, before smoothing
    current_exposure: Duration,
}

impl Default for Agc {
    fn default() -> Self {
        Self::new(AgcTuning::default())
    }
}

impl Agc {
    pub fn new(tuning: AgcTuning) -> Self {
        Self {
            frame_count: 0,
            line_duration: Duration::ZERO,
            min_shutter: Duration::ZERO,
            max_shutter: Duration::ZERO,
            min_gain: tuning.min_analogue_gain,
            max_gain: tuning.max_analogue_gain,
            filtered_exposure: Duration::ZERO,
            current_exposure: Duration::ZERO,
            tuning,
        }
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn filtered_exposure(&self) -> Duration {
        self.filtered_exposure
    }

    pub fn current_exposure(&self) -> Duration {
        self.current_exposure
    }

    pub fn shutter_limits(&self) -> (Duration, Duration) {
        (self.min_shutter, self.max_shutter)
    }

    pub fn gain_limits(&self) -> (f64, f64) {
        (self.min_gain, self.max_gain)
    }

    /// Longest shutter at the highest gain
    pub fn max_total_exposure(&self) -> Duration {
        self.max_shutter.mul_f64(self.max_gain)
    }

    /// Resolve the session limits and seed the frame context with the minimum
    /// exposure and gain.
    ///
    /// Sensor limits are narrowed to the hardware-safe ceilings of the tuning.
    pub fn configure_session(
        &mut self,
        line_duration: Duration,
        sensor_limits: &AgcSession,
        frame: &mut AgcFrameContext,
    ) -> Result<(), ConfigError> {
        self.tuning.validate()?;
        if line_duration.is_zero() {
            return Err(ConfigError::InvalidSensorLimits(
                "line duration is zero".to_string(),
            ));
        }

        let min_shutter = sensor_limits.min_shutter;
        let max_shutter = sensor_limits.max_shutter.min(self.tuning.max_shutter());
        if min_shutter > max_shutter || max_shutter.is_zero() {
            return Err(ConfigError::InvalidSensorLimits(format!(
                "shutter range {:?}..{:?} is empty",
                min_shutter, max_shutter
            )));
        }

        let min_gain = sensor_limits
            .min_analogue_gain
            .max(self.tuning.min_analogue_gain);
        let max_gain = sensor_limits
            .max_analogue_gain
            .min(self.tuning.max_analogue_gain);
        if !(min_gain <= max_gain) {
            return Err(ConfigError::InvalidSensorLimits(format!(
                "gain range {}..{} is empty",
                min_gain, max_gain
            )));
        }

        self.line_duration = line_duration;
        self.min_shutter = min_shutter;
        self.max_shutter = max_shutter;
        self.min_gain = min_gain;
        self.max_gain = max_gain;
        self.frame_count = 0;
        self.filtered_exposure = Duration::ZERO;
        self.current_exposure = Duration::ZERO;

        *frame = AgcFrameContext {
            exposure: self.lines(min_shutter),
            gain: min_gain,
        };

        log::info!(
            "AGC limits: shutter {:?}..{:?}, gain {}..{}, line duration {:?}",
            min_shutter,
            max_shutter,
            min_gain,
            max_gain,
            line_duration
        );

        Ok(())
    }

    /// Shutter time in whole sensor lines, rounded down
    fn lines(&self, shutter: Duration) -> u32 {
        let lines = shutter.as_nanos() / self.line_duration.as_nanos().max(1);
        u32::try_from(lines).unwrap_or(u32::MAX)
    }

    /// Mean green level of the brightest cells, in histogram bins.
    ///
    /// Overexposed cells are counted too. The result sits at bin centres, so it
    /// is never below half a bin.
    pub fn measure_brightness(&self, stats: &AwbStatistics) -> f64 {
        let bins = self.tuning.histogram_bins;
        let mut hist = vec![0u32; bins];
        for cell in stats.cells() {
            let bin = usize::from(cell.green()).min(bins - 1);
            hist[bin] += 1;
        }

        let histogram = Histogram::new(&hist);
        histogram.inter_quantile_mean(self.tuning.quantile_low, self.tuning.quantile_high) + 0.5
    }

    /// Relative luminance the frame would have with an extra `gain` applied.
    ///
    /// Channel averages are scaled by the gain and saturated at 255 to mimic
    /// the sensor clipping, weighted by the white balance gains and combined
    /// with the Rec. 601 coefficients. The result is normalised to [0, 1] for
    /// unity white balance.
    pub fn estimate_luminance(
        &self,
        awb: &AwbFrameContext,
        stats: &AwbStatistics,
        gain: f64,
    ) -> f64 {
        let (mut red_sum, mut green_sum, mut blue_sum) = (0.0, 0.0, 0.0);
        for cell in stats.cells() {
            red_sum += (f64::from(cell.r) * gain).min(255.0);
            green_sum += (f64::from(cell.green()) * gain).min(255.0);
            blue_sum += (f64::from(cell.b) * gain).min(255.0);
        }

        let y_sum = red_sum * awb.gains.red * RED_WEIGHT
            + green_sum * awb.gains.green * GREEN_WEIGHT
            + blue_sum * awb.gains.blue * BLUE_WEIGHT;

        y_sum / stats.cells().len().max(1) as f64 / 255.0
    }

    /// Gain bringing the top quantile mean to its target
    pub fn quantile_gain(&self, stats: &AwbStatistics) -> f64 {
        let iq_mean = self
            .measure_brightness(stats)
            .max(self.tuning.luminance_epsilon);
        self.tuning.ev_gain_target * self.tuning.histogram_bins as f64 / iq_mean
    }

    /// Gain bringing the relative luminance to its target.
    ///
    /// Saturation makes luminance sublinear in gain, so the estimate is
    /// refined iteratively until the correction becomes negligible.
    pub fn luminance_gain(&self, awb: &AwbFrameContext, stats: &AwbStatistics) -> f64 {
        let y_target = self.tuning.relative_luminance_target;
        let mut y_gain = 1.0;

        for _ in 0..self.tuning.luminance_iterations {
            let y_value = self.estimate_luminance(awb, stats, y_gain);
            let extra_gain = self
                .tuning
                .max_extra_gain
                .min(y_target / (y_value + self.tuning.luminance_epsilon));

            y_gain *= extra_gain;
            log::debug!(
                "Y value: {}, Y target: {}, gives gain {}",
                y_value,
                y_target,
                y_gain
            );
            if extra_gain < self.tuning.convergence_threshold {
                break;
            }
        }

        y_gain
    }

    /// Smooth the target exposure value over time.
    fn filter_exposure(&mut self) {
        let mut speed = self.tuning.filter_speed;

        // Adapt instantly during startup
        if self.frame_count < self.tuning.startup_frames {
            speed = 1.0;
        }

        if self.filtered_exposure.is_zero() {
            self.filtered_exposure = self.current_exposure;
        } else {
            // Settle faster near the target to avoid visible micro-adjustments
            let band = self.tuning.filter_near_band;
            if self.filtered_exposure < self.current_exposure.mul_f64(1.0 + band)
                && self.filtered_exposure > self.current_exposure.mul_f64(1.0 - band)
            {
                speed = speed.sqrt();
            }

            self.filtered_exposure = self.current_exposure.mul_f64(speed)
                + self.filtered_exposure.mul_f64(1.0 - speed);
        }

        let max_total = self.max_total_exposure();
        self.filtered_exposure = self.filtered_exposure.min(max_total);
        assert_invariant!(
            self.filtered_exposure <= max_total,
            AGC_FILTERED_BOUNDED,
            "agc"
        );

        log::debug!(
            "After filtering, total_exposure {:?}",
            self.filtered_exposure
        );
    }

    /// Split an exposure value into shutter time and analogue gain.
    ///
    /// The shutter is lengthened up to its maximum first; gain only covers
    /// what the shutter cannot.
    pub fn split_exposure(&self, exposure_value: Duration) -> (Duration, f64) {
        let shutter_time = exposure_value
            .div_f64(self.min_gain)
            .clamp(self.min_shutter, self.max_shutter);

        let gain = if shutter_time.is_zero() {
            self.min_gain
        } else {
            (exposure_value.as_secs_f64() / shutter_time.as_secs_f64())
                .clamp(self.min_gain, self.max_gain)
        };

        assert_invariant!(
            shutter_time >= self.min_shutter
                && shutter_time <= self.max_shutter
                && gain >= self.min_gain
                && gain <= self.max_gain,
            AGC_SPLIT_IN_RANGE,
            "agc"
        );

        (shutter_time, gain)
    }

    /// Turn the combined gain estimate into the next exposure and gain.
    pub fn compute_exposure(
        &mut self,
        sensor: &SensorFrameContext,
        frame: &mut AgcFrameContext,
        y_gain: f64,
        iq_mean_gain: f64,
    ) {
        let ev_gain = y_gain.max(iq_mean_gain);

        // Within 1% of the target counts as correctly exposed
        if (ev_gain - 1.0).abs() < 0.01 {
            log::debug!("We are well exposed (evGain = {})", ev_gain);
        }

        // Exposure the sensor really applied, not the one last requested
        let analogue_gain = sensor.gain.max(0.0);
        let current_shutter = self
            .line_duration
            .checked_mul(sensor.exposure)
            .unwrap_or(Duration::MAX);
        let effective_exposure = current_shutter.as_secs_f64() * analogue_gain;

        log::debug!(
            "Actual total exposure {:.6}s Shutter speed {:?} Gain {} Needed ev gain {}",
            effective_exposure,
            current_shutter,
            analogue_gain,
            ev_gain
        );

        let max_total = self.max_total_exposure();
        let target = (effective_exposure * ev_gain).max(0.0);
        self.current_exposure = if target >= max_total.as_secs_f64() {
            max_total
        } else {
            Duration::from_secs_f64(target)
        };

        log::debug!(
            "Target total exposure {:?}, maximum is {:?}",
            self.current_exposure,
            max_total
        );

        self.filter_exposure();

        let (shutter_time, gain) = self.split_exposure(self.filtered_exposure);
        log::debug!(
            "Divided up shutter and gain are {:?} and {}",
            shutter_time,
            gain
        );

        frame.exposure = self.lines(shutter_time);
        frame.gain = gain;
    }

    /// Estimate the scene brightness and derive the next exposure and gain.
    pub fn process_statistics(
        &mut self,
        awb: &AwbFrameContext,
        sensor: &SensorFrameContext,
        frame: &mut AgcFrameContext,
        stats: &AwbStatistics,
    ) {
        let iq_mean_gain = self.quantile_gain(stats);
        let y_gain = self.luminance_gain(awb, stats);

        self.compute_exposure(sensor, frame, y_gain, iq_mean_gain);
        self.frame_count = self.frame_count.saturating_add(1);
    }
}

impl Algorithm for Agc {
    fn name(&self) -> &'static str {
        "agc"
    }

    fn configure(
        &mut self,
        context: &mut IpaContext,
        _config: &ConfigInfo,
    ) -> Result<(), ConfigError> {
        let configuration = &context.configuration;
        self.configure_session(
            configuration.sensor.line_duration,
            &configuration.agc,
            &mut context.frame_context.agc,
        )
    }

    fn process(&mut self, context: &mut IpaContext, stats: &FrameStatistics) {
        let frame_context = &mut context.frame_context;
        self.process_statistics(
            &frame_context.awb,
            &frame_context.sensor,
            &mut frame_context.agc,
            &stats.awb,
        );
    }
}
