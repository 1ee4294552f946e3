//! Auto-exposure Testing
//!
//! Covers the brightness estimators, the exposure split policy and the
//! closed loop against a simulated linear sensor.

use ipa3a::context::{AgcFrameContext, AgcSession, AwbFrameContext};
use ipa3a::testing::uniform_awb_statistics;
use ipa3a::{Agc, AwbGains, GridConfig, SensorFrameContext};
use proptest::prelude::*;
use std::time::Duration;

/// 10us lines, 40us..80ms shutter, 1x..16x gain
fn configured_agc() -> (Agc, AgcFrameContext) {
    let mut agc = Agc::default();
    let mut frame = AgcFrameContext::default();
    agc.configure_session(
        Duration::from_micros(10),
        &AgcSession {
            min_shutter: Duration::from_micros(40),
            max_shutter: Duration::from_millis(80),
            min_analogue_gain: 1.0,
            max_analogue_gain: 16.0,
        },
        &mut frame,
    )
    .expect("valid limits");
    (agc, frame)
}

fn grid() -> GridConfig {
    GridConfig::new(2, 2, 4).unwrap()
}

fn awb_with_green(green: f64) -> AwbFrameContext {
    AwbFrameContext {
        gains: AwbGains {
            green,
            ..Default::default()
        },
    }
}

#[test]
fn test_mid_grey_estimates() {
    let (agc, _) = configured_agc();
    let stats = uniform_awb_statistics(&grid(), 128);
    let awb = AwbFrameContext::default();

    let luminance = agc.estimate_luminance(&awb, &stats, 1.0);
    assert!((luminance - 0.502).abs() < 1e-3);

    // converges in one iteration: 0.16 / 0.503
    let y_gain = agc.luminance_gain(&awb, &stats);
    assert!((y_gain - 0.318).abs() < 1e-3);
    assert!(y_gain < 1.0);
}

#[test]
fn test_luminance_gain_falls_with_green_gain() {
    let (agc, _) = configured_agc();
    for level in [10u8, 60, 128] {
        let stats = uniform_awb_statistics(&grid(), level);
        let gains: Vec<f64> = [1.0, 1.5, 2.0]
            .iter()
            .map(|&green| agc.luminance_gain(&awb_with_green(green), &stats))
            .collect();
        assert!(
            gains.windows(2).all(|pair| pair[1] <= pair[0]),
            "level {}: {:?}",
            level,
            gains
        );
    }
}

#[test]
fn test_dark_scene_raises_exposure() {
    let (mut agc, mut frame) = configured_agc();
    let sensor = SensorFrameContext {
        exposure: 100,
        gain: 1.0,
    };
    agc.process_statistics(
        &AwbFrameContext::default(),
        &sensor,
        &mut frame,
        &uniform_awb_statistics(&grid(), 10),
    );

    assert!(f64::from(frame.exposure) * frame.gain > 100.0);
}

#[test]
fn test_bright_scene_lowers_exposure() {
    let (mut agc, mut frame) = configured_agc();
    let sensor = SensorFrameContext {
        exposure: 1000,
        gain: 2.0,
    };
    agc.process_statistics(
        &AwbFrameContext::default(),
        &sensor,
        &mut frame,
        &uniform_awb_statistics(&grid(), 250),
    );

    assert!(f64::from(frame.exposure) * frame.gain < 2000.0);
    // shutter-first: a shorter exposure drops the gain before the shutter
    assert!((frame.gain - 1.0).abs() < 1e-6);
}

#[test]
fn test_closed_loop_settles_on_top_quantile_target() {
    let (mut agc, mut frame) = configured_agc();
    let awb = AwbFrameContext::default();
    // Linear sensor: pixel level 0.05 per line at unity gain, clipping at 255
    let respond = |frame: &AgcFrameContext| -> u8 {
        (0.05 * f64::from(frame.exposure) * frame.gain).min(255.0) as u8
    };

    let mut level = respond(&frame);
    for _ in 0..40 {
        let sensor = SensorFrameContext {
            exposure: frame.exposure,
            gain: frame.gain,
        };
        agc.process_statistics(&awb, &sensor, &mut frame, &uniform_awb_statistics(&grid(), level));
        level = respond(&frame);
    }

    // the top quantile mean of a uniform frame is its level plus half a bin
    assert!((120..=135).contains(&level), "settled at {}", level);
    assert!((frame.gain - 1.0).abs() < 1e-6);
    assert_eq!(agc.frame_count(), 40);
}

#[test]
fn test_black_frame_requests_maximum_exposure() {
    let (mut agc, mut frame) = configured_agc();
    let sensor = SensorFrameContext {
        exposure: frame.exposure,
        gain: frame.gain,
    };
    agc.process_statistics(
        &AwbFrameContext::default(),
        &sensor,
        &mut frame,
        &uniform_awb_statistics(&grid(), 0),
    );

    // 60ms shutter ceiling at the 8x gain ceiling
    assert_eq!(agc.current_exposure(), Duration::from_millis(480));
    assert_eq!(frame.exposure, 6000);
    assert!((frame.gain - 8.0).abs() < 1e-9);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// INVARIANT: a larger green white balance gain never lowers the luminance estimate
    #[test]
    fn luminance_non_decreasing_in_green_gain(
        level in 0u8..=255,
        gain in 0.0f64..16.0,
        green_a in 0.0f64..4.0,
        green_b in 0.0f64..4.0,
    ) {
        let (agc, _) = configured_agc();
        let stats = uniform_awb_statistics(&grid(), level);
        let (low, high) = if green_a <= green_b { (green_a, green_b) } else { (green_b, green_a) };

        let y_low = agc.estimate_luminance(&awb_with_green(low), &stats, gain);
        let y_high = agc.estimate_luminance(&awb_with_green(high), &stats, gain);
        prop_assert!(y_low <= y_high);
    }

    /// INVARIANT: shutter and gain stay in range, shutter is lengthened first
    #[test]
    fn split_is_shutter_first(exposure_us in 0u64..2_000_000) {
        let (agc, _) = configured_agc();
        let exposure = Duration::from_micros(exposure_us);
        let (shutter, gain) = agc.split_exposure(exposure);
        let (min_shutter, max_shutter) = agc.shutter_limits();
        let (min_gain, max_gain) = agc.gain_limits();

        prop_assert!(shutter >= min_shutter && shutter <= max_shutter);
        prop_assert!(gain >= min_gain && gain <= max_gain);

        if exposure > min_shutter && exposure < max_shutter {
            prop_assert!((shutter.as_secs_f64() - exposure.as_secs_f64()).abs() < 1e-8);
            prop_assert!((gain - min_gain).abs() < 1e-6);
        }
        if exposure > max_shutter + Duration::from_micros(1) {
            prop_assert_eq!(shutter, max_shutter);
        }
    }

    /// INVARIANT: a larger target never shortens the shutter, and gain only
    /// rises above its minimum once the shutter is at its maximum
    #[test]
    fn split_is_monotonic_between_targets(
        a_us in 0u64..2_000_000,
        b_us in 0u64..2_000_000,
    ) {
        let (agc, _) = configured_agc();
        let (low, high) = if a_us <= b_us { (a_us, b_us) } else { (b_us, a_us) };
        let (shutter_low, gain_low) = agc.split_exposure(Duration::from_micros(low));
        let (shutter_high, gain_high) = agc.split_exposure(Duration::from_micros(high));
        let (_, max_shutter) = agc.shutter_limits();
        let (min_gain, _) = agc.gain_limits();

        prop_assert!(shutter_low <= shutter_high);
        prop_assert!(gain_low <= gain_high + 1e-9);
        for (shutter, gain) in [(shutter_low, gain_low), (shutter_high, gain_high)] {
            if gain > min_gain + 1e-6 {
                prop_assert_eq!(shutter, max_shutter);
            }
        }
    }

    /// INVARIANT: the filtered exposure never exceeds max shutter x max gain
    #[test]
    fn filtered_exposure_is_bounded(
        frames in prop::collection::vec(
            (0u32..20_000, 0.0f64..16.0, 0.0f64..1e6, 0.0f64..300.0),
            1..40,
        ),
    ) {
        let (mut agc, mut frame) = configured_agc();
        for (exposure, gain, y_gain, iq_gain) in frames {
            let sensor = SensorFrameContext { exposure, gain };
            agc.compute_exposure(&sensor, &mut frame, y_gain, iq_gain);

            prop_assert!(agc.filtered_exposure() <= agc.max_total_exposure());
            prop_assert!(frame.exposure <= 6000);
            prop_assert!(frame.gain >= 1.0 && frame.gain <= 8.0);
        }
    }
}
