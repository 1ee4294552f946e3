//! Testing utilities for ipa3a
//!
//! Synthetic accelerator statistics and stream configurations for driving
//! the controllers offline, without sensor or ISP hardware.

pub mod synthetic_data;

pub use synthetic_data::{
    af_raw_buffer, awb_raw_buffer, focus_sweep_statistics, synthetic_config_info,
    uniform_awb_statistics, FocusScene,
};
