//! Real-time finger counting.
//!
//! `fingercount` turns the output of a hand landmark model into a per-frame count of extended
//! fingers, fuses in an optional person detector, and drives the whole thing from a video source
//! one frame at a time.
//!
//! The models themselves are not part of this crate. They are plugged in through the
//! [`hand::LandmarkProvider`] and [`detection::ObjectDetector`] traits, and frames come from any
//! [`video::FrameSource`]. The [`pipeline`] module ties everything together.
//!
//! # Coordinates
//!
//! Hand keypoints use normalized image coordinates: X points to the right, Y points *down*, and
//! both lie roughly in `0.0..=1.0`. Detection boxes from the auxiliary detector are in pixels.
//!
//! # Environment Variables
//!
//! * `FINGERCOUNT_CONFIG`: path of a TOML configuration file for the `fingercount` binary,
//!   used when `--config` is not passed.
//! * `FINGERCOUNT_WEBCAM_NAME`: forces the device to use for webcams opened without an explicit
//!   device name. If unset, the first device that supports a compatible image format is used.

pub mod config;
pub mod detection;
mod error;
pub mod hand;
pub mod image;
pub mod overlay;
pub mod pipeline;
pub mod replay;
pub mod sink;
pub mod summary;
pub mod timer;
pub mod video;

use log::LevelFilter;

pub use error::{Error, Result};

/// macro-use only, not part of public API.
#[doc(hidden)]
pub fn init_logger(calling_crate: &'static str) {
    let log_level = LevelFilter::Debug;
    env_logger::Builder::new()
        .filter(Some(calling_crate), log_level)
        .filter(Some(env!("CARGO_CRATE_NAME")), log_level)
        .parse_default_env()
        .try_init()
        .ok();
}

/// Initializes logging to *stderr*.
///
/// The calling crate and `fingercount` will log at *debug* level. `RUST_LOG` is honored on top of
/// that.
///
/// If a global logger is already registered, this macro will do nothing.
#[macro_export]
macro_rules! init_logger {
    () => {
        $crate::init_logger(env!("CARGO_CRATE_NAME"))
    };
}
