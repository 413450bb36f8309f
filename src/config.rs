//! Pipeline configuration.
//!
//! Configuration is read from a TOML file in which every key is optional:
//!
//! ```toml
//! [pipeline]
//! max_hands = 2
//! mirror_input = true
//! thumb_rule = "fixed"      # or "handedness", "palm-axis"
//! annotate = true
//! show_fps = false
//!
//! [auxiliary]
//! enabled = false
//! target_class = "person"
//! confidence_threshold = 0.5
//!
//! [capture]
//! device = "HD Webcam"      # optional
//! width = 640
//! height = 480
//! fps = 30
//! ```

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::detection::Fusion;
use crate::hand::fingers::{FingerClassifier, ThumbRule};
use crate::summary::{HandAggregator, DEFAULT_MAX_HANDS};
use crate::Error;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_FPS: u32 = 30;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    pipeline: Option<PipelineConfigFile>,
    auxiliary: Option<AuxiliaryConfigFile>,
    capture: Option<CaptureConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    max_hands: Option<usize>,
    mirror_input: Option<bool>,
    thumb_rule: Option<ThumbRule>,
    annotate: Option<bool>,
    show_fps: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct AuxiliaryConfigFile {
    enabled: Option<bool>,
    target_class: Option<String>,
    confidence_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
}

/// Complete, validated configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Config {
    pub pipeline: PipelineSettings,
    pub auxiliary: AuxiliarySettings,
    pub capture: CaptureSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Upper limit on the number of hands counted per frame.
    pub max_hands: usize,
    /// Flip frames horizontally before any processing (selfie view).
    pub mirror_input: bool,
    pub thumb_rule: ThumbRule,
    /// Draw detections and counts onto the emitted frames.
    pub annotate: bool,
    pub show_fps: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_hands: DEFAULT_MAX_HANDS,
            mirror_input: true,
            thumb_rule: ThumbRule::default(),
            annotate: true,
            show_fps: false,
        }
    }
}

impl PipelineSettings {
    /// Creates the hand aggregator described by these settings.
    pub fn aggregator(&self) -> HandAggregator {
        HandAggregator::new(FingerClassifier::new(self.thumb_rule), self.max_hands)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliarySettings {
    pub enabled: bool,
    /// Class label that counts towards `person_count`.
    pub target_class: String,
    /// Minimum score of detections reported by the auxiliary detector.
    pub confidence_threshold: f32,
}

impl Default for AuxiliarySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            target_class: Fusion::DEFAULT_TARGET_CLASS.to_string(),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl AuxiliarySettings {
    pub fn fusion(&self) -> Fusion {
        Fusion::new(self.target_class.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Name of the video device. If `None`, a device is picked automatically.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            device: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            fps: DEFAULT_FPS,
        }
    }
}

impl Config {
    /// Loads the configuration.
    ///
    /// If `path` is `None`, the defaults are returned.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => {
                log::debug!("loading configuration from '{}'", path.display());
                read_config_file(path)?
            }
            None => ConfigFile::default(),
        };

        let config = Self::from_file(file);
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let file: ConfigFile = toml::from_str(text)?;
        let config = Self::from_file(file);
        config.validate()?;
        Ok(config)
    }

    fn from_file(file: ConfigFile) -> Self {
        let defaults = Config::default();
        let pipeline = file.pipeline.unwrap_or_default();
        let auxiliary = file.auxiliary.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();

        Self {
            pipeline: PipelineSettings {
                max_hands: pipeline.max_hands.unwrap_or(defaults.pipeline.max_hands),
                mirror_input: pipeline
                    .mirror_input
                    .unwrap_or(defaults.pipeline.mirror_input),
                thumb_rule: pipeline.thumb_rule.unwrap_or(defaults.pipeline.thumb_rule),
                annotate: pipeline.annotate.unwrap_or(defaults.pipeline.annotate),
                show_fps: pipeline.show_fps.unwrap_or(defaults.pipeline.show_fps),
            },
            auxiliary: AuxiliarySettings {
                enabled: auxiliary.enabled.unwrap_or(defaults.auxiliary.enabled),
                target_class: auxiliary
                    .target_class
                    .unwrap_or(defaults.auxiliary.target_class),
                confidence_threshold: auxiliary
                    .confidence_threshold
                    .unwrap_or(defaults.auxiliary.confidence_threshold),
            },
            capture: CaptureSettings {
                device: capture.device.filter(|d| !d.trim().is_empty()),
                width: capture.width.unwrap_or(defaults.capture.width),
                height: capture.height.unwrap_or(defaults.capture.height),
                fps: capture.fps.unwrap_or(defaults.capture.fps),
            },
        }
    }

    /// Checks that all values are within their valid ranges.
    pub fn validate(&self) -> Result<(), Error> {
        if self.pipeline.max_hands == 0 {
            return Err(Error::Config("max_hands must be at least 1".into()));
        }
        if self.auxiliary.target_class.trim().is_empty() {
            return Err(Error::Config("target_class must not be empty".into()));
        }
        let threshold = self.auxiliary.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "confidence_threshold must be between 0 and 1, got {threshold}"
            )));
        }
        if self.capture.width == 0 || self.capture.height == 0 || self.capture.fps == 0 {
            return Err(Error::Config(format!(
                "capture format {}x{}@{} is invalid",
                self.capture.width, self.capture.height, self.capture.fps
            )));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> anyhow::Result<ConfigFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file '{}'", path.display()))?;
    toml::from_str(&text)
        .with_context(|| format!("failed to parse config file '{}'", path.display()))
}
