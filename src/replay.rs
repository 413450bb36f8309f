//! Recorded model output.
//!
//! Landmark and object detection models are not bundled with this crate. To run the pipeline
//! without them, their per-frame output can be recorded as JSON lines: one line per frame, each
//! holding an array of detections. A blank line stands for a frame without detections.
//!
//! ```text
//! [{"keypoints": [{"x": 0.51, "y": 0.88}, ...], "handedness": "right"}]
//! []
//! ```
//!
//! [`RecordedLandmarks`] and [`RecordedDetections`] replay such files through the
//! [`LandmarkProvider`] and [`ObjectDetector`] traits, one line per processed frame.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::detection::{DetectionBox, ObjectDetector};
use crate::hand::{HandDetection, LandmarkProvider};
use crate::image::Image;

/// Per-frame detections parsed from a JSON-lines file.
#[derive(Debug, Clone)]
struct Recording<T> {
    frames: Vec<Vec<T>>,
    next: usize,
}

impl<T: DeserializeOwned + Clone> Recording<T> {
    fn open(path: &Path) -> anyhow::Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open recording '{}'", path.display()))?;
        Self::from_reader(BufReader::new(file))
            .with_context(|| format!("failed to load recording '{}'", path.display()))
    }

    fn from_reader<R: BufRead>(reader: R) -> anyhow::Result<Self> {
        let mut frames = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                frames.push(Vec::new());
                continue;
            }
            let frame = serde_json::from_str(line)
                .with_context(|| format!("invalid record on line {}", i + 1))?;
            frames.push(frame);
        }
        Ok(Self { frames, next: 0 })
    }

    /// Returns the next frame's records, or an empty list once the recording has ended.
    fn next(&mut self) -> Vec<T> {
        match self.frames.get(self.next) {
            Some(frame) => {
                self.next += 1;
                frame.clone()
            }
            None => {
                if self.next == self.frames.len() {
                    log::debug!("recording ended after {} frames", self.frames.len());
                    // Only log once.
                    self.next += 1;
                }
                Vec::new()
            }
        }
    }
}

/// Replays recorded hand landmarks.
#[derive(Debug, Clone)]
pub struct RecordedLandmarks {
    recording: Recording<HandDetection>,
}

impl RecordedLandmarks {
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        Ok(Self {
            recording: Recording::open(path.as_ref())?,
        })
    }

    pub fn from_reader<R: BufRead>(reader: R) -> anyhow::Result<Self> {
        Ok(Self {
            recording: Recording::from_reader(reader)?,
        })
    }

    /// Number of recorded frames.
    pub fn len(&self) -> usize {
        self.recording.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recording.frames.is_empty()
    }
}

impl LandmarkProvider for RecordedLandmarks {
    fn detect(&mut self, _: &Image) -> anyhow::Result<Vec<HandDetection>> {
        Ok(self.recording.next())
    }
}

/// Replays recorded object detections, dropping those below a confidence threshold.
#[derive(Debug, Clone)]
pub struct RecordedDetections {
    recording: Recording<DetectionBox>,
    confidence_threshold: f32,
}

impl RecordedDetections {
    pub fn open<P: AsRef<Path>>(path: P, confidence_threshold: f32) -> anyhow::Result<Self> {
        Ok(Self {
            recording: Recording::open(path.as_ref())?,
            confidence_threshold,
        })
    }

    pub fn from_reader<R: BufRead>(reader: R, confidence_threshold: f32) -> anyhow::Result<Self> {
        Ok(Self {
            recording: Recording::from_reader(reader)?,
            confidence_threshold,
        })
    }

    pub fn len(&self) -> usize {
        self.recording.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recording.frames.is_empty()
    }
}

impl ObjectDetector for RecordedDetections {
    fn detect(&mut self, _: &Image) -> anyhow::Result<Vec<DetectionBox>> {
        let mut boxes = self.recording.next();
        boxes.retain(|b| b.confidence() > self.confidence_threshold);
        Ok(boxes)
    }
}
