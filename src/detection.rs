//! Auxiliary object detection and its fusion into frame summaries.
//!
//! An optional object detector (eg. a person detector) can run alongside the hand landmark
//! provider. Its output is filtered down to a single target class by [`Fusion`] and merged into
//! the frame's [`FrameSummary`][crate::summary::FrameSummary].
//!
//! Whether the detector is usable is decided once, when the pipeline is set up (see
//! [`Auxiliary::resolve`]). A detector that fails to load disables fusion for the whole session
//! instead of failing every frame.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::image::Image;
use crate::Error;

/// Trait for object detectors that can run alongside hand landmark estimation.
///
/// Confidence thresholding is up to the implementation; every returned box is taken as-is.
pub trait ObjectDetector {
    /// Detects objects in `image`. Box coordinates are in pixels.
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<DetectionBox>>;
}

impl<F> ObjectDetector for F
where
    F: FnMut(&Image) -> anyhow::Result<Vec<DetectionBox>>,
{
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<DetectionBox>> {
        self(image)
    }
}

/// An axis-aligned bounding box with a class label and confidence score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionBox {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    label: String,
    confidence: f32,
}

impl DetectionBox {
    /// Creates a box from its `[x1, y1, x2, y2]` corners (top left and bottom right).
    pub fn new<L: Into<String>>([x1, y1, x2, y2]: [f32; 4], label: L, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            label: label.into(),
            confidence,
        }
    }

    /// Returns the `[x1, y1, x2, y2]` corners of the box.
    #[inline]
    pub fn corners(&self) -> [f32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    #[inline]
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).abs()
    }

    #[inline]
    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).abs()
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

impl fmt::Display for DetectionBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.2} [{:.0},{:.0} {:.0}x{:.0}]",
            self.label,
            self.confidence,
            self.x1,
            self.y1,
            self.width(),
            self.height()
        )
    }
}

/// Detections of the target class in one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusedDetections {
    boxes: Vec<DetectionBox>,
}

impl FusedDetections {
    #[inline]
    pub fn count(&self) -> u32 {
        self.boxes.len() as u32
    }

    #[inline]
    pub fn boxes(&self) -> &[DetectionBox] {
        &self.boxes
    }

    pub fn into_boxes(self) -> Vec<DetectionBox> {
        self.boxes
    }
}

/// Filters detector output down to a single class.
#[derive(Debug, Clone)]
pub struct Fusion {
    target_class: String,
}

impl Fusion {
    pub const DEFAULT_TARGET_CLASS: &'static str = "person";

    pub fn new<C: Into<String>>(target_class: C) -> Self {
        Self {
            target_class: target_class.into(),
        }
    }

    #[inline]
    pub fn target_class(&self) -> &str {
        &self.target_class
    }

    /// Keeps the boxes labeled with the target class, in their original order.
    ///
    /// Scores are not looked at.
    pub fn fuse(&self, boxes: &[DetectionBox]) -> FusedDetections {
        FusedDetections {
            boxes: boxes
                .iter()
                .filter(|b| b.label == self.target_class)
                .cloned()
                .collect(),
        }
    }
}

impl Default for Fusion {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TARGET_CLASS)
    }
}

/// The auxiliary detection capability of a pipeline.
pub enum Auxiliary {
    /// Auxiliary detection was not requested.
    Disabled,
    /// Auxiliary detection was requested, but the detector failed to load.
    Unavailable(Error),
    /// The detector is loaded and runs on every frame.
    Active {
        detector: Box<dyn ObjectDetector>,
        fusion: Fusion,
    },
}

impl Auxiliary {
    /// Decides once whether auxiliary detection is usable.
    ///
    /// `load` is only invoked when `enabled` is `true`. If it fails, the returned capability is
    /// [`Auxiliary::Unavailable`] and a warning is logged; no further attempt is made.
    pub fn resolve<F>(enabled: bool, fusion: Fusion, load: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<Box<dyn ObjectDetector>>,
    {
        if !enabled {
            return Auxiliary::Disabled;
        }

        match load() {
            Ok(detector) => {
                log::debug!(
                    "auxiliary detection active (target class '{}')",
                    fusion.target_class()
                );
                Auxiliary::Active { detector, fusion }
            }
            Err(e) => {
                let err = Error::AuxiliaryDetectorUnavailable(e);
                log::warn!("{err}; continuing with hand detection only");
                Auxiliary::Unavailable(err)
            }
        }
    }

    /// Creates an active capability from an already loaded detector.
    pub fn active<D: ObjectDetector + 'static>(detector: D, fusion: Fusion) -> Self {
        Auxiliary::Active {
            detector: Box::new(detector),
            fusion,
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(self, Auxiliary::Active { .. })
    }

    /// Returns the reason auxiliary detection is unavailable, if it is.
    pub fn degradation(&self) -> Option<&Error> {
        match self {
            Auxiliary::Unavailable(err) => Some(err),
            _ => None,
        }
    }

    /// Runs the detector on `image` and fuses its output.
    ///
    /// Returns `None` when auxiliary detection is disabled or unavailable. A detector that fails
    /// on a single frame yields an empty result for that frame.
    pub fn run(&mut self, image: &Image) -> Option<FusedDetections> {
        match self {
            Auxiliary::Disabled | Auxiliary::Unavailable(_) => None,
            Auxiliary::Active { detector, fusion } => match detector.detect(image) {
                Ok(boxes) => Some(fusion.fuse(&boxes)),
                Err(e) => {
                    log::warn!("auxiliary detection failed: {e:#}");
                    Some(FusedDetections::default())
                }
            },
        }
    }
}

impl fmt::Debug for Auxiliary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auxiliary::Disabled => f.write_str("Disabled"),
            Auxiliary::Unavailable(err) => f.debug_tuple("Unavailable").field(err).finish(),
            Auxiliary::Active { fusion, .. } => f
                .debug_struct("Active")
                .field("target_class", &fusion.target_class())
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boxes() -> Vec<DetectionBox> {
        vec![
            DetectionBox::new([10.0, 10.0, 50.0, 90.0], "person", 0.91),
            DetectionBox::new([5.0, 5.0, 20.0, 20.0], "cup", 0.8),
            DetectionBox::new([60.0, 15.0, 100.0, 95.0], "person", 0.12),
            DetectionBox::new([0.0, 0.0, 1.0, 1.0], "Person", 0.99),
        ]
    }

    #[test]
    fn fuse_filters_by_class_only() {
        let fused = Fusion::default().fuse(&boxes());
        assert_eq!(fused.count(), 2);
        // Low scores survive, the detector is responsible for thresholds.
        assert_eq!(fused.boxes()[1].confidence(), 0.12);
        assert!(fused.boxes().iter().all(|b| b.label() == "person"));

        let cups = Fusion::new("cup").fuse(&boxes());
        assert_eq!(cups.count(), 1);

        assert_eq!(Fusion::default().fuse(&[]).count(), 0);
    }

    #[test]
    fn disabled_never_loads() {
        let mut aux = Auxiliary::resolve(false, Fusion::default(), || {
            panic!("loader must not run when disabled")
        });
        assert!(!aux.is_active());
        assert!(aux.degradation().is_none());
        assert!(aux.run(&Image::new(4, 4)).is_none());
    }

    #[test]
    fn unavailable_detector_degrades() {
        let mut aux = Auxiliary::resolve(true, Fusion::default(), || {
            Err(anyhow::anyhow!("yolov8n.onnx not found"))
        });
        assert!(!aux.is_active());
        assert!(matches!(
            aux.degradation(),
            Some(Error::AuxiliaryDetectorUnavailable(_))
        ));
        for _ in 0..3 {
            assert!(aux.run(&Image::new(4, 4)).is_none());
        }
    }

    #[test]
    fn active_detector_runs() {
        let mut aux = Auxiliary::resolve(true, Fusion::default(), || {
            let detector = |_: &Image| -> anyhow::Result<Vec<DetectionBox>> { Ok(boxes()) };
            Ok(Box::new(detector) as Box<dyn ObjectDetector>)
        });
        assert!(aux.is_active());
        assert_eq!(aux.run(&Image::new(4, 4)).unwrap().count(), 2);
    }

    #[test]
    fn failing_frame_is_empty() {
        let mut fail = true;
        let detector = move |_: &Image| -> anyhow::Result<Vec<DetectionBox>> {
            fail = !fail;
            if !fail {
                anyhow::bail!("inference error")
            }
            Ok(boxes())
        };
        let mut aux = Auxiliary::active(detector, Fusion::default());
        assert_eq!(aux.run(&Image::new(4, 4)).unwrap().count(), 0);
        assert_eq!(aux.run(&Image::new(4, 4)).unwrap().count(), 2);
    }

    #[test]
    fn display() {
        let b = DetectionBox::new([10.0, 20.0, 50.0, 100.0], "person", 0.876);
        assert_eq!(b.to_string(), "person 0.88 [10,20 40x80]");
    }
}
