//! Per-frame aggregation of hand and person detections.

use std::fmt;

use serde::Serialize;

use crate::detection::{DetectionBox, FusedDetections};
use crate::hand::fingers::{FingerClassifier, FingerState};
use crate::hand::landmark::LandmarkIdx;
use crate::hand::{HandDetection, Handedness, Keypoint};

/// Default upper limit on the number of hands counted per frame.
pub const DEFAULT_MAX_HANDS: usize = 2;

/// Classification result for one hand of a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandSummary {
    fingers: FingerState,
    count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    handedness: Option<Handedness>,
    anchor: Keypoint,
}

impl HandSummary {
    #[inline]
    pub fn fingers(&self) -> FingerState {
        self.fingers
    }

    /// Number of extended fingers of this hand, between 0 and 5.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    /// Normalized position the per-hand count is displayed at (the middle finger's knuckle).
    #[inline]
    pub fn anchor(&self) -> Keypoint {
        self.anchor
    }
}

/// Everything the pipeline found in a single frame.
///
/// `hand_count` always equals the number of classified hands, and `total_fingers` the sum of
/// their counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FrameSummary {
    total_fingers: u32,
    hand_count: u32,
    hands: Vec<HandSummary>,
    skipped_hands: u32,
    auxiliary: bool,
    person_count: u32,
    persons: Vec<DetectionBox>,
}

impl FrameSummary {
    /// Total number of extended fingers across all hands.
    #[inline]
    pub fn total_fingers(&self) -> u32 {
        self.total_fingers
    }

    /// Number of hands that were classified.
    #[inline]
    pub fn hand_count(&self) -> u32 {
        self.hand_count
    }

    /// Per-hand results, in detection order.
    #[inline]
    pub fn hands(&self) -> &[HandSummary] {
        &self.hands
    }

    /// Number of hand detections that were dropped because their landmark set was malformed.
    #[inline]
    pub fn skipped_hands(&self) -> u32 {
        self.skipped_hands
    }

    /// Whether auxiliary (person) detection contributed to this summary.
    #[inline]
    pub fn auxiliary_active(&self) -> bool {
        self.auxiliary
    }

    /// Number of auxiliary detections matching the target class. Always 0 when auxiliary
    /// detection is disabled or unavailable.
    #[inline]
    pub fn person_count(&self) -> u32 {
        self.person_count
    }

    /// The auxiliary detections matching the target class.
    #[inline]
    pub fn persons(&self) -> &[DetectionBox] {
        &self.persons
    }

    /// Merges the output of detection fusion into this summary.
    pub fn set_fused(&mut self, fused: FusedDetections) {
        self.auxiliary = true;
        self.person_count = fused.count();
        self.persons = fused.into_boxes();
    }

    /// Returns the status message to present alongside this frame.
    pub fn status(&self) -> Status {
        if self.hand_count > 0 {
            Status::HandsDetected
        } else if self.person_count > 0 {
            Status::PersonDetected
        } else if self.auxiliary {
            Status::ShowYourself
        } else {
            Status::ShowHands
        }
    }
}

/// User-facing status derived from a [`FrameSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    HandsDetected,
    PersonDetected,
    ShowYourself,
    ShowHands,
}

impl Status {
    pub fn message(&self) -> &'static str {
        match self {
            Status::HandsDetected => "Hands detected!",
            Status::PersonDetected => "Person detected - show your hands!",
            Status::ShowYourself => "Show yourself to the camera",
            Status::ShowHands => "Show your hands to the camera",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Classifies every hand of a frame and sums up the results.
#[derive(Debug, Clone, Copy)]
pub struct HandAggregator {
    classifier: FingerClassifier,
    max_hands: usize,
}

impl Default for HandAggregator {
    fn default() -> Self {
        Self::new(FingerClassifier::default(), DEFAULT_MAX_HANDS)
    }
}

impl HandAggregator {
    pub fn new(classifier: FingerClassifier, max_hands: usize) -> Self {
        Self {
            classifier,
            max_hands,
        }
    }

    #[inline]
    pub fn max_hands(&self) -> usize {
        self.max_hands
    }

    /// Builds the hand part of a [`FrameSummary`].
    ///
    /// Hands are processed in detection order until `max_hands` valid hands were counted.
    /// Detections with a malformed landmark set are skipped; they neither count as hands nor use
    /// up one of the `max_hands` slots.
    pub fn aggregate(&self, hands: &[HandDetection]) -> FrameSummary {
        let mut summary = FrameSummary::default();
        for (i, hand) in hands.iter().enumerate() {
            if summary.hand_count as usize == self.max_hands {
                log::trace!(
                    "ignoring {} of {} hands (max_hands={})",
                    hands.len() - i,
                    hands.len(),
                    self.max_hands
                );
                break;
            }

            let landmarks = match hand.landmarks() {
                Ok(landmarks) => landmarks,
                Err(e) => {
                    log::debug!("skipping hand #{i}: {e}");
                    summary.skipped_hands += 1;
                    continue;
                }
            };

            let fingers = self.classifier.classify_landmarks(&landmarks);
            let count = fingers.count();
            summary.total_fingers += count;
            summary.hand_count += 1;
            summary.hands.push(HandSummary {
                fingers,
                count,
                handedness: landmarks.handedness(),
                anchor: landmarks[LandmarkIdx::MiddleFingerMcp],
            });
        }

        summary
    }
}

/// Aggregates `hands` with the default classifier and hand limit.
pub fn aggregate(hands: &[HandDetection]) -> FrameSummary {
    HandAggregator::default().aggregate(hands)
}
