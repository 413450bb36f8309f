//! Finger state classification.
//!
//! A finger counts as extended when its tip lies beyond a reference joint closer to the palm:
//!
//! | Finger | Tip | Joint | Extended if |
//! |--------|-----|-------|-------------|
//! | Thumb  | 4   | 3 (IP) | depends on [`ThumbRule`] |
//! | Index  | 8   | 6 (PIP) | `tip.y < joint.y` |
//! | Middle | 12  | 10 (PIP) | `tip.y < joint.y` |
//! | Ring   | 16  | 14 (PIP) | `tip.y < joint.y` |
//! | Pinky  | 20  | 18 (PIP) | `tip.y < joint.y` |
//!
//! This is a purely geometric rule evaluated on a single frame. It assumes upright hands with the
//! palm facing the camera; no smoothing is applied.

use std::fmt;

use itertools::Itertools;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::Error;

use super::landmark::{HandLandmarks, LandmarkIdx};
use super::{HandDetection, Handedness};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Finger {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl Finger {
    pub const ALL: [Finger; 5] = [
        Finger::Thumb,
        Finger::Index,
        Finger::Middle,
        Finger::Ring,
        Finger::Pinky,
    ];

    /// The landmark at the tip of this finger.
    pub fn tip(self) -> LandmarkIdx {
        match self {
            Finger::Thumb => LandmarkIdx::ThumbTip,
            Finger::Index => LandmarkIdx::IndexFingerTip,
            Finger::Middle => LandmarkIdx::MiddleFingerTip,
            Finger::Ring => LandmarkIdx::RingFingerTip,
            Finger::Pinky => LandmarkIdx::PinkyTip,
        }
    }

    /// The joint the tip is compared against.
    pub fn joint(self) -> LandmarkIdx {
        match self {
            Finger::Thumb => LandmarkIdx::ThumbIp,
            Finger::Index => LandmarkIdx::IndexFingerPip,
            Finger::Middle => LandmarkIdx::MiddleFingerPip,
            Finger::Ring => LandmarkIdx::RingFingerPip,
            Finger::Pinky => LandmarkIdx::PinkyPip,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Finger::Thumb => "thumb",
            Finger::Index => "index",
            Finger::Middle => "middle",
            Finger::Ring => "ring",
            Finger::Pinky => "pinky",
        }
    }
}

impl fmt::Display for Finger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Extended/folded state of each finger of one hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FingerState {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
}

impl FingerState {
    /// Returns whether `finger` is extended.
    pub fn is_extended(&self, finger: Finger) -> bool {
        match finger {
            Finger::Thumb => self.thumb,
            Finger::Index => self.index,
            Finger::Middle => self.middle,
            Finger::Ring => self.ring,
            Finger::Pinky => self.pinky,
        }
    }

    fn set(&mut self, finger: Finger, extended: bool) {
        let slot = match finger {
            Finger::Thumb => &mut self.thumb,
            Finger::Index => &mut self.index,
            Finger::Middle => &mut self.middle,
            Finger::Ring => &mut self.ring,
            Finger::Pinky => &mut self.pinky,
        };
        *slot = extended;
    }

    /// Returns an iterator over the extended fingers, thumb first.
    pub fn extended(&self) -> impl Iterator<Item = Finger> + '_ {
        Finger::ALL
            .into_iter()
            .filter(|finger| self.is_extended(*finger))
    }

    /// The number of extended fingers, between 0 and 5.
    pub fn count(&self) -> u32 {
        self.extended().count() as u32
    }
}

impl fmt::Display for FingerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count() == 0 {
            f.write_str("fist")
        } else {
            write!(f, "{}", self.extended().join("+"))
        }
    }
}

/// How to decide whether the thumb is extended.
///
/// The thumb moves sideways rather than up and down, so which side counts as "extended" depends on
/// which hand it is and how that hand is oriented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ThumbRule {
    /// Extended iff `tip.x > joint.x`, regardless of handedness.
    ///
    /// Only correct for right hands facing a mirrored camera (or left hands facing an unmirrored
    /// one). Left hands in the same setup will have their thumb state inverted.
    #[default]
    Fixed,
    /// Like [`ThumbRule::Fixed`], but the comparison is inverted for hands labeled
    /// [`Handedness::Left`].
    Handedness,
    /// Compares along the palm's lateral axis (perpendicular to wrist → middle finger knuckle),
    /// oriented by handedness. Also works for hands that are not upright.
    PalmAxis,
}

/// Classifies the fingers of a hand as extended or folded.
#[derive(Debug, Clone, Copy, Default)]
pub struct FingerClassifier {
    thumb_rule: ThumbRule,
}

impl FingerClassifier {
    pub fn new(thumb_rule: ThumbRule) -> Self {
        Self { thumb_rule }
    }

    #[inline]
    pub fn thumb_rule(&self) -> ThumbRule {
        self.thumb_rule
    }

    /// Classifies all fingers of `hand`.
    ///
    /// Fails with [`Error::InvalidLandmarkSet`] if the detection does not have exactly
    /// [`HandDetection::NUM_LANDMARKS`] keypoints.
    pub fn classify(&self, hand: &HandDetection) -> Result<FingerState, Error> {
        Ok(self.classify_landmarks(&hand.landmarks()?))
    }

    /// Classifies all fingers of an already validated set of landmarks.
    pub fn classify_landmarks(&self, hand: &HandLandmarks<'_>) -> FingerState {
        let mut state = FingerState::default();
        state.set(Finger::Thumb, self.thumb_extended(hand));
        for finger in &Finger::ALL[1..] {
            let (tip, joint) = (hand[finger.tip()], hand[finger.joint()]);
            state.set(*finger, tip.y < joint.y);
        }
        state
    }

    fn thumb_extended(&self, hand: &HandLandmarks<'_>) -> bool {
        let tip = hand[Finger::Thumb.tip()];
        let joint = hand[Finger::Thumb.joint()];
        match self.thumb_rule {
            ThumbRule::Fixed => tip.x > joint.x,
            ThumbRule::Handedness => match hand.handedness() {
                Some(Handedness::Left) => tip.x < joint.x,
                Some(Handedness::Right) | None => tip.x > joint.x,
            },
            ThumbRule::PalmAxis => {
                let dir = Vector2::new(tip.x - joint.x, tip.y - joint.y);
                dir.dot(&hand.lateral_axis()) > 0.0
            }
        }
    }
}

/// Classifies `hand` using the default [`ThumbRule::Fixed`] rule.
pub fn classify(hand: &HandDetection) -> Result<FingerState, Error> {
    FingerClassifier::default().classify(hand)
}
