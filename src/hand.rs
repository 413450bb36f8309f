//! Hand detections and finger state classification.
//!
//! Hand landmarks are produced by an external model behind the [`LandmarkProvider`] trait. This
//! module defines what such a provider hands back ([`HandDetection`]) and how finger states are
//! derived from it ([`fingers`]).

pub mod fingers;
pub mod landmark;

use serde::{Deserialize, Serialize};

use crate::image::Image;
use crate::Error;

use self::landmark::HandLandmarks;

/// A source of hand landmarks, typically a neural network.
///
/// Implementations receive every frame the pipeline processes, in order. They may keep internal
/// state across calls (eg. to track hands between frames), but the pipeline does not rely on it.
pub trait LandmarkProvider {
    /// Detects all hands in `image`.
    ///
    /// Keypoint coordinates must be normalized to the image size.
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<HandDetection>>;
}

impl<F> LandmarkProvider for F
where
    F: FnMut(&Image) -> anyhow::Result<Vec<HandDetection>>,
{
    fn detect(&mut self, image: &Image) -> anyhow::Result<Vec<HandDetection>> {
        self(image)
    }
}

/// A single keypoint, in normalized image coordinates.
///
/// `x` and `y` are roughly in the range `0.0..=1.0`, with Y pointing down. `z` is a relative
/// depth estimate and is not used for classification.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

impl Keypoint {
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }
}

impl From<[f32; 2]> for Keypoint {
    fn from([x, y]: [f32; 2]) -> Self {
        Self::new(x, y)
    }
}

impl From<[f32; 3]> for Keypoint {
    fn from([x, y, z]: [f32; 3]) -> Self {
        Self { x, y, z }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    /// Short label used when annotating frames.
    pub fn as_str(&self) -> &'static str {
        match self {
            Handedness::Left => "L",
            Handedness::Right => "R",
        }
    }
}

/// One hand, as reported by a [`LandmarkProvider`].
///
/// A well-formed detection carries exactly [`HandDetection::NUM_LANDMARKS`] keypoints in the
/// order described by [`landmark::LandmarkIdx`]. Malformed detections can still be represented;
/// they are rejected by [`HandDetection::landmarks`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandDetection {
    keypoints: Vec<Keypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    handedness: Option<Handedness>,
}

impl HandDetection {
    pub const NUM_LANDMARKS: usize = 21;

    /// Creates a detection from its keypoints.
    pub fn new<K: Into<Vec<Keypoint>>>(keypoints: K) -> Self {
        Self {
            keypoints: keypoints.into(),
            handedness: None,
        }
    }

    /// Attaches the handedness label estimated by the provider.
    pub fn with_handedness(mut self, handedness: Handedness) -> Self {
        self.handedness = Some(handedness);
        self
    }

    #[inline]
    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    #[inline]
    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    /// Returns a view of the keypoints that can be indexed by anatomical landmark.
    ///
    /// Fails with [`Error::InvalidLandmarkSet`] unless the detection contains exactly
    /// [`HandDetection::NUM_LANDMARKS`] keypoints.
    pub fn landmarks(&self) -> Result<HandLandmarks<'_>, Error> {
        HandLandmarks::new(&self.keypoints, self.handedness)
    }
}
