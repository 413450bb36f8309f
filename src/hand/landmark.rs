//! Hand landmark layout and geometry.

use std::ops::Index;

use nalgebra::{Point2, Rotation2, Vector2};

use crate::image::{draw, Color, Image};
use crate::Error;

use super::{HandDetection, Handedness, Keypoint};

/// Names for the hand pose landmarks, in the order landmark providers report them.
///
/// # Terminology
///
/// - **CMC**: [Carpometacarpal joint], the lowest joint of the thumb, located near the wrist.
/// - **MCP**: [Metacarpophalangeal joint], the lower joint forming the knuckles near the palm of
///   the hand.
/// - **IP**: Interphalangeal joint of the thumb, between its MCP and tip.
/// - **PIP**: Proximal Interphalangeal joint, the joint between the MCP and DIP.
/// - **DIP**: Distal Interphalangeal joint, the highest joint of a finger.
/// - **Tip**: This landmark is just placed on the tip of the finger, above the DIP.
///
/// [Carpometacarpal joint]: https://en.wikipedia.org/wiki/Carpometacarpal_joint
/// [Metacarpophalangeal joint]: https://en.wikipedia.org/wiki/Metacarpophalangeal_joint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LandmarkIdx {
    Wrist,
    ThumbCmc,
    ThumbMcp,
    ThumbIp,
    ThumbTip,
    IndexFingerMcp,
    IndexFingerPip,
    IndexFingerDip,
    IndexFingerTip,
    MiddleFingerMcp,
    MiddleFingerPip,
    MiddleFingerDip,
    MiddleFingerTip,
    RingFingerMcp,
    RingFingerPip,
    RingFingerDip,
    RingFingerTip,
    PinkyMcp,
    PinkyPip,
    PinkyDip,
    PinkyTip,
}

const PALM_LANDMARKS: &[LandmarkIdx] = {
    use LandmarkIdx::*;
    &[
        Wrist,
        ThumbCmc,
        IndexFingerMcp,
        MiddleFingerMcp,
        RingFingerMcp,
        PinkyMcp,
    ]
};

/// Pairs of landmarks connected by a bone (or the outline of the palm).
pub const CONNECTIVITY: &[(LandmarkIdx, LandmarkIdx)] = {
    use LandmarkIdx::*;
    &[
        // Surround the palm:
        (Wrist, ThumbCmc),
        (ThumbCmc, IndexFingerMcp),
        (IndexFingerMcp, MiddleFingerMcp),
        (MiddleFingerMcp, RingFingerMcp),
        (RingFingerMcp, PinkyMcp),
        (PinkyMcp, Wrist),
        // Thumb:
        (ThumbCmc, ThumbMcp),
        (ThumbMcp, ThumbIp),
        (ThumbIp, ThumbTip),
        // Index:
        (IndexFingerMcp, IndexFingerPip),
        (IndexFingerPip, IndexFingerDip),
        (IndexFingerDip, IndexFingerTip),
        // Middle:
        (MiddleFingerMcp, MiddleFingerPip),
        (MiddleFingerPip, MiddleFingerDip),
        (MiddleFingerDip, MiddleFingerTip),
        // Ring:
        (RingFingerMcp, RingFingerPip),
        (RingFingerPip, RingFingerDip),
        (RingFingerDip, RingFingerTip),
        // Pinky:
        (PinkyMcp, PinkyPip),
        (PinkyPip, PinkyDip),
        (PinkyDip, PinkyTip),
    ]
};

/// A validated set of hand landmarks, indexable by [`LandmarkIdx`].
///
/// Obtained from [`HandDetection::landmarks`].
#[derive(Debug, Clone, Copy)]
pub struct HandLandmarks<'a> {
    keypoints: &'a [Keypoint; HandDetection::NUM_LANDMARKS],
    handedness: Option<Handedness>,
}

impl<'a> HandLandmarks<'a> {
    pub(super) fn new(
        keypoints: &'a [Keypoint],
        handedness: Option<Handedness>,
    ) -> Result<Self, Error> {
        let keypoints = keypoints
            .try_into()
            .map_err(|_| Error::InvalidLandmarkSet {
                len: keypoints.len(),
                expected: HandDetection::NUM_LANDMARKS,
            })?;
        Ok(Self {
            keypoints,
            handedness,
        })
    }

    #[inline]
    pub fn handedness(&self) -> Option<Handedness> {
        self.handedness
    }

    /// Returns an iterator over all keypoints, in [`LandmarkIdx`] order.
    pub fn iter(&self) -> impl Iterator<Item = Keypoint> + 'a {
        self.keypoints.iter().copied()
    }

    /// Returns an iterator over the landmarks that surround the palm.
    pub fn palm_landmarks(&self) -> impl Iterator<Item = Keypoint> + '_ {
        PALM_LANDMARKS.iter().map(|lm| self[*lm])
    }

    /// Computes the center position of the hand's palm by averaging some of the landmarks.
    pub fn palm_center(&self) -> Keypoint {
        let mut sum = Vector2::zeros();
        let mut count = 0;
        for lm in self.palm_landmarks() {
            sum += Vector2::new(lm.x, lm.y);
            count += 1;
        }

        let center = sum / count as f32;
        Keypoint::new(center.x, center.y)
    }

    /// Returns the direction the fingers point in, from the wrist towards the middle finger's
    /// knuckle.
    ///
    /// The result is not normalized. Its length is zero if both landmarks coincide.
    pub fn up_axis(&self) -> Vector2<f32> {
        point(self[LandmarkIdx::MiddleFingerMcp]) - point(self[LandmarkIdx::Wrist])
    }

    /// Returns the direction pointing from the palm towards the side of the thumb.
    ///
    /// Hands without handedness information are treated as right hands, which have the thumb on
    /// the +X side when upright and facing a mirrored camera.
    pub fn lateral_axis(&self) -> Vector2<f32> {
        let up = self.up_axis();
        // Rotate by 90°. With Y pointing down, this turns "up" into "right".
        let right = Vector2::new(-up.y, up.x);
        match self.handedness {
            Some(Handedness::Left) => -right,
            Some(Handedness::Right) | None => right,
        }
    }

    /// Computes the clockwise rotation of the palm compared to an upright position.
    ///
    /// A rotation of 0° means that fingers are pointed upwards.
    pub fn rotation_radians(&self) -> f32 {
        let rel = point(self[LandmarkIdx::Wrist]) - point(self[LandmarkIdx::MiddleFingerMcp]);
        Rotation2::rotation_between(&Vector2::y(), &rel).angle()
    }

    /// Draws the hand skeleton onto `target`.
    ///
    /// Keypoints are scaled to the size of `target`.
    pub fn draw(&self, target: &mut Image) {
        let res = target.resolution();
        let px = |kp: Keypoint| res.to_pixel(kp.x, kp.y);

        for (a, b) in CONNECTIVITY {
            let (ax, ay) = px(self[*a]);
            let (bx, by) = px(self[*b]);
            draw::line(target, ax, ay, bx, by)
                .color(Color::GREEN)
                .stroke_width(2);
        }
        for kp in self.iter() {
            let (x, y) = px(kp);
            draw::marker(target, x, y).color(Color::RED);
        }

        if let Some(handedness) = self.handedness {
            let (x, y) = px(self[LandmarkIdx::Wrist]);
            draw::text(target, x, y.saturating_add(4), handedness.as_str())
                .color(Color::WHITE)
                .align_top();
        }
    }
}

impl Index<LandmarkIdx> for HandLandmarks<'_> {
    type Output = Keypoint;

    #[inline]
    fn index(&self, index: LandmarkIdx) -> &Keypoint {
        &self.keypoints[index as usize]
    }
}

fn point(kp: Keypoint) -> Point2<f32> {
    Point2::new(kp.x, kp.y)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::hand::test_hands::hand_with;

    #[test]
    fn indices_match_layout() {
        assert_eq!(LandmarkIdx::Wrist as usize, 0);
        assert_eq!(LandmarkIdx::ThumbTip as usize, 4);
        assert_eq!(LandmarkIdx::IndexFingerPip as usize, 6);
        assert_eq!(LandmarkIdx::MiddleFingerMcp as usize, 9);
        assert_eq!(LandmarkIdx::RingFingerTip as usize, 16);
        assert_eq!(LandmarkIdx::PinkyTip as usize, HandDetection::NUM_LANDMARKS - 1);
        assert_eq!(CONNECTIVITY.len(), 21);
    }

    #[test]
    fn upright_hand_geometry() {
        let det = hand_with(5);
        let hand = det.landmarks().unwrap();

        assert_relative_eq!(hand.rotation_radians(), 0.0, epsilon = 1e-5);
        let up = hand.up_axis();
        assert_relative_eq!(up.x, 0.0);
        assert!(up.y < 0.0);

        let lateral = hand.lateral_axis();
        assert!(lateral.x > 0.0);
        assert_relative_eq!(lateral.y, 0.0);

        let left = det.clone().with_handedness(Handedness::Left);
        assert!(left.landmarks().unwrap().lateral_axis().x < 0.0);

        let center = hand.palm_center();
        assert!(center.x > 0.4 && center.x < 0.6);
        assert!(center.y > 0.6 && center.y < 0.9);
    }

    #[test]
    fn rotated_hand() {
        // Fingers pointing to the right (+X): rotated clockwise by 90°.
        let mut kp = vec![Keypoint::default(); HandDetection::NUM_LANDMARKS];
        kp[LandmarkIdx::Wrist as usize] = Keypoint::new(0.2, 0.5);
        kp[LandmarkIdx::MiddleFingerMcp as usize] = Keypoint::new(0.5, 0.5);
        let det = HandDetection::new(kp);
        let hand = det.landmarks().unwrap();

        assert_relative_eq!(
            hand.rotation_radians().abs(),
            std::f32::consts::FRAC_PI_2,
            epsilon = 1e-5
        );
        // Thumb side of a right hand is now facing down the image.
        let lateral = hand.lateral_axis();
        assert_relative_eq!(lateral.x, 0.0);
        assert!(lateral.y > 0.0);
    }

    #[test]
    fn draw_stays_in_bounds() {
        let mut image = Image::new(32, 24);
        let det = hand_with(3).with_handedness(Handedness::Right);
        det.landmarks().unwrap().draw(&mut image);
        assert!(image.data().chunks_exact(4).any(|px| px == [0, 255, 0, 255]));

        // Keypoints outside the frame must not panic.
        let far = HandDetection::new(vec![Keypoint::new(-3.0, 7.5); 21]);
        far.landmarks().unwrap().draw(&mut image);
    }
}
