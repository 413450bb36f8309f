//! Frame annotation.
//!
//! Draws the contents of a [`FrameSummary`] onto the frame it was computed from: auxiliary
//! detections as labeled boxes, hand skeletons with their per-hand finger count, and a block of
//! totals in the top left corner.

use crate::hand::HandDetection;
use crate::image::{draw, Color, Image};
use crate::summary::FrameSummary;

/// Position of the first info line.
const INFO_ORIGIN: (i32, i32) = (10, 30);
/// Vertical distance between info lines.
const INFO_LINE_HEIGHT: i32 = 30;
/// Offset of a hand's finger count from its anchor landmark, in pixels.
const COUNT_OFFSET: (i32, i32) = (-30, -30);
/// Distance of the FPS display from the right edge of the frame.
const FPS_INSET: i32 = 100;

const INFO_COLOR: Color = Color::BLUE;
const PERSON_COLOR: Color = Color::YELLOW;
const COUNT_COLOR: Color = Color::GREEN;

/// Annotates frames with detection results.
#[derive(Debug, Clone, Copy)]
pub struct Overlay {
    show_fps: bool,
}

impl Default for Overlay {
    fn default() -> Self {
        Self { show_fps: false }
    }
}

impl Overlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to draw the frame rate in the top right corner.
    pub fn show_fps(mut self, show_fps: bool) -> Self {
        self.show_fps = show_fps;
        self
    }

    /// Draws `summary` onto `image`.
    ///
    /// `hands` are the detections `summary` was aggregated from; only the ones that took part in
    /// aggregation get a skeleton. `fps` is drawn when enabled and known.
    pub fn draw(
        &self,
        image: &mut Image,
        summary: &FrameSummary,
        hands: &[HandDetection],
        fps: Option<f32>,
    ) {
        let res = image.resolution();
        for person in summary.persons() {
            let [x1, y1, x2, y2] = person.corners();
            let (x1, y1) = res.clamp_pixel(x1.round(), y1.round());
            let (x2, y2) = res.clamp_pixel(x2.round(), y2.round());
            draw::rect(image, x1, y1, x2, y2)
                .color(PERSON_COLOR)
                .stroke_width(2);
            let label = format!("{} {:.2}", capitalize(person.label()), person.confidence());
            draw::text(image, x1, y1.saturating_sub(10), &label)
                .color(PERSON_COLOR)
                .align_left()
                .align_bottom();
        }

        let considered = (summary.hand_count() + summary.skipped_hands()) as usize;
        for hand in hands.iter().take(considered) {
            if let Ok(landmarks) = hand.landmarks() {
                landmarks.draw(image);
            }
        }

        for hand in summary.hands() {
            let (x, y) = res.to_pixel(hand.anchor().x, hand.anchor().y);
            let count = hand.count().to_string();
            let (x, y) = (x.saturating_add(COUNT_OFFSET.0), y.saturating_add(COUNT_OFFSET.1));
            draw::text(image, x, y, &count)
                .color(COUNT_COLOR)
                .large()
                .align_left()
                .align_bottom();
        }

        let mut lines = vec![
            (format!("Fingers: {}", summary.total_fingers()), INFO_COLOR),
            (format!("Hands: {}", summary.hand_count()), INFO_COLOR),
        ];
        if summary.auxiliary_active() && summary.person_count() > 0 {
            lines.push((format!("Persons: {}", summary.person_count()), PERSON_COLOR));
        }
        let (x, mut y) = INFO_ORIGIN;
        for (line, color) in &lines {
            draw::text(image, x, y, line)
                .color(*color)
                .large()
                .align_left()
                .align_bottom();
            y += INFO_LINE_HEIGHT;
        }

        if let (true, Some(fps)) = (self.show_fps, fps) {
            let text = format!("FPS: {fps:.0}");
            let x = image.width() as i32 - FPS_INSET;
            draw::text(image, x, INFO_ORIGIN.1, &text)
                .color(COUNT_COLOR)
                .large()
                .align_left()
                .align_bottom();
        }
    }
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
