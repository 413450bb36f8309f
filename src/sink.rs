//! Writing pipeline output to disk.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::image::Image;
use crate::pipeline::FrameSink;
use crate::summary::FrameSummary;
use crate::Error;

/// Name of the summary stream inside the output directory.
pub const SUMMARY_FILE: &str = "summaries.jsonl";

#[derive(Serialize)]
struct SummaryRecord<'a> {
    frame: u64,
    status: &'static str,
    #[serde(flatten)]
    summary: &'a FrameSummary,
}

/// Stores emitted frames as numbered PNG files and appends every summary to a JSON-lines file.
///
/// Write errors are logged and otherwise ignored, so that a full disk does not stop capture.
pub struct DirectorySink {
    dir: PathBuf,
    summaries: BufWriter<File>,
    save_frames: bool,
    frame: u64,
}

impl DirectorySink {
    /// Creates `dir` if needed and opens the summary stream in it, truncating an existing one.
    pub fn create<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;
        let path = dir.join(SUMMARY_FILE);
        let file = File::create(&path)
            .with_context(|| format!("failed to create '{}'", path.display()))?;

        Ok(Self {
            dir: dir.to_path_buf(),
            summaries: BufWriter::new(file),
            save_frames: true,
            frame: 0,
        })
    }

    /// Sets whether frames are written as images. Summaries are always written.
    pub fn save_frames(mut self, save_frames: bool) -> Self {
        self.save_frames = save_frames;
        self
    }

    /// Returns the path the image for frame number `frame` is written to.
    pub fn frame_path(&self, frame: u64) -> PathBuf {
        self.dir.join(format!("frame_{frame:06}.png"))
    }

    /// Number of frames received so far.
    pub fn frames(&self) -> u64 {
        self.frame
    }

    fn write_summary(&mut self, summary: &FrameSummary) -> anyhow::Result<()> {
        let record = SummaryRecord {
            frame: self.frame,
            status: summary.status().message(),
            summary,
        };
        serde_json::to_writer(&mut self.summaries, &record)?;
        self.summaries.write_all(b"\n")?;
        self.summaries.flush()?;
        Ok(())
    }
}

impl FrameSink for DirectorySink {
    fn emit(&mut self, frame: &Image, summary: &FrameSummary) {
        if self.save_frames {
            let path = self.frame_path(self.frame);
            if let Err(e) = frame.save(&path) {
                log::error!("failed to write '{}': {e:#}", path.display());
            }
        }
        if let Err(e) = self.write_summary(summary) {
            log::error!("failed to write frame summary: {e:#}");
        }
        self.frame += 1;
    }

    fn degraded(&mut self, reason: &Error) {
        log::warn!("output in '{}' will not contain auxiliary detections: {reason}", self.dir.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectionBox, Fusion};
    use crate::hand::test_hands::hand_with;
    use crate::summary::aggregate;

    #[test]
    fn writes_frames_and_summaries() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut sink = DirectorySink::create(&out).unwrap();

        let frame = Image::new(8, 6);
        sink.emit(&frame, &aggregate(&[hand_with(3), hand_with(1)]));
        let mut summary = aggregate(&[]);
        summary.set_fused(
            Fusion::default().fuse(&[DetectionBox::new([0.0, 0.0, 4.0, 4.0], "person", 0.75)]),
        );
        sink.emit(&frame, &summary);
        assert_eq!(sink.frames(), 2);

        let loaded = Image::load(sink.frame_path(1)).unwrap();
        assert_eq!(loaded.resolution(), frame.resolution());

        let text = fs::read_to_string(out.join(SUMMARY_FILE)).unwrap();
        let lines = text
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["frame"], 0);
        assert_eq!(lines[0]["total_fingers"], 4);
        assert_eq!(lines[0]["hand_count"], 2);
        assert_eq!(lines[0]["status"], "Hands detected!");
        assert_eq!(lines[0]["hands"][0]["count"], 3);
        assert_eq!(lines[1]["person_count"], 1);
        assert_eq!(lines[1]["persons"][0]["label"], "person");
    }

    #[test]
    fn summaries_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::create(dir.path()).unwrap().save_frames(false);
        sink.emit(&Image::new(2, 2), &aggregate(&[]));
        assert!(!sink.frame_path(0).exists());
        assert!(dir.path().join(SUMMARY_FILE).exists());
    }
}
