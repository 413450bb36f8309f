use std::result;

/// Errors produced by the finger counting pipeline.
///
/// Only [`Error::Capture`] and [`Error::SessionEnded`] end a session. The other variants are
/// absorbed by the pipeline, which degrades its output instead of stopping.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The frame source is unavailable or failed mid-stream.
    #[error("frame capture failed: {0:#}")]
    Capture(anyhow::Error),

    /// A hand detection did not contain the expected number of keypoints.
    #[error("invalid landmark set: expected {expected} keypoints, got {len}")]
    InvalidLandmarkSet { len: usize, expected: usize },

    /// The auxiliary object detector could not be initialized.
    #[error("auxiliary detector unavailable: {0:#}")]
    AuxiliaryDetectorUnavailable(anyhow::Error),

    /// The session has already stopped and cannot be started again.
    #[error("session has ended")]
    SessionEnded,

    /// The configuration contains an invalid value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Returns whether this error ends the capture session it occurred in.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Capture(_) | Error::SessionEnded)
    }
}

pub type Result<T, E = Error> = result::Result<T, E>;
