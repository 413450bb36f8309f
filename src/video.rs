//! Frame sources.
//!
//! A [`FrameSource`] hands the pipeline one frame at a time. Two sources are provided: V4L2
//! webcams ([`webcam`], Linux only) and directories of still images ([`sequence`]). [`from_fn`]
//! turns a closure into a source, which is handy for tests and custom capture code.

pub mod sequence;
#[cfg(target_os = "linux")]
pub mod webcam;

use crate::image::Image;
use crate::timer::Timer;

/// A stream of video frames.
pub trait FrameSource {
    /// Blocks until the next frame is available and returns it.
    ///
    /// An error means the source is unusable (disconnected device, end of a finite stream) and
    /// ends the capture session that reads from it.
    fn next_frame(&mut self) -> anyhow::Result<Image>;

    /// Human-readable description of the source, for logging.
    fn describe(&self) -> String {
        String::from("frame source")
    }

    /// Timers measuring the work done inside the source.
    ///
    /// They are reported (and reset) together with the pipeline's own stage timers.
    fn timers(&mut self) -> Vec<&mut Timer> {
        Vec::new()
    }
}

/// Creates a [`FrameSource`] that calls `f` for every frame.
pub fn from_fn<F>(f: F) -> FromFn<F>
where
    F: FnMut() -> anyhow::Result<Image>,
{
    FromFn(f)
}

/// Frame source returned by [`from_fn`].
pub struct FromFn<F>(F);

impl<F> FrameSource for FromFn<F>
where
    F: FnMut() -> anyhow::Result<Image>,
{
    fn next_frame(&mut self) -> anyhow::Result<Image> {
        (self.0)()
    }

    fn describe(&self) -> String {
        String::from("closure")
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> anyhow::Result<Image> {
        (**self).next_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }

    fn timers(&mut self) -> Vec<&mut Timer> {
        (**self).timers()
    }
}
