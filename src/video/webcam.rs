//! V4L2 webcam capture.
//!
//! Only `VIDEO_CAPTURE` devices that deliver JFIF JPEG or Motion JPEG frames are supported.

use std::{cmp::Reverse, env};

use anyhow::bail;
use linuxvideo::{
    format::{FrameIntervals, FrameSizes, PixFormat, PixelFormat},
    stream::ReadStream,
    BufType, CapabilityFlags, Device, Fract,
};

use crate::config::CaptureSettings;
use crate::image::{Image, Resolution};
use crate::timer::Timer;

use super::FrameSource;

/// Forces the webcam device to open when no name is configured.
pub const WEBCAM_NAME_ENV: &str = "FINGERCOUNT_WEBCAM_NAME";

/// Which webcam to open and what format to ask it for.
#[derive(Debug, Clone, Default)]
pub struct WebcamOptions {
    name: Option<String>,
    resolution: Option<Resolution>,
    fps: Option<u32>,
}

impl WebcamOptions {
    /// Only opens the device whose card name is `name`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Requests at least `resolution`. The smallest format satisfying it is picked.
    pub fn resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = Some(resolution);
        self
    }

    /// Requests at least `fps` frames per second.
    pub fn fps(mut self, fps: u32) -> Self {
        self.fps = Some(fps);
        self
    }
}

impl From<&CaptureSettings> for WebcamOptions {
    fn from(settings: &CaptureSettings) -> Self {
        let options = WebcamOptions::default()
            .resolution(Resolution::new(settings.width, settings.height))
            .fps(settings.fps);
        match &settings.device {
            Some(name) => options.name(name.clone()),
            None => options,
        }
    }
}

#[derive(Clone, Copy)]
struct FrameFormat {
    resolution: Resolution,
    interval: Fract,
}

impl FrameFormat {
    fn fps(&self) -> u32 {
        (1.0 / self.interval.as_f32()).round() as u32
    }
}

fn negotiate_format(device: &Device, options: &WebcamOptions) -> anyhow::Result<(PixFormat, Fract)> {
    let mut pixel_format = None;
    for format in device.formats(BufType::VIDEO_CAPTURE) {
        let format = format?;
        if matches!(format.pixel_format(), PixelFormat::JPEG | PixelFormat::MJPG) {
            pixel_format = Some(format.pixel_format());
            break;
        }
    }
    let Some(pixel_format) = pixel_format else {
        bail!("device does not support JPEG or MJPG capture");
    };

    let mut formats = Vec::new();
    let FrameSizes::Discrete(sizes) = device.frame_sizes(pixel_format)? else {
        bail!("stepwise or continuous resolutions are not supported");
    };
    for size in sizes {
        let FrameIntervals::Discrete(intervals) =
            device.frame_intervals(pixel_format, size.width(), size.height())?
        else {
            bail!("stepwise or continuous frame rates are not supported");
        };
        for rate in intervals {
            formats.push(FrameFormat {
                resolution: Resolution::new(size.width(), size.height()),
                interval: *rate.fract(),
            });
        }
    }

    // Relax the frame rate first, then the resolution.
    let attempts = [
        (options.resolution, options.fps),
        (options.resolution, None),
        (None, None),
    ];
    for (resolution, fps) in attempts {
        if let Some(fmt) = pick_format(&formats, resolution, fps) {
            return Ok((
                PixFormat::new(
                    fmt.resolution.width(),
                    fmt.resolution.height(),
                    pixel_format,
                ),
                fmt.interval,
            ));
        }
        log::debug!("no format satisfies resolution={resolution:?} fps={fps:?}");
    }

    bail!("failed to negotiate a webcam format")
}

/// Picks the smallest resolution satisfying `resolution`, at the highest available frame rate.
///
/// Without a resolution requirement, the largest resolution is picked instead.
fn pick_format(
    formats: &[FrameFormat],
    resolution: Option<Resolution>,
    fps: Option<u32>,
) -> Option<FrameFormat> {
    let eligible = formats.iter().copied().filter(|fmt| {
        resolution.map_or(true, |res| {
            fmt.resolution.width() >= res.width() && fmt.resolution.height() >= res.height()
        }) && fps.map_or(true, |fps| fmt.fps() >= fps)
    });

    match resolution {
        Some(_) => eligible.min_by_key(|fmt| (fmt.resolution.num_pixels(), Reverse(fmt.fps()))),
        None => eligible.max_by_key(|fmt| (fmt.resolution.num_pixels(), fmt.fps())),
    }
}

/// A V4L2 webcam.
pub struct Webcam {
    name: String,
    stream: ReadStream,
    resolution: Resolution,
    t_dequeue: Timer,
    t_decode: Timer,
}

impl Webcam {
    /// Opens the first webcam matching `options`.
    ///
    /// If `options` does not name a device, `FINGERCOUNT_WEBCAM_NAME` is consulted. This can
    /// block for hundreds of milliseconds while the device initializes.
    pub fn open(options: WebcamOptions) -> anyhow::Result<Self> {
        let mut options = options;
        if options.name.is_none() {
            if let Ok(name) = env::var(WEBCAM_NAME_ENV) {
                log::debug!("webcam override: `{WEBCAM_NAME_ENV}` is set to '{name}'");
                options.name = Some(name);
            }
        }

        for res in linuxvideo::list()? {
            match res {
                Ok(dev) => match Self::open_device(dev, &options) {
                    Ok(Some(webcam)) => return Ok(webcam),
                    Ok(None) => {}
                    Err(e) => log::debug!("{e:#}"),
                },
                Err(e) => log::warn!("{e}"),
            }
        }

        match &options.name {
            Some(name) => bail!("no supported webcam named '{name}' found"),
            None => bail!("no supported webcam device found"),
        }
    }

    fn open_device(dev: Device, options: &WebcamOptions) -> anyhow::Result<Option<Self>> {
        let caps = dev.capabilities()?;
        if let Some(name) = &options.name {
            if caps.card() != name.as_str() {
                return Ok(None);
            }
        }

        let flags = caps.device_capabilities();
        let path = dev.path()?;
        log::debug!(
            "device {} ({}) capabilities: {:?}",
            caps.card(),
            path.display(),
            flags,
        );
        if !flags.contains(CapabilityFlags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let (pixfmt, interval) = negotiate_format(&dev, options)?;
        let capture = dev.video_capture(pixfmt)?;
        let format = capture.format();
        let resolution = Resolution::new(format.width(), format.height());
        let actual = capture.set_frame_interval(interval)?;

        log::info!(
            "opened {} ({}), {} @ {:.1}Hz",
            caps.card(),
            path.display(),
            resolution,
            1.0 / actual.as_f32(),
        );

        Ok(Some(Self {
            name: caps.card().to_string(),
            stream: capture.into_stream()?,
            resolution,
            t_dequeue: Timer::new("dequeue"),
            t_decode: Timer::new("decode"),
        }))
    }

    #[inline]
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// Blocks until the next frame is captured and decodes it.
    ///
    /// Frames that fail to decode are replaced with a blank image of the same size. USB cameras
    /// occasionally deliver corrupted MJPG data, and skipping those frames would stall the stream.
    pub fn read(&mut self) -> anyhow::Result<Image> {
        let dequeue_guard = self.t_dequeue.start();
        let resolution = self.resolution;
        let t_decode = &mut self.t_decode;
        let image = self.stream.dequeue(|buf| {
            drop(dequeue_guard);
            let image = match t_decode.time(|| Image::decode_jpeg(&buf)) {
                Ok(image) => image,
                Err(e) => {
                    log::error!("webcam decode error: {e:#}");
                    Image::new(resolution.width(), resolution.height())
                }
            };
            Ok(image)
        })?;
        Ok(image)
    }
}

impl FrameSource for Webcam {
    fn next_frame(&mut self) -> anyhow::Result<Image> {
        self.read()
    }

    fn describe(&self) -> String {
        format!("webcam '{}' ({})", self.name, self.resolution)
    }

    fn timers(&mut self) -> Vec<&mut Timer> {
        vec![&mut self.t_dequeue, &mut self.t_decode]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fmt(w: u32, h: u32, fps: u32) -> FrameFormat {
        FrameFormat {
            resolution: Resolution::new(w, h),
            interval: Fract::new(1, fps),
        }
    }

    fn formats() -> Vec<FrameFormat> {
        vec![
            fmt(1920, 1080, 5),
            fmt(1280, 720, 10),
            fmt(640, 480, 15),
            fmt(640, 480, 30),
            fmt(320, 240, 60),
        ]
    }

    #[test]
    fn picks_smallest_satisfying_format() {
        let f = pick_format(&formats(), Some(Resolution::RES_VGA), Some(30)).unwrap();
        assert_eq!(f.resolution, Resolution::RES_VGA);
        assert_eq!(f.fps(), 30);

        let f = pick_format(&formats(), Some(Resolution::new(800, 600)), None).unwrap();
        assert_eq!(f.resolution, Resolution::new(1280, 720));
    }

    #[test]
    fn unsatisfiable_requests() {
        assert!(pick_format(&formats(), Some(Resolution::new(1280, 720)), Some(30)).is_none());
        let f = pick_format(&formats(), None, None).unwrap();
        assert_eq!(f.resolution, Resolution::new(1920, 1080));
        assert!(pick_format(&[], None, None).is_none());
    }

    #[test]
    fn options_from_settings() {
        let settings = CaptureSettings {
            device: Some("Integrated Camera".into()),
            ..CaptureSettings::default()
        };
        let options = WebcamOptions::from(&settings);
        assert_eq!(options.name.as_deref(), Some("Integrated Camera"));
        assert_eq!(options.resolution, Some(Resolution::RES_VGA));
        assert_eq!(options.fps, Some(30));
    }
}
