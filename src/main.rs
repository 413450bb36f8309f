//! `fingercount`: runs the finger counting pipeline on a webcam or a directory of images.
//!
//! Model output is replayed from JSON-lines recordings (see `fingercount::replay`).

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};

use fingercount::config::Config;
use fingercount::detection::ObjectDetector;
use fingercount::hand::fingers::ThumbRule;
use fingercount::image::Image;
use fingercount::pipeline::{FrameSink, PipelineContext, Session, StopSignal};
use fingercount::replay::{RecordedDetections, RecordedLandmarks};
use fingercount::sink::DirectorySink;
use fingercount::summary::{FrameSummary, Status};
use fingercount::video::sequence::ImageSequence;
use fingercount::video::FrameSource;
use fingercount::Error;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Configuration file (TOML).
    #[arg(long, short, env = "FINGERCOUNT_CONFIG")]
    config: Option<PathBuf>,
    /// Read frames from a directory of JPEG/PNG images instead of a webcam.
    #[arg(long, conflicts_with = "device")]
    images: Option<PathBuf>,
    /// Restart the image sequence when it ends.
    #[arg(long = "loop", requires = "images")]
    looping: bool,
    /// Name of the webcam to open.
    #[arg(long)]
    device: Option<String>,
    /// JSON-lines file with per-frame hand landmarks.
    #[arg(long)]
    landmarks: PathBuf,
    /// JSON-lines file with per-frame object detections. Enables auxiliary detection.
    #[arg(long)]
    detections: Option<PathBuf>,
    /// Enable auxiliary detection even without a detection recording.
    #[arg(long)]
    auxiliary: bool,
    /// Directory to write annotated frames and summaries to.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Only write summaries to the output directory, no frames.
    #[arg(long, requires = "output")]
    summaries_only: bool,
    /// Maximum number of hands to count per frame.
    #[arg(long)]
    max_hands: Option<usize>,
    /// How to decide whether the thumb is extended.
    #[arg(long, value_enum)]
    thumb_rule: Option<ThumbRuleArg>,
    /// Do not mirror frames before processing.
    #[arg(long)]
    no_mirror: bool,
    /// Do not draw annotations onto emitted frames.
    #[arg(long)]
    no_annotate: bool,
    /// Draw the frame rate onto emitted frames.
    #[arg(long, conflicts_with = "no_annotate")]
    show_fps: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ThumbRuleArg {
    Fixed,
    Handedness,
    PalmAxis,
}

impl From<ThumbRuleArg> for ThumbRule {
    fn from(arg: ThumbRuleArg) -> Self {
        match arg {
            ThumbRuleArg::Fixed => ThumbRule::Fixed,
            ThumbRuleArg::Handedness => ThumbRule::Handedness,
            ThumbRuleArg::PalmAxis => ThumbRule::PalmAxis,
        }
    }
}

impl Args {
    fn apply(&self, config: &mut Config) -> Result<(), Error> {
        if let Some(max_hands) = self.max_hands {
            config.pipeline.max_hands = max_hands;
        }
        if let Some(rule) = self.thumb_rule {
            config.pipeline.thumb_rule = rule.into();
        }
        if self.no_mirror {
            config.pipeline.mirror_input = false;
        }
        if self.no_annotate {
            config.pipeline.annotate = false;
        }
        if self.show_fps {
            config.pipeline.show_fps = true;
        }
        if self.detections.is_some() || self.auxiliary {
            config.auxiliary.enabled = true;
        }
        if let Some(device) = &self.device {
            config.capture.device = Some(device.clone());
        }
        config.validate()
    }
}

/// Logs a line whenever the counts change.
#[derive(Default)]
struct LogSink {
    last: Option<(u32, u32, u32)>,
}

impl FrameSink for LogSink {
    fn emit(&mut self, _: &Image, summary: &FrameSummary) {
        let counts = (
            summary.total_fingers(),
            summary.hand_count(),
            summary.person_count(),
        );
        if self.last == Some(counts) {
            return;
        }
        self.last = Some(counts);
        match summary.status() {
            Status::HandsDetected => log::info!(
                "{} fingers on {} hand(s): {}",
                counts.0,
                counts.1,
                summary
                    .hands()
                    .iter()
                    .map(|h| h.fingers().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            status => log::info!("{status}"),
        }
    }

    fn degraded(&mut self, reason: &Error) {
        log::warn!("{reason}");
    }
}

/// Forwards every frame to all inner sinks.
struct Tee(Vec<Box<dyn FrameSink>>);

impl FrameSink for Tee {
    fn emit(&mut self, frame: &Image, summary: &FrameSummary) {
        for sink in &mut self.0 {
            sink.emit(frame, summary);
        }
    }

    fn degraded(&mut self, reason: &Error) {
        for sink in &mut self.0 {
            sink.degraded(reason);
        }
    }
}

fn open_source(args: &Args, config: &Config) -> anyhow::Result<Box<dyn FrameSource>> {
    if let Some(dir) = &args.images {
        return Ok(Box::new(ImageSequence::open(dir)?.looping(args.looping)));
    }

    #[cfg(target_os = "linux")]
    {
        use fingercount::video::webcam::{Webcam, WebcamOptions};
        Ok(Box::new(Webcam::open(WebcamOptions::from(&config.capture))?))
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = config;
        bail!("webcam capture is only supported on Linux; use --images")
    }
}

fn main() -> anyhow::Result<()> {
    fingercount::init_logger!();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;
    args.apply(&mut config)?;
    log::debug!("{config:?}");

    let landmarks = RecordedLandmarks::open(&args.landmarks)?;
    log::info!("replaying {} frames of hand landmarks", landmarks.len());

    let threshold = config.auxiliary.confidence_threshold;
    let detections = args.detections.clone();
    let context = PipelineContext::from_config(&config, landmarks, move || {
        let Some(path) = detections else {
            bail!("no object detector available (pass --detections)");
        };
        let detector = RecordedDetections::open(path, threshold)?;
        Ok(Box::new(detector) as Box<dyn ObjectDetector>)
    });

    let source = open_source(&args, &config).context("failed to open frame source")?;

    let mut sinks: Vec<Box<dyn FrameSink>> = vec![Box::new(LogSink::default())];
    if let Some(dir) = &args.output {
        let sink = DirectorySink::create(dir)?.save_frames(!args.summaries_only);
        log::info!("writing output to '{}'", dir.display());
        sinks.push(Box::new(sink));
    }
    let mut sink = Tee(sinks);

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        log::info!("interrupted, stopping after the current frame");
        handler_stop.stop();
    })
    .context("failed to set Ctrl-C handler")?;

    let mut session = Session::new(context, source).with_stop_signal(stop);
    match session.run(&mut sink) {
        Ok(frames) => {
            log::info!("processed {frames} frames");
            Ok(())
        }
        // A finite image sequence ending is the normal way for offline runs to finish.
        Err(Error::Capture(e)) if args.images.is_some() && !args.looping => {
            log::info!(
                "processed {} frames ({e:#})",
                session.frames_processed()
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn config_path_from_env() {
        let command = Args::command();
        let config = command
            .get_arguments()
            .find(|arg| arg.get_id().as_str() == "config")
            .unwrap();
        assert_eq!(config.get_env(), Some(OsStr::new("FINGERCOUNT_CONFIG")));
    }

    #[test]
    fn flags_override_config() {
        let args = Args::try_parse_from([
            "fingercount",
            "--landmarks",
            "hands.jsonl",
            "--max-hands",
            "4",
            "--thumb-rule",
            "palm-axis",
            "--show-fps",
            "--no-mirror",
        ])
        .unwrap();
        let mut config = Config::default();
        args.apply(&mut config).unwrap();
        assert_eq!(config.pipeline.max_hands, 4);
        assert_eq!(config.pipeline.thumb_rule, ThumbRule::PalmAxis);
        assert!(config.pipeline.show_fps);
        assert!(!config.pipeline.mirror_input);
        assert!(!config.auxiliary.enabled);

        let args =
            Args::try_parse_from(["fingercount", "--landmarks", "h.jsonl", "--max-hands", "0"])
                .unwrap();
        assert!(args.apply(&mut Config::default()).is_err());
    }
}
