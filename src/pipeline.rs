//! The frame processing loop.
//!
//! A [`PipelineContext`] owns everything needed to turn a frame into a [`FrameSummary`]: the
//! landmark provider, the auxiliary detection capability, and the settings. A [`Session`] pairs a
//! context with a [`FrameSource`] and drives it one frame at a time:
//!
//! ```text
//! acquire -> mirror -> auxiliary detection -> hand landmarks -> classify + aggregate -> annotate -> emit
//! ```
//!
//! Sessions move through [`SessionState::Idle`], [`SessionState::Running`] and
//! [`SessionState::Stopped`]. Stopping is terminal: the frame source is released and a new session
//! has to be created to capture again. A session stops when its [`StopSignal`] is raised (checked
//! before every frame), when [`Session::stop`] is called, or when the frame source fails.
//!
//! Processing is synchronous. Landmark and detection calls are not subject to a timeout, so a
//! provider that hangs blocks the session.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{Config, PipelineSettings};
use crate::detection::{Auxiliary, ObjectDetector};
use crate::hand::LandmarkProvider;
use crate::image::Image;
use crate::overlay::Overlay;
use crate::summary::{FrameSummary, HandAggregator};
use crate::timer::{FpsCounter, Timer};
use crate::video::FrameSource;
use crate::Error;

/// Receives the output of a [`Session`].
pub trait FrameSink {
    /// Called once per processed frame, with the (possibly annotated) frame and its summary.
    fn emit(&mut self, frame: &Image, summary: &FrameSummary);

    /// Called once per session if auxiliary detection was requested but is unavailable.
    fn degraded(&mut self, reason: &Error) {
        let _ = reason;
    }
}

impl<F> FrameSink for F
where
    F: FnMut(&Image, &FrameSummary),
{
    fn emit(&mut self, frame: &Image, summary: &FrameSummary) {
        self(frame, summary)
    }
}

/// A cloneable flag that asks a running [`Session`] to stop.
///
/// The session checks the flag before acquiring each frame, so the frame currently being
/// processed is always completed.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Models and settings used to process frames.
pub struct PipelineContext {
    settings: PipelineSettings,
    provider: Box<dyn LandmarkProvider>,
    auxiliary: Auxiliary,
    aggregator: HandAggregator,
    overlay: Overlay,
    fps: FpsCounter,
    t_auxiliary: Timer,
    t_landmarks: Timer,
    t_aggregate: Timer,
    t_annotate: Timer,
}

impl PipelineContext {
    pub fn new<P>(settings: PipelineSettings, provider: P, auxiliary: Auxiliary) -> Self
    where
        P: LandmarkProvider + 'static,
    {
        Self {
            aggregator: settings.aggregator(),
            overlay: Overlay::new().show_fps(settings.show_fps),
            settings,
            provider: Box::new(provider),
            auxiliary,
            fps: FpsCounter::new("pipeline"),
            t_auxiliary: Timer::new("auxiliary"),
            t_landmarks: Timer::new("landmarks"),
            t_aggregate: Timer::new("aggregate"),
            t_annotate: Timer::new("annotate"),
        }
    }

    /// Creates a context from a full configuration.
    ///
    /// `load_detector` is only called if auxiliary detection is enabled. If it fails, the context
    /// runs without auxiliary detection for its whole lifetime.
    pub fn from_config<P, F>(config: &Config, provider: P, load_detector: F) -> Self
    where
        P: LandmarkProvider + 'static,
        F: FnOnce() -> anyhow::Result<Box<dyn ObjectDetector>>,
    {
        let auxiliary = Auxiliary::resolve(
            config.auxiliary.enabled,
            config.auxiliary.fusion(),
            load_detector,
        );
        Self::new(config.pipeline.clone(), provider, auxiliary)
    }

    #[inline]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    #[inline]
    pub fn auxiliary(&self) -> &Auxiliary {
        &self.auxiliary
    }

    /// Runs every processing stage on `frame`.
    ///
    /// Returns the frame as it should be presented (mirrored and annotated according to the
    /// settings) and its summary. Failures of the landmark provider or the auxiliary detector
    /// only affect this frame's results.
    pub fn process(&mut self, frame: Image) -> (Image, FrameSummary) {
        self.process_timed(frame, &mut [])
    }

    /// Like [`PipelineContext::process`], but also reports `source_timers` (the timers of the
    /// [`FrameSource`] the frame came from) in the periodic performance log.
    pub fn process_timed(
        &mut self,
        mut frame: Image,
        source_timers: &mut [&mut Timer],
    ) -> (Image, FrameSummary) {
        if self.settings.mirror_input {
            frame.flip_horizontal_in_place();
        }

        let fused = self.t_auxiliary.time(|| self.auxiliary.run(&frame));

        let hands = match self.t_landmarks.time(|| self.provider.detect(&frame)) {
            Ok(hands) => hands,
            Err(e) => {
                log::error!("hand landmark detection failed: {e:#}");
                Vec::new()
            }
        };

        let mut summary = self.t_aggregate.time(|| self.aggregator.aggregate(&hands));
        if let Some(fused) = fused {
            summary.set_fused(fused);
        }

        if self.settings.annotate {
            let fps = self.fps.fps();
            self.t_annotate
                .time(|| self.overlay.draw(&mut frame, &summary, &hands, fps));
        }

        log::trace!(
            "fingers={} hands={} persons={} skipped={}",
            summary.total_fingers(),
            summary.hand_count(),
            summary.person_count(),
            summary.skipped_hands(),
        );

        let timers = source_timers.iter().map(|t| &**t).chain([
            &self.t_auxiliary,
            &self.t_landmarks,
            &self.t_aggregate,
            &self.t_annotate,
        ]);
        if self.fps.tick_with(timers) {
            for timer in source_timers.iter_mut() {
                timer.reset();
            }
            for timer in [
                &mut self.t_auxiliary,
                &mut self.t_landmarks,
                &mut self.t_aggregate,
                &mut self.t_annotate,
            ] {
                timer.reset();
            }
        }

        (frame, summary)
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("settings", &self.settings)
            .field("auxiliary", &self.auxiliary)
            .finish_non_exhaustive()
    }
}

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Created, but not capturing yet.
    Idle,
    /// Frames are being processed.
    Running,
    /// Capture has ended and the frame source has been released.
    Stopped,
}

/// One capture session: a frame source driven through a [`PipelineContext`].
pub struct Session<S: FrameSource> {
    context: PipelineContext,
    source: Option<S>,
    state: SessionState,
    stop: StopSignal,
    frames: u64,
    degradation_reported: bool,
}

impl<S: FrameSource> Session<S> {
    pub fn new(context: PipelineContext, source: S) -> Self {
        Self {
            context,
            source: Some(source),
            state: SessionState::Idle,
            stop: StopSignal::new(),
            frames: 0,
            degradation_reported: false,
        }
    }

    /// Makes the session observe `stop` instead of its own signal.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns a handle that can stop this session from anywhere, including other threads.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Number of frames processed so far.
    #[inline]
    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    #[inline]
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Whether the frame source is still held by the session.
    #[inline]
    pub fn holds_source(&self) -> bool {
        self.source.is_some()
    }

    /// Starts capturing.
    ///
    /// Starting a running session does nothing. A stopped session cannot be restarted and returns
    /// [`Error::SessionEnded`].
    pub fn start(&mut self) -> Result<(), Error> {
        match self.state {
            SessionState::Idle => {
                if let Some(source) = &self.source {
                    log::info!("session started on {}", source.describe());
                }
                self.state = SessionState::Running;
                Ok(())
            }
            SessionState::Running => Ok(()),
            SessionState::Stopped => Err(Error::SessionEnded),
        }
    }

    /// Stops the session and releases the frame source.
    pub fn stop(&mut self) {
        if self.state == SessionState::Stopped {
            return;
        }
        self.release();
        log::info!("session stopped after {} frames", self.frames);
    }

    fn release(&mut self) {
        self.state = SessionState::Stopped;
        if let Some(source) = self.source.take() {
            log::debug!("releasing {}", source.describe());
            drop(source);
        }
    }

    /// Processes a single frame and hands the result to `sink`.
    ///
    /// Returns `Ok(true)` if a frame was processed and `Ok(false)` if the session is not running
    /// (not started yet, or stopped via its [`StopSignal`]). A frame source failure stops the
    /// session and is returned as [`Error::Capture`]; stepping a stopped session returns
    /// [`Error::SessionEnded`].
    pub fn step<K: FrameSink + ?Sized>(&mut self, sink: &mut K) -> Result<bool, Error> {
        match self.state {
            SessionState::Idle => return Ok(false),
            SessionState::Stopped => return Err(Error::SessionEnded),
            SessionState::Running => {}
        }

        if self.stop.is_stopped() {
            self.stop();
            return Ok(false);
        }

        if !self.degradation_reported {
            self.degradation_reported = true;
            if let Some(reason) = self.context.auxiliary().degradation() {
                sink.degraded(reason);
            }
        }

        let Some(source) = &mut self.source else {
            self.release();
            return Err(Error::SessionEnded);
        };
        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                let err = Error::Capture(e);
                log::error!("{err}");
                self.release();
                return Err(err);
            }
        };

        let (frame, summary) = self.context.process_timed(frame, &mut source.timers());
        self.frames += 1;
        sink.emit(&frame, &summary);
        Ok(true)
    }

    /// Starts the session and processes frames until it stops.
    ///
    /// Returns the number of frames processed if the session was stopped via its
    /// [`StopSignal`], or the error that ended it.
    pub fn run<K: FrameSink + ?Sized>(&mut self, sink: &mut K) -> Result<u64, Error> {
        self.start()?;
        while self.step(sink)? {}
        Ok(self.frames)
    }
}

impl<S: FrameSource> Drop for Session<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::detection::{DetectionBox, Fusion};
    use crate::hand::test_hands::{hand, hand_with};
    use crate::hand::{HandDetection, Keypoint};
    use crate::summary::Status;

    type Hands = anyhow::Result<Vec<HandDetection>>;

    /// A source that yields `n` blank frames, then fails. Records when it is dropped.
    struct Frames {
        left: usize,
        dropped: Rc<Cell<bool>>,
    }

    impl Frames {
        fn new(left: usize) -> (Self, Rc<Cell<bool>>) {
            let dropped = Rc::new(Cell::new(false));
            (
                Self {
                    left,
                    dropped: dropped.clone(),
                },
                dropped,
            )
        }
    }

    impl FrameSource for Frames {
        fn next_frame(&mut self) -> anyhow::Result<Image> {
            if self.left == 0 {
                anyhow::bail!("camera unplugged");
            }
            self.left -= 1;
            Ok(Image::new(64, 48))
        }
    }

    impl Drop for Frames {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    /// A source with its own timer, counting how often the timer is asked for.
    struct Timed {
        grab: Timer,
        polled: Rc<Cell<usize>>,
    }

    impl FrameSource for Timed {
        fn next_frame(&mut self) -> anyhow::Result<Image> {
            Ok(self.grab.time(|| Image::new(8, 8)))
        }

        fn timers(&mut self) -> Vec<&mut Timer> {
            self.polled.set(self.polled.get() + 1);
            vec![&mut self.grab]
        }
    }

    fn settings() -> PipelineSettings {
        PipelineSettings {
            annotate: false,
            ..PipelineSettings::default()
        }
    }

    fn context<P: LandmarkProvider + 'static>(provider: P) -> PipelineContext {
        PipelineContext::new(settings(), provider, Auxiliary::Disabled)
    }

    #[derive(Default)]
    struct Collect {
        summaries: Vec<FrameSummary>,
        degraded: Vec<String>,
    }

    impl FrameSink for Collect {
        fn emit(&mut self, _: &Image, summary: &FrameSummary) {
            self.summaries.push(summary.clone());
        }

        fn degraded(&mut self, reason: &Error) {
            self.degraded.push(reason.to_string());
        }
    }

    #[test]
    fn lifecycle() {
        let (frames, dropped) = Frames::new(100);
        let mut session = Session::new(context(|_: &Image| -> Hands { Ok(vec![]) }), frames);
        let mut sink = Collect::default();

        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.step(&mut sink).unwrap());
        assert!(sink.summaries.is_empty());

        session.start().unwrap();
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Running);
        assert!(session.step(&mut sink).unwrap());
        assert!(session.step(&mut sink).unwrap());
        assert_eq!(session.frames_processed(), 2);

        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(dropped.get());
        assert!(!session.holds_source());
        assert!(matches!(session.start(), Err(Error::SessionEnded)));
        assert!(matches!(session.step(&mut sink), Err(Error::SessionEnded)));
        assert_eq!(sink.summaries.len(), 2);
    }

    #[test]
    fn capture_failure_ends_session() {
        let (frames, dropped) = Frames::new(3);
        let mut session = Session::new(context(|_: &Image| -> Hands { Ok(vec![]) }), frames);
        let mut sink = Collect::default();

        let err = session.run(&mut sink).unwrap_err();
        assert!(matches!(err, Error::Capture(_)));
        assert!(err.is_fatal());
        assert_eq!(sink.summaries.len(), 3);
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(dropped.get());
    }

    #[test]
    fn stop_signal_is_checked_between_frames() {
        let (frames, dropped) = Frames::new(1000);
        let mut session = Session::new(context(|_: &Image| -> Hands { Ok(vec![hand_with(1)]) }), frames);
        let stop = session.stop_signal();

        let mut emitted = 0;
        let mut sink = |_: &Image, summary: &FrameSummary| {
            assert_eq!(summary.total_fingers(), 1);
            emitted += 1;
            if emitted == 5 {
                stop.stop();
            }
        };
        let processed = session.run(&mut sink).unwrap();
        assert_eq!(processed, 5);
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(dropped.get());
    }

    #[test]
    fn dropping_releases_source() {
        let (frames, dropped) = Frames::new(10);
        let mut session = Session::new(context(|_: &Image| -> Hands { Ok(vec![]) }), frames);
        session.start().unwrap();
        drop(session);
        assert!(dropped.get());
    }

    #[test]
    fn summaries_follow_hands() {
        let script = vec![
            vec![],
            vec![hand(false, true, false, false, false)],
            vec![hand_with(3), hand_with(2)],
            vec![HandDetection::new(vec![Keypoint::default(); 20]), hand_with(4)],
        ];
        let mut frame = 0;
        let provider = move |_: &Image| -> Hands {
            let hands = script[frame].clone();
            frame += 1;
            Ok(hands)
        };
        let (frames, _) = Frames::new(4);
        let mut session = Session::new(context(provider), frames);
        let mut sink = Collect::default();
        assert!(session.run(&mut sink).is_err());

        let got = sink
            .summaries
            .iter()
            .map(|s| (s.hand_count(), s.total_fingers()))
            .collect::<Vec<_>>();
        assert_eq!(got, [(0, 0), (1, 1), (2, 5), (1, 4)]);
        assert_eq!(sink.summaries[3].skipped_hands(), 1);
        assert!(sink.summaries.iter().all(|s| s.person_count() == 0));
        assert_eq!(sink.summaries[0].status(), Status::ShowHands);
    }

    #[test]
    fn provider_errors_only_affect_their_frame() {
        let mut calls = 0;
        let provider = move |_: &Image| -> Hands {
            calls += 1;
            if calls == 2 {
                anyhow::bail!("inference failed");
            }
            Ok(vec![hand_with(5)])
        };
        let (frames, _) = Frames::new(3);
        let mut session = Session::new(context(provider), frames);
        let mut sink = Collect::default();
        assert!(matches!(session.run(&mut sink), Err(Error::Capture(_))));

        let totals = sink.summaries.iter().map(|s| s.total_fingers()).collect::<Vec<_>>();
        assert_eq!(totals, [5, 0, 5]);
    }

    #[test]
    fn unavailable_auxiliary_reported_once() {
        let auxiliary = Auxiliary::resolve(true, Fusion::default(), || {
            anyhow::bail!("model file missing")
        });
        let ctx = PipelineContext::new(
            settings(),
            |_: &Image| -> Hands { Ok(vec![hand_with(2)]) },
            auxiliary,
        );
        let (frames, _) = Frames::new(4);
        let mut session = Session::new(ctx, frames);
        let mut sink = Collect::default();
        assert!(session.run(&mut sink).is_err());

        assert_eq!(sink.degraded.len(), 1);
        assert!(sink.degraded[0].contains("model file missing"));
        assert_eq!(sink.summaries.len(), 4);
        for summary in &sink.summaries {
            assert_eq!(summary.person_count(), 0);
            assert!(!summary.auxiliary_active());
            assert_eq!(summary.total_fingers(), 2);
        }
    }

    #[test]
    fn auxiliary_detections_are_fused() {
        let detector = |_: &Image| -> anyhow::Result<Vec<DetectionBox>> {
            Ok(vec![
                DetectionBox::new([1.0, 1.0, 20.0, 40.0], "person", 0.8),
                DetectionBox::new([30.0, 2.0, 60.0, 40.0], "person", 0.6),
                DetectionBox::new([5.0, 5.0, 9.0, 9.0], "chair", 0.9),
            ])
        };
        let ctx = PipelineContext::new(
            PipelineSettings::default(),
            |_: &Image| -> Hands { Ok(vec![]) },
            Auxiliary::active(detector, Fusion::default()),
        );
        let (frames, _) = Frames::new(1);
        let mut session = Session::new(ctx, frames);
        let mut sink = Collect::default();
        assert!(session.run(&mut sink).is_err());

        let summary = &sink.summaries[0];
        assert_eq!(summary.person_count(), 2);
        assert_eq!(summary.persons().len(), 2);
        assert_eq!(summary.status(), Status::PersonDetected);
        assert!(sink.degraded.is_empty());
    }

    #[test]
    fn mirroring_happens_before_detection() {
        // Left half white, right half empty.
        let mut image = Image::new(4, 1);
        image.set(0, 0, crate::image::Color::WHITE);
        image.set(1, 0, crate::image::Color::WHITE);
        let source = crate::video::from_fn(move || Ok(image.clone()));

        let provider = |frame: &Image| -> Hands {
            assert_eq!(frame.get(3, 0), crate::image::Color::WHITE);
            assert_eq!(frame.get(0, 0), crate::image::Color::NULL);
            Ok(vec![])
        };
        let ctx = PipelineContext::new(settings(), provider, Auxiliary::Disabled);
        let mut session = Session::new(ctx, source);
        session.start().unwrap();
        let mut emitted = None;
        session
            .step(&mut |frame: &Image, _: &FrameSummary| emitted = Some(frame.clone()))
            .unwrap();
        assert_eq!(emitted.unwrap().get(3, 0), crate::image::Color::WHITE);
    }

    #[test]
    fn from_config_resolves_auxiliary_once() {
        let mut config = Config::default();
        let loads = Cell::new(0);
        let load = || -> anyhow::Result<Box<dyn ObjectDetector>> {
            loads.set(loads.get() + 1);
            anyhow::bail!("no model")
        };
        let ctx = PipelineContext::from_config(&config, |_: &Image| -> Hands { Ok(vec![]) }, load);
        assert_eq!(loads.get(), 0);
        assert!(matches!(ctx.auxiliary(), Auxiliary::Disabled));

        config.auxiliary.enabled = true;
        let load = || -> anyhow::Result<Box<dyn ObjectDetector>> {
            loads.set(loads.get() + 1);
            anyhow::bail!("no model")
        };
        let ctx = PipelineContext::from_config(&config, |_: &Image| -> Hands { Ok(vec![]) }, load);
        assert_eq!(loads.get(), 1);
        assert!(ctx.auxiliary().degradation().is_some());
    }

    #[test]
    fn source_timers_are_reported() {
        let polled = Rc::new(Cell::new(0));
        let source = Timed {
            grab: Timer::new("grab"),
            polled: polled.clone(),
        };
        let mut session = Session::new(context(|_: &Image| -> Hands { Ok(vec![]) }), source);
        session.start().unwrap();
        let mut sink = Collect::default();
        assert!(session.step(&mut sink).unwrap());
        assert!(session.step(&mut sink).unwrap());
        assert_eq!(polled.get(), 2);
    }

    #[test]
    fn source_timers_reset_after_report() {
        let mut ctx = context(|_: &Image| -> Hands { Ok(vec![]) });
        let mut grab = Timer::new("grab");
        grab.time(|| ());

        ctx.process_timed(Image::new(8, 8), &mut [&mut grab]);
        assert!(grab.average().is_some());

        // The FPS counter reports once per second.
        std::thread::sleep(std::time::Duration::from_millis(1100));
        ctx.process_timed(Image::new(8, 8), &mut [&mut grab]);
        assert_eq!(grab.average(), None);
    }

    #[test]
    fn annotated_output() {
        let mut settings = PipelineSettings::default();
        settings.mirror_input = false;
        let ctx = PipelineContext::new(
            settings,
            |_: &Image| -> Hands { Ok(vec![hand_with(5)]) },
            Auxiliary::Disabled,
        );
        let source = crate::video::from_fn(|| Ok(Image::new(160, 120)));
        let mut session = Session::new(ctx, source);
        session.start().unwrap();

        let mut annotated = false;
        session
            .step(&mut |frame: &Image, _: &FrameSummary| {
                annotated = frame.data().chunks_exact(4).any(|px| px != [0, 0, 0, 0]);
            })
            .unwrap();
        assert!(annotated);
    }
}
