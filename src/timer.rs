//! Performance measurement tools.

use std::{
    fmt,
    time::{Duration, Instant},
};

const MAX_DURATIONS: usize = 250;

/// A timer that can measure and average the time an operation takes.
///
/// Displaying the timer with `{}` ([`std::fmt::Display`]) prints the number of recorded timings
/// and their average. Only the most recent timings are kept; [`Timer::reset`] clears them.
pub struct Timer {
    name: &'static str,
    durations: Vec<Duration>,
    overflowed: bool,
}

impl Timer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            durations: Vec::new(),
            overflowed: false,
        }
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Invokes a closure, measuring and recording the time it takes.
    pub fn time<T>(&mut self, timee: impl FnOnce() -> T) -> T {
        let _guard = self.start();
        timee()
    }

    /// Starts timing an operation using a drop guard.
    ///
    /// When the returned [`TimerGuard`] is dropped, the time between the call to `start` and the
    /// drop is measured and recorded.
    pub fn start(&mut self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            timer: self,
        }
    }

    /// Returns the average of the recorded durations, without resetting them.
    pub fn average(&self) -> Option<Duration> {
        if self.durations.is_empty() {
            return None;
        }
        let total: Duration = self.durations.iter().sum();
        Some(total / self.durations.len() as u32)
    }

    /// Clears all recorded durations.
    pub fn reset(&mut self) {
        self.durations.clear();
        self.overflowed = false;
    }

    fn stop(&mut self, start: Instant) {
        if self.durations.len() == MAX_DURATIONS {
            // Keep the most recent half.
            self.durations.drain(..MAX_DURATIONS / 2);
            self.overflowed = true;
        }
        self.durations.push(start.elapsed());
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let avg_ms = self
            .average()
            .map_or(0.0, |avg| avg.as_secs_f32() * 1000.0);
        let len = self.durations.len();
        let more = if self.overflowed { "+" } else { "" };
        write!(f, "{}: {len}{more}x{avg_ms:.01}ms", self.name)
    }
}

/// Guard returned by [`Timer::start`]. Stops timing the operation when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    timer: &'a mut Timer,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.timer.stop(self.start);
    }
}

/// Counts frames, keeps a smoothed FPS estimate, and logs it once per second.
pub struct FpsCounter {
    name: String,
    frames: u32,
    start: Instant,
    last_tick: Option<Instant>,
    alpha: f32,
    fps: Option<f32>,
}

impl FpsCounter {
    /// Weight of the newest frame in the smoothed FPS value.
    const DEFAULT_ALPHA: f32 = 0.1;

    pub fn new<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            frames: 0,
            start: Instant::now(),
            last_tick: None,
            alpha: Self::DEFAULT_ALPHA,
            fps: None,
        }
    }

    /// Returns the smoothed frames-per-second estimate, once at least two frames were ticked.
    #[inline]
    pub fn fps(&self) -> Option<f32> {
        self.fps
    }

    /// Advances the frame counter by 1 and logs FPS if one second has passed.
    ///
    /// Returns whether a log line was emitted.
    pub fn tick(&mut self) -> bool {
        self.tick_with(std::iter::empty::<&str>())
    }

    /// Advances the frame counter by 1 and logs FPS and `extra` data if one second has passed.
    ///
    /// Returns whether a log line was emitted.
    pub fn tick_with<D: fmt::Display, I: IntoIterator<Item = D>>(&mut self, extra: I) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_tick {
            let secs = now.duration_since(last).as_secs_f32();
            if secs > 0.0 {
                self.update(1.0 / secs);
            }
        }
        self.last_tick = Some(now);

        self.frames += 1;
        if self.start.elapsed() > Duration::from_secs(1) {
            let extra = extra
                .into_iter()
                .map(|d| d.to_string())
                .collect::<Vec<_>>();
            if extra.is_empty() {
                log::debug!("{}: {} FPS", self.name, self.frames);
            } else {
                log::debug!("{}: {} FPS ({})", self.name, self.frames, extra.join(", "));
            }

            self.frames = 0;
            self.start = now;
            true
        } else {
            false
        }
    }

    fn update(&mut self, sample: f32) {
        self.fps = Some(match self.fps {
            Some(last) => self.alpha * sample + (1.0 - self.alpha) * last,
            None => sample,
        });
    }
}
