use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::audio::playback::PlaybackTransport;

/// Source of monotonic time for the render loop.
pub trait TimeSource {
    /// Time since the source was created.
    fn now(&self) -> Duration;
    fn sleep(&self, dur: Duration);
}

#[derive(Clone, Copy, Debug)]
pub struct MonotonicTime {
    origin: Instant,
}

impl MonotonicTime {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTime {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, dur: Duration) {
        std::thread::sleep(dur);
    }
}

/// Virtual time: `sleep` advances the shared counter instead of blocking.
/// Clones observe the same clock.
#[derive(Clone, Debug, Default)]
pub struct ManualTime {
    now: Rc<Cell<Duration>>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, dur: Duration) {
        self.now.set(self.now.get() + dur);
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep(&self, dur: Duration) {
        self.advance(dur);
    }
}

/// Smallest whole-nanosecond interval that fits `fps` frames into a second.
pub fn frame_interval(fps: u32) -> Duration {
    Duration::from_nanos(1_000_000_000u64.div_ceil(fps.max(1) as u64))
}

/// Frame pacing, elapsed-time accounting and the analysis read head.
///
/// The read head advances by a whole chunk per analyzed window and is not
/// tied to the playback device position.
pub struct PlaybackClock<T: TimeSource, P: PlaybackTransport> {
    time: T,
    transport: P,
    frame_interval: Duration,
    last_tick: Duration,
    elapsed: f64,
    stream_position: usize,
}

impl<T: TimeSource, P: PlaybackTransport> PlaybackClock<T, P> {
    pub fn new(time: T, transport: P, fps: u32) -> Self {
        let last_tick = time.now();
        Self {
            time,
            transport,
            frame_interval: frame_interval(fps),
            last_tick,
            elapsed: 0.0,
            stream_position: 0,
        }
    }

    /// Start audio playback and reset the tick reference.
    pub fn start(&mut self) -> anyhow::Result<()> {
        self.transport.start()?;
        self.last_tick = self.time.now();
        self.elapsed = 0.0;
        self.stream_position = 0;
        Ok(())
    }

    /// Seconds since the previous tick.
    pub fn tick(&mut self) -> f64 {
        let now = self.time.now();
        let delta = now.saturating_sub(self.last_tick).as_secs_f64();
        self.last_tick = now;
        self.elapsed += delta;
        delta
    }

    pub fn elapsed_total(&self) -> f64 {
        self.elapsed
    }

    pub fn is_audio_playing(&self) -> bool {
        self.transport.is_playing()
    }

    pub fn audio_stream_position(&self) -> usize {
        self.stream_position
    }

    /// Move the read head past a successfully analyzed window.
    pub fn advance_stream(&mut self, samples: usize) {
        self.stream_position += samples;
    }

    /// Sleep until one frame interval has passed since the last tick.
    pub fn pace(&self) {
        let deadline = self.last_tick + self.frame_interval;
        let now = self.time.now();
        if now < deadline {
            self.time.sleep(deadline - now);
        }
    }

    pub fn stop(&mut self) {
        self.transport.stop();
    }

    pub fn transport(&self) -> &P {
        &self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::TimedTransport;

    fn clock(time: &ManualTime, secs: f64, fps: u32) -> PlaybackClock<ManualTime, TimedTransport<ManualTime>> {
        let transport = TimedTransport::new(time.clone(), Duration::from_secs_f64(secs));
        PlaybackClock::new(time.clone(), transport, fps)
    }

    #[test]
    fn tick_measures_time_since_previous_tick() {
        let time = ManualTime::new();
        let mut clock = clock(&time, 10.0, 30);
        clock.start().unwrap();

        time.advance(Duration::from_millis(40));
        approx::assert_relative_eq!(clock.tick(), 0.040, epsilon = 1e-9);
        time.advance(Duration::from_millis(10));
        approx::assert_relative_eq!(clock.tick(), 0.010, epsilon = 1e-9);
        approx::assert_relative_eq!(clock.elapsed_total(), 0.050, epsilon = 1e-9);
    }

    #[test]
    fn pace_sleeps_only_the_remaining_interval() {
        let time = ManualTime::new();
        let mut clock = clock(&time, 10.0, 25);
        clock.start().unwrap();

        time.advance(Duration::from_millis(15));
        clock.tick();
        clock.pace();
        assert_eq!(time.now(), Duration::from_millis(55));

        // An overrun frame is not padded further.
        time.advance(Duration::from_millis(100));
        clock.tick();
        time.advance(Duration::from_millis(60));
        clock.pace();
        assert_eq!(time.now(), Duration::from_millis(215));
    }

    #[test]
    fn stream_position_moves_only_when_advanced() {
        let time = ManualTime::new();
        let mut clock = clock(&time, 1.0, 30);
        clock.start().unwrap();
        assert_eq!(clock.audio_stream_position(), 0);
        clock.tick();
        assert_eq!(clock.audio_stream_position(), 0);
        clock.advance_stream(1024);
        clock.advance_stream(1024);
        assert_eq!(clock.audio_stream_position(), 2048);
    }

    #[test]
    fn playing_state_delegates_to_transport() {
        let time = ManualTime::new();
        let mut clock = clock(&time, 1.0, 30);
        assert!(!clock.is_audio_playing());
        clock.start().unwrap();
        assert!(clock.is_audio_playing());
        time.advance(Duration::from_secs(1));
        assert!(!clock.is_audio_playing());
    }

    #[test]
    fn frame_interval_rounds_up() {
        assert_eq!(frame_interval(30), Duration::from_nanos(33_333_334));
        assert_eq!(frame_interval(25), Duration::from_millis(40));
    }
}
