use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::analysis::SpectralAnalyzer;
use crate::audio::features::SpectralFeatures;
use crate::audio::playback::PlaybackTransport;
use crate::capture::FrameSink;
use crate::playback::clock::{PlaybackClock, TimeSource};
use crate::render::{FrameRenderer, RenderParameters};
use crate::scene::fader::SceneFader;

/// Cooperative stop request, checked once per loop iteration.
#[derive(Clone, Debug, Default)]
pub struct TerminationSignal(Arc<AtomicBool>);

impl TerminationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    /// Playback reached the end of the track.
    AudioEnded,
    /// Stopped on request; the frame in flight is not captured.
    Terminated,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Finished(FinishReason),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopSummary {
    pub frames: usize,
    pub windows_analyzed: usize,
    pub elapsed: f64,
    pub reason: FinishReason,
}

/// The per-tick render loop: clock, analysis, crossfade, draw, capture.
pub struct Orchestrator<'a, R, S, T, P>
where
    R: FrameRenderer,
    S: FrameSink,
    T: TimeSource,
    P: PlaybackTransport,
{
    analyzer: SpectralAnalyzer,
    fader: SceneFader<R::Texture>,
    renderer: R,
    clock: PlaybackClock<T, P>,
    sink: S,
    track: &'a [i16],
    resolution: (u32, u32),
    termination: TerminationSignal,
    state: LoopState,
    windows_analyzed: usize,
}

impl<'a, R, S, T, P> Orchestrator<'a, R, S, T, P>
where
    R: FrameRenderer,
    S: FrameSink,
    T: TimeSource,
    P: PlaybackTransport,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        analyzer: SpectralAnalyzer,
        fader: SceneFader<R::Texture>,
        renderer: R,
        clock: PlaybackClock<T, P>,
        sink: S,
        track: &'a [i16],
        resolution: (u32, u32),
        termination: TerminationSignal,
    ) -> Self {
        Self {
            analyzer,
            fader,
            renderer,
            clock,
            sink,
            track,
            resolution,
            termination,
            state: LoopState::Idle,
            windows_analyzed: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn clock(&self) -> &PlaybackClock<T, P> {
        &self.clock
    }

    /// Idle -> Running: start playback and reset the clock.
    pub fn start(&mut self) -> Result<()> {
        if self.state != LoopState::Idle {
            anyhow::bail!("Render loop already started ({:?})", self.state);
        }
        self.clock.start().context("Failed to start audio playback")?;
        self.state = LoopState::Running;
        log::info!(
            "Render loop running: {}x{}, {} scenes, {} samples",
            self.resolution.0,
            self.resolution.1,
            self.fader.len(),
            self.track.len()
        );
        Ok(())
    }

    /// One loop iteration. Returns the finish reason once the loop ends.
    pub fn step(&mut self) -> Result<Option<FinishReason>> {
        match self.state {
            LoopState::Idle => anyhow::bail!("Render loop not started"),
            LoopState::Finished(reason) => return Ok(Some(reason)),
            LoopState::Running => {}
        }

        if self.termination.is_requested() {
            return Ok(Some(self.finish(FinishReason::Terminated)));
        }
        if !self.clock.is_audio_playing() {
            return Ok(Some(self.finish(FinishReason::AudioEnded)));
        }

        let position = self.clock.audio_stream_position();
        let features = match self.analyzer.analyze_at(self.track, position) {
            Some(features) => {
                self.clock.advance_stream(self.analyzer.chunk_size());
                self.windows_analyzed += 1;
                features
            }
            None => SpectralFeatures::default(),
        };

        let delta = self.clock.tick();
        self.fader.update(delta);

        let params = RenderParameters {
            elapsed_time: self.clock.elapsed_total(),
            resolution: self.resolution,
            bass_energy: features.bass_energy,
            kick_detected: features.kick_detected,
            fader: self.fader.state(),
        };
        if features.kick_detected {
            log::trace!("Kick at {:.3}s (bass {:.3})", params.elapsed_time, params.bass_energy);
        }

        let frame = self
            .renderer
            .render_frame(&params, &self.fader)
            .with_context(|| format!("Failed to render frame {}", self.sink.len()))?;
        self.sink
            .append(frame)
            .with_context(|| format!("Failed to capture frame {}", self.sink.len()))?;

        self.clock.pace();
        Ok(None)
    }

    /// Start, then step until the loop finishes.
    pub fn run(&mut self) -> Result<LoopSummary> {
        if self.state == LoopState::Idle {
            self.start()?;
        }
        let reason = loop {
            if let Some(reason) = self.step()? {
                break reason;
            }
        };
        Ok(self.summary(reason))
    }

    pub fn summary(&self, reason: FinishReason) -> LoopSummary {
        LoopSummary {
            frames: self.sink.len(),
            windows_analyzed: self.windows_analyzed,
            elapsed: self.clock.elapsed_total(),
            reason,
        }
    }

    /// Hand back the sink once the loop is over.
    pub fn into_sink(self) -> S {
        self.sink
    }

    fn finish(&mut self, reason: FinishReason) -> FinishReason {
        self.clock.stop();
        self.state = LoopState::Finished(reason);
        match reason {
            FinishReason::AudioEnded => log::info!("Audio finished after {} frames", self.sink.len()),
            FinishReason::Terminated => log::info!("Stop requested after {} frames", self.sink.len()),
        }
        reason
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::analysis::AnalyzerConfig;
    use crate::audio::playback::TimedTransport;
    use crate::capture::{Frame, MemoryFrameSink};
    use crate::playback::clock::ManualTime;
    use crate::scene::fader::DEFAULT_FADE_RATE;
    use std::time::Duration;

    /// Encodes the frame index and scene pair into a 1x1 pixel; optionally
    /// raises the termination signal after a number of frames.
    pub(crate) struct StubRenderer {
        pub rendered: Vec<RenderParameters>,
        pub stop_after: Option<(usize, TerminationSignal)>,
        pub work: Option<(ManualTime, Duration)>,
    }

    impl StubRenderer {
        pub fn new() -> Self {
            Self {
                rendered: Vec::new(),
                stop_after: None,
                work: None,
            }
        }
    }

    impl FrameRenderer for StubRenderer {
        type Texture = u8;

        fn render_frame(&mut self, params: &RenderParameters, scenes: &SceneFader<u8>) -> Result<Frame> {
            if let Some((ref time, cost)) = self.work {
                time.advance(cost);
            }
            let index = self.rendered.len() as u8;
            self.rendered.push(*params);
            if let Some((after, ref signal)) = self.stop_after {
                if self.rendered.len() == after {
                    signal.request();
                }
            }
            Frame::new(1, 1, vec![index, *scenes.current_texture(), *scenes.next_texture()])
        }
    }

    type TestLoop<'a> = Orchestrator<'a, StubRenderer, MemoryFrameSink, ManualTime, TimedTransport<ManualTime>>;

    fn build<'a>(
        track: &'a [i16],
        time: &ManualTime,
        secs: f64,
        fps: u32,
        renderer: StubRenderer,
        termination: TerminationSignal,
    ) -> TestLoop<'a> {
        let transport = TimedTransport::new(time.clone(), Duration::from_secs_f64(secs));
        let clock = PlaybackClock::new(time.clone(), transport, fps);
        let fader = SceneFader::new(vec![10u8, 11, 12], DEFAULT_FADE_RATE).unwrap();
        Orchestrator::new(
            SpectralAnalyzer::new(AnalyzerConfig::default()).unwrap(),
            fader,
            renderer,
            clock,
            MemoryFrameSink::new(),
            track,
            (1, 1),
            termination,
        )
    }

    #[test]
    fn frame_count_matches_completed_iterations() {
        let time = ManualTime::new();
        let track = vec![0i16; 44_100];
        let mut lp = build(&track, &time, 1.0, 30, StubRenderer::new(), TerminationSignal::new());
        lp.start().unwrap();
        assert_eq!(lp.state(), LoopState::Running);

        for m in 1..=10 {
            assert_eq!(lp.step().unwrap(), None);
            assert_eq!(lp.sink().len(), m);
        }
        let order: Vec<u8> = lp.sink().frames().iter().map(|f| f.pixels[0]).collect();
        assert_eq!(order, (0..10).collect::<Vec<u8>>());
    }

    #[test]
    fn runs_until_audio_ends() {
        let time = ManualTime::new();
        let track = vec![0i16; 88_200];
        let mut lp = build(&track, &time, 2.0, 30, StubRenderer::new(), TerminationSignal::new());
        let summary = lp.run().unwrap();

        assert_eq!(summary.reason, FinishReason::AudioEnded);
        assert_eq!(summary.frames, 60);
        assert_eq!(lp.state(), LoopState::Finished(FinishReason::AudioEnded));
        assert!(!lp.clock().is_audio_playing());
        // Further steps are no-ops.
        assert_eq!(lp.step().unwrap(), Some(FinishReason::AudioEnded));
        assert_eq!(lp.sink().len(), 60);
    }

    #[test]
    fn termination_stops_without_capturing_another_frame() {
        let time = ManualTime::new();
        let track = vec![0i16; 441_000];
        let signal = TerminationSignal::new();
        let renderer = StubRenderer {
            stop_after: Some((7, signal.clone())),
            ..StubRenderer::new()
        };
        let mut lp = build(&track, &time, 10.0, 30, renderer, signal);
        let summary = lp.run().unwrap();

        assert_eq!(summary.reason, FinishReason::Terminated);
        assert_eq!(summary.frames, 7);
        assert_eq!(lp.into_sink().len(), 7);
    }

    #[test]
    fn read_head_advances_only_on_full_windows() {
        let time = ManualTime::new();
        // Two full windows and a short tail.
        let track = vec![1000i16; 2 * 1024 + 500];
        let mut lp = build(&track, &time, 1.0, 30, StubRenderer::new(), TerminationSignal::new());
        lp.start().unwrap();
        for _ in 0..5 {
            lp.step().unwrap();
        }

        assert_eq!(lp.clock().audio_stream_position(), 2048);
        let summary = lp.summary(FinishReason::AudioEnded);
        assert_eq!(summary.windows_analyzed, 2);

        let rendered = &lp.renderer.rendered;
        assert!(rendered[0].bass_energy > 0.0);
        assert!(rendered[1].bass_energy > 0.0);
        for params in &rendered[2..] {
            assert_eq!(params.bass_energy, 0.0);
            assert!(!params.kick_detected);
        }
    }

    #[test]
    fn parameters_track_clock_and_fader() {
        let time = ManualTime::new();
        let track = vec![0i16; 1024];
        let renderer = StubRenderer {
            work: Some((time.clone(), Duration::from_millis(5))),
            ..StubRenderer::new()
        };
        let mut lp = build(&track, &time, 60.0, 25, renderer, TerminationSignal::new());
        lp.start().unwrap();
        for _ in 0..3 {
            lp.step().unwrap();
        }

        let rendered = &lp.renderer.rendered;
        // Rendering cost is absorbed by pacing: every frame is 40ms apart.
        approx::assert_abs_diff_eq!(rendered[0].elapsed_time, 0.0, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(rendered[1].elapsed_time, 0.040, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(rendered[2].elapsed_time, 0.080, epsilon = 1e-9);
        approx::assert_abs_diff_eq!(rendered[2].fader.blend, 0.080 * DEFAULT_FADE_RATE, epsilon = 1e-9);
        assert_eq!(rendered[2].resolution, (1, 1));
    }

    #[test]
    fn step_before_start_is_an_error() {
        let time = ManualTime::new();
        let track = vec![0i16; 1024];
        let mut lp = build(&track, &time, 1.0, 30, StubRenderer::new(), TerminationSignal::new());
        assert!(lp.step().is_err());
        lp.start().unwrap();
        assert!(lp.start().is_err());
    }
}
