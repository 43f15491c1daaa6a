use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::audio::analysis::{AnalyzerConfig, SpectralAnalyzer};
use crate::audio::playback::PlaybackTransport;
use crate::encode::{VideoEncoder, VideoSpec};
use crate::orchestrator::{LoopSummary, Orchestrator, TerminationSignal};
use crate::playback::clock::{PlaybackClock, TimeSource};
use crate::render::FrameRenderer;
use crate::scene::fader::SceneFader;

/// Frames only, no audio track.
pub const SILENT_VIDEO_NAME: &str = "output_video.mp4";
/// Silent video muxed with the source audio.
pub const FINAL_VIDEO_NAME: &str = "final_output.mp4";

/// Inputs for one capture run.
pub struct CaptureRequest<'a> {
    pub audio_path: &'a Path,
    pub track: &'a [i16],
    pub output_dir: &'a Path,
    pub video: VideoSpec,
    pub analyzer: AnalyzerConfig,
    pub fade_rate: f64,
}

#[derive(Debug)]
pub struct CaptureOutcome {
    pub summary: LoopSummary,
    pub silent_path: PathBuf,
    pub final_path: PathBuf,
}

/// Removes half-written outputs unless the run commits.
struct ArtifactGuard {
    paths: Vec<PathBuf>,
    committed: bool,
}

impl ArtifactGuard {
    fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            committed: false,
        }
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => log::warn!("Removed incomplete output: {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }
    }
}

/// Render the whole track to a silent video, then mux it with the audio.
///
/// Runs the render loop until playback ends or `termination` fires; either
/// way the frames captured so far are encoded. A run that captures nothing
/// fails and leaves no output files behind.
pub fn run_capture<R, E, T, P>(
    renderer: R,
    scenes: Vec<R::Texture>,
    encoder: &mut E,
    time: T,
    transport: P,
    termination: TerminationSignal,
    request: &CaptureRequest<'_>,
) -> Result<CaptureOutcome>
where
    R: FrameRenderer,
    E: VideoEncoder,
    T: TimeSource,
    P: PlaybackTransport,
{
    request.video.validate()?;
    let fader = SceneFader::new(scenes, request.fade_rate)?;
    let analyzer = SpectralAnalyzer::new(request.analyzer.clone())?;

    std::fs::create_dir_all(request.output_dir)
        .with_context(|| format!("Failed to create output directory: {}", request.output_dir.display()))?;
    let silent_path = request.output_dir.join(SILENT_VIDEO_NAME);
    let final_path = request.output_dir.join(FINAL_VIDEO_NAME);
    let guard = ArtifactGuard::new(vec![silent_path.clone(), final_path.clone()]);

    let sink = encoder
        .open(&request.video, &silent_path)
        .context("Failed to start video encoder")?;
    let clock = PlaybackClock::new(time, transport, request.video.fps);
    let mut orchestrator = Orchestrator::new(
        analyzer,
        fader,
        renderer,
        clock,
        sink,
        request.track,
        (request.video.width, request.video.height),
        termination,
    );

    let summary = orchestrator.run()?;
    let sink = orchestrator.into_sink();
    log::info!(
        "Captured {} frames over {:.2}s ({} audio windows analyzed)",
        summary.frames,
        summary.elapsed,
        summary.windows_analyzed
    );
    if summary.frames == 0 {
        anyhow::bail!("No frames were captured; nothing to encode");
    }

    encoder.close(sink).context("Failed to finalize silent video")?;
    log::info!("Silent video written: {}", silent_path.display());

    encoder
        .mux(&silent_path, request.audio_path, &final_path)
        .context("Failed to mux audio into final video")?;
    guard.commit();

    Ok(CaptureOutcome {
        summary,
        silent_path,
        final_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::playback::TimedTransport;
    use crate::capture::{FrameSink, MemoryFrameSink};
    use crate::orchestrator::tests::StubRenderer;
    use crate::orchestrator::FinishReason;
    use crate::playback::clock::ManualTime;
    use crate::scene::fader::DEFAULT_FADE_RATE;
    use std::time::Duration;

    /// Writes the frame count into the silent file and concatenates it with
    /// the audio path for the final file.
    #[derive(Default)]
    struct FileEncoder {
        opened: Option<VideoSpec>,
        closed_frames: Option<usize>,
        fail_mux: bool,
        silent: Option<PathBuf>,
    }

    impl VideoEncoder for FileEncoder {
        type Sink = MemoryFrameSink;

        fn open(&mut self, spec: &VideoSpec, silent_path: &Path) -> Result<MemoryFrameSink> {
            self.opened = Some(*spec);
            self.silent = Some(silent_path.to_path_buf());
            std::fs::write(silent_path, b"")?;
            Ok(MemoryFrameSink::new())
        }

        fn close(&mut self, sink: MemoryFrameSink) -> Result<()> {
            self.closed_frames = Some(sink.len());
            let silent = self.silent.as_ref().unwrap();
            std::fs::write(silent, sink.len().to_string())?;
            Ok(())
        }

        fn mux(&mut self, silent_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()> {
            if self.fail_mux {
                std::fs::write(output_path, b"partial")?;
                anyhow::bail!("mux failed");
            }
            let frames = std::fs::read_to_string(silent_path)?;
            std::fs::write(output_path, format!("{}+{}", frames, audio_path.display()))?;
            Ok(())
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pulsefade-pipeline-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn request<'a>(dir: &'a Path, track: &'a [i16]) -> CaptureRequest<'a> {
        CaptureRequest {
            audio_path: Path::new("track.mp3"),
            track,
            output_dir: dir,
            video: VideoSpec {
                width: 2,
                height: 2,
                fps: 30,
            },
            analyzer: AnalyzerConfig::default(),
            fade_rate: DEFAULT_FADE_RATE,
        }
    }

    fn transport(time: &ManualTime, secs: f64) -> TimedTransport<ManualTime> {
        TimedTransport::new(time.clone(), Duration::from_secs_f64(secs))
    }

    #[test]
    fn two_second_clip_produces_sixty_frames_and_both_files() {
        let dir = temp_dir("full");
        let track = vec![500i16; 88_200];
        let time = ManualTime::new();
        let mut encoder = FileEncoder::default();

        let outcome = run_capture(
            StubRenderer::new(),
            vec![0u8, 1, 2],
            &mut encoder,
            time.clone(),
            transport(&time, 2.0),
            TerminationSignal::new(),
            &request(&dir, &track),
        )
        .unwrap();

        assert_eq!(outcome.summary.frames, 60);
        assert_eq!(outcome.summary.reason, FinishReason::AudioEnded);
        assert_eq!(encoder.closed_frames, Some(60));
        assert_eq!(outcome.silent_path, dir.join(SILENT_VIDEO_NAME));
        assert_eq!(std::fs::read_to_string(&outcome.final_path).unwrap(), "60+track.mp3");
        assert!(outcome.silent_path.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn terminated_run_still_encodes_captured_frames() {
        let dir = temp_dir("terminated");
        let track = vec![0i16; 441_000];
        let time = ManualTime::new();
        let signal = TerminationSignal::new();
        let renderer = StubRenderer {
            stop_after: Some((12, signal.clone())),
            ..StubRenderer::new()
        };
        let mut encoder = FileEncoder::default();

        let outcome = run_capture(
            renderer,
            vec![0u8, 1],
            &mut encoder,
            time.clone(),
            transport(&time, 10.0),
            signal,
            &request(&dir, &track),
        )
        .unwrap();

        assert_eq!(outcome.summary.reason, FinishReason::Terminated);
        assert_eq!(encoder.closed_frames, Some(12));
        assert!(outcome.final_path.exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn failed_mux_leaves_no_outputs() {
        let dir = temp_dir("mux-fail");
        let track = vec![0i16; 44_100];
        let time = ManualTime::new();
        let mut encoder = FileEncoder {
            fail_mux: true,
            ..FileEncoder::default()
        };

        let result = run_capture(
            StubRenderer::new(),
            vec![0u8],
            &mut encoder,
            time.clone(),
            transport(&time, 0.5),
            TerminationSignal::new(),
            &request(&dir, &track),
        );

        assert!(result.is_err());
        assert!(!dir.join(SILENT_VIDEO_NAME).exists());
        assert!(!dir.join(FINAL_VIDEO_NAME).exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn immediate_stop_is_an_error() {
        let dir = temp_dir("empty");
        let track = vec![0i16; 44_100];
        let time = ManualTime::new();
        let signal = TerminationSignal::new();
        signal.request();
        let mut encoder = FileEncoder::default();

        let err = run_capture(
            StubRenderer::new(),
            vec![0u8],
            &mut encoder,
            time.clone(),
            transport(&time, 1.0),
            signal,
            &request(&dir, &track),
        )
        .unwrap_err();

        assert!(err.to_string().contains("No frames"));
        assert_eq!(encoder.closed_frames, None);
        assert!(!dir.join(SILENT_VIDEO_NAME).exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn bad_fade_rate_or_chunk_size_never_opens_the_encoder() {
        let dir = temp_dir("bad-config");
        let track = vec![0i16; 44_100];
        let time = ManualTime::new();

        let mut bad_rate = request(&dir, &track);
        bad_rate.fade_rate = -0.5;
        let mut bad_chunk = request(&dir, &track);
        bad_chunk.analyzer.chunk_size = 0;

        for req in [bad_rate, bad_chunk] {
            let mut encoder = FileEncoder::default();
            let err = run_capture(
                StubRenderer::new(),
                vec![0u8, 1],
                &mut encoder,
                time.clone(),
                transport(&time, 1.0),
                TerminationSignal::new(),
                &req,
            )
            .unwrap_err();

            assert!(matches!(
                err.downcast_ref::<crate::error::ConfigurationError>(),
                Some(crate::error::ConfigurationError::InvalidFadeRate(_))
                    | Some(crate::error::ConfigurationError::InvalidChunkSize(0))
            ));
            assert!(encoder.opened.is_none());
        }
        assert!(!dir.exists());
    }

    #[test]
    fn empty_scene_list_is_rejected_before_encoding() {
        let dir = temp_dir("no-scenes");
        let time = ManualTime::new();
        let mut encoder = FileEncoder::default();

        let err = run_capture(
            StubRenderer::new(),
            Vec::new(),
            &mut encoder,
            time.clone(),
            transport(&time, 1.0),
            TerminationSignal::new(),
            &request(&dir, &[]),
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<crate::error::ConfigurationError>(),
            Some(crate::error::ConfigurationError::EmptySceneSequence)
        ));
        assert!(encoder.opened.is_none());
    }
}
