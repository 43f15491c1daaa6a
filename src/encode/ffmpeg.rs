use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, SyncSender};
use std::thread::JoinHandle;
use std::time::Duration;

use super::{VideoEncoder, VideoSpec};
use crate::capture::{Frame, FrameSink};

#[derive(Clone, Debug)]
pub struct EncodeSettings {
    pub codec: String,
    pub pix_fmt: String,
    pub crf: u32,
    /// Frames buffered between the render loop and ffmpeg.
    pub queue_depth: usize,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            codec: "libx264".into(),
            pix_fmt: "yuv420p".into(),
            crf: 18,
            queue_depth: 8,
        }
    }
}

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Arguments for the silent stage: raw RGB frames on stdin.
pub fn silent_args(spec: &VideoSpec, settings: &EncodeSettings, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".into(), "error".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgb24".into(),
        "-video_size".into(), format!("{}x{}", spec.width, spec.height),
        "-framerate".into(), spec.fps.to_string(),
        "-i".into(), "pipe:0".into(),
        "-an".into(),
        "-c:v".into(), settings.codec.clone(),
        "-pix_fmt".into(), settings.pix_fmt.clone(),
        "-crf".into(), settings.crf.to_string(),
        "-preset".into(), "medium".into(),
        output.to_string_lossy().into_owned(),
    ]
}

/// Arguments for the mux stage: copy the video stream, encode the audio.
pub fn mux_args(silent: &Path, audio: &Path, output: &Path) -> Vec<String> {
    vec![
        "-y".to_string(),
        "-loglevel".into(), "error".into(),
        "-i".into(), silent.to_string_lossy().into_owned(),
        "-i".into(), audio.to_string_lossy().into_owned(),
        "-map".into(), "0:v:0".into(),
        "-map".into(), "1:a:0".into(),
        "-c:v".into(), "copy".into(),
        "-c:a".into(), "aac".into(),
        "-b:a".into(), "192k".into(),
        "-shortest".into(),
        output.to_string_lossy().into_owned(),
    ]
}

pub struct FfmpegEncoder {
    settings: EncodeSettings,
}

impl FfmpegEncoder {
    pub fn new(settings: EncodeSettings) -> Result<Self> {
        if !is_ffmpeg_on_path() {
            anyhow::bail!("ffmpeg is required for encoding, but was not found on PATH");
        }
        Ok(Self { settings })
    }
}

impl VideoEncoder for FfmpegEncoder {
    type Sink = StreamingFrameSink;

    fn open(&mut self, spec: &VideoSpec, silent_path: &Path) -> Result<StreamingFrameSink> {
        spec.validate()?;
        StreamingFrameSink::spawn(*spec, &self.settings, silent_path)
    }

    fn close(&mut self, sink: StreamingFrameSink) -> Result<()> {
        let frames = sink.len();
        sink.finish()?;
        log::info!("Silent video complete: {} frames", frames);
        Ok(())
    }

    fn mux(&mut self, silent_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner} {msg} [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("Muxing audio into {}", output_path.display()));
        spinner.enable_steady_tick(Duration::from_millis(120));

        let output = Command::new("ffmpeg")
            .args(mux_args(silent_path, audio_path, output_path))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;
        spinner.finish_and_clear();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("FFmpeg mux exited with error:\n{}", stderr);
        }

        log::info!("Muxed output: {}", output_path.display());
        Ok(())
    }
}

/// Streams frames to an ffmpeg process through a bounded queue. A writer
/// thread owns ffmpeg's stdin so the render loop never blocks on the pipe
/// unless the queue is full.
pub struct StreamingFrameSink {
    spec: VideoSpec,
    sender: Option<SyncSender<Frame>>,
    writer: Option<JoinHandle<Result<()>>>,
    count: usize,
}

impl StreamingFrameSink {
    fn spawn(spec: VideoSpec, settings: &EncodeSettings, output: &Path) -> Result<Self> {
        let mut child = Command::new("ffmpeg")
            .args(silent_args(&spec, settings, output))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}",
            spec.width,
            spec.height,
            spec.fps,
            settings.codec
        );

        let mut stdin = child.stdin.take().context("FFmpeg stdin not available")?;
        let (sender, receiver) = mpsc::sync_channel::<Frame>(settings.queue_depth.max(1));

        let writer = std::thread::Builder::new()
            .name("ffmpeg-writer".into())
            .spawn(move || -> Result<()> {
                let mut write_result = Ok(());
                for frame in receiver {
                    if let Err(e) = stdin.write_all(&frame.pixels) {
                        write_result = Err(e);
                        break;
                    }
                }
                // Close stdin to signal EOF
                drop(stdin);

                let output = child.wait_with_output().context("Failed to wait for ffmpeg")?;
                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
                }
                write_result.context("Failed to write frame to ffmpeg")?;
                Ok(())
            })
            .context("Failed to start ffmpeg writer thread")?;

        Ok(Self {
            spec,
            sender: Some(sender),
            writer: Some(writer),
            count: 0,
        })
    }

    /// Close the queue and wait for ffmpeg to finalize the container.
    pub fn finish(mut self) -> Result<()> {
        self.join_writer()
    }

    fn join_writer(&mut self) -> Result<()> {
        drop(self.sender.take());
        match self.writer.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow::anyhow!("ffmpeg writer thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl FrameSink for StreamingFrameSink {
    fn append(&mut self, frame: Frame) -> Result<()> {
        if frame.width != self.spec.width || frame.height != self.spec.height {
            anyhow::bail!(
                "Frame is {}x{}, encoder expects {}x{}",
                frame.width,
                frame.height,
                self.spec.width,
                self.spec.height
            );
        }
        let sender = self.sender.as_ref().context("Frame sink already closed")?;
        if sender.send(frame).is_err() {
            // The writer only hangs up after a failure; surface it.
            let err = self
                .join_writer()
                .err()
                .unwrap_or_else(|| anyhow::anyhow!("ffmpeg writer stopped unexpectedly"));
            return Err(err);
        }
        self.count += 1;
        Ok(())
    }

    fn len(&self) -> usize {
        self.count
    }
}

impl Drop for StreamingFrameSink {
    fn drop(&mut self) {
        if let Err(e) = self.join_writer() {
            log::warn!("Discarded encoder error: {:#}", e);
        }
    }
}
