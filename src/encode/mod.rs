pub mod ffmpeg;

use anyhow::Result;
use std::path::Path;

use crate::capture::FrameSink;
use crate::error::ConfigurationError;

/// Geometry and rate of the silent video stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoSpec {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl VideoSpec {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        // yuv420p output needs even dimensions.
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(ConfigurationError::InvalidResolution {
                width: self.width,
                height: self.height,
            });
        }
        if self.fps == 0 {
            return Err(ConfigurationError::InvalidFrameRate(self.fps));
        }
        Ok(())
    }
}

/// Two-stage video encoder: frames into a silent container, then the silent
/// container muxed with the source audio.
pub trait VideoEncoder {
    type Sink: FrameSink;

    /// Begin the silent video at `silent_path`; frames go to the returned sink.
    fn open(&mut self, spec: &VideoSpec, silent_path: &Path) -> Result<Self::Sink>;

    /// Flush the sink and finalize the silent video.
    fn close(&mut self, sink: Self::Sink) -> Result<()>;

    fn mux(&mut self, silent_path: &Path, audio_path: &Path, output_path: &Path) -> Result<()>;
}
