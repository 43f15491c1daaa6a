use anyhow::Result;
use std::time::Duration;

use crate::playback::clock::TimeSource;

/// Independently clocked audio playback, polled once per loop iteration.
pub trait PlaybackTransport {
    fn start(&mut self) -> Result<()>;
    fn is_playing(&self) -> bool;
    fn stop(&mut self);
}

impl PlaybackTransport for Box<dyn PlaybackTransport> {
    fn start(&mut self) -> Result<()> {
        (**self).start()
    }

    fn is_playing(&self) -> bool {
        (**self).is_playing()
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// Headless transport: reports "playing" for the track duration measured on
/// the loop's time source. Used when no output device is wanted.
pub struct TimedTransport<T: TimeSource> {
    time: T,
    duration: Duration,
    started_at: Option<Duration>,
    stopped: bool,
}

impl<T: TimeSource> TimedTransport<T> {
    pub fn new(time: T, duration: Duration) -> Self {
        Self {
            time,
            duration,
            started_at: None,
            stopped: false,
        }
    }
}

impl<T: TimeSource> PlaybackTransport for TimedTransport<T> {
    fn start(&mut self) -> Result<()> {
        self.started_at = Some(self.time.now());
        self.stopped = false;
        log::debug!("Timed playback started ({:.2}s)", self.duration.as_secs_f64());
        Ok(())
    }

    fn is_playing(&self) -> bool {
        match self.started_at {
            Some(start) if !self.stopped => self.time.now().saturating_sub(start) < self.duration,
            _ => false,
        }
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}

#[cfg(feature = "device-audio")]
pub use device::DevicePlayback;

#[cfg(feature = "device-audio")]
mod device {
    use anyhow::{Context, Result};
    use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink};
    use std::fs::File;
    use std::io::BufReader;
    use std::path::{Path, PathBuf};

    use super::PlaybackTransport;

    /// Playback on the default output device.
    pub struct DevicePlayback {
        path: PathBuf,
        // Dropping the stream silences the sink.
        _stream: OutputStream,
        handle: OutputStreamHandle,
        sink: Option<Sink>,
    }

    impl DevicePlayback {
        pub fn open(path: &Path) -> Result<Self> {
            let (stream, handle) =
                OutputStream::try_default().context("Failed to open default audio output")?;
            Ok(Self {
                path: path.to_path_buf(),
                _stream: stream,
                handle,
                sink: None,
            })
        }
    }

    impl PlaybackTransport for DevicePlayback {
        fn start(&mut self) -> Result<()> {
            if let Some(old) = self.sink.take() {
                old.stop();
            }
            let file = File::open(&self.path)
                .with_context(|| format!("Failed to open audio file: {}", self.path.display()))?;
            let source = Decoder::new(BufReader::new(file))
                .with_context(|| format!("Failed to decode audio for playback: {}", self.path.display()))?;
            let sink = Sink::try_new(&self.handle).context("Failed to create audio sink")?;
            sink.append(source);
            sink.play();
            self.sink = Some(sink);
            log::info!("Device playback started: {}", self.path.display());
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.sink.as_ref().is_some_and(|s| !s.empty())
        }

        fn stop(&mut self) {
            if let Some(sink) = self.sink.take() {
                sink.stop();
            }
        }
    }

    impl Drop for DevicePlayback {
        fn drop(&mut self) {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::clock::ManualTime;

    #[test]
    fn timed_transport_plays_for_duration() {
        let time = ManualTime::new();
        let mut transport = TimedTransport::new(time.clone(), Duration::from_millis(500));
        assert!(!transport.is_playing());

        transport.start().unwrap();
        assert!(transport.is_playing());
        time.advance(Duration::from_millis(499));
        assert!(transport.is_playing());
        time.advance(Duration::from_millis(1));
        assert!(!transport.is_playing());
    }

    #[test]
    fn stop_ends_playback_early() {
        let time = ManualTime::new();
        let mut transport = TimedTransport::new(time.clone(), Duration::from_secs(5));
        transport.start().unwrap();
        transport.stop();
        assert!(!transport.is_playing());
    }
}
