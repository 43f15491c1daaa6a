use std::ops::Range;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::features::{AudioWindow, SpectralFeatures};
use crate::error::ConfigurationError;

/// Samples per analysis window.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;
/// Magnitude bins averaged into `bass_energy`.
pub const BASS_BINS: Range<usize> = 0..20;
/// Divisor that maps the bass-bin mean of 16-bit PCM into roughly 0..1.
pub const BASS_NORMALIZATION: f32 = 5000.0;
/// Bins treated as the kick's low band.
pub const KICK_LOW_BINS: Range<usize> = 0..15;
/// Bins treated as mids when rejecting kicks.
pub const KICK_MID_BINS: Range<usize> = 15..40;
/// Low-band mean must exceed this for a kick.
pub const KICK_LOW_THRESHOLD: f32 = 5000.0;
/// Mid-band mean must stay below this for a kick.
pub const KICK_MID_THRESHOLD: f32 = 1000.0;

#[derive(Clone, Debug, PartialEq)]
pub struct AnalyzerConfig {
    pub chunk_size: usize,
    pub bass_bins: Range<usize>,
    pub bass_normalization: f32,
    pub kick_low_bins: Range<usize>,
    pub kick_mid_bins: Range<usize>,
    pub kick_low_threshold: f32,
    pub kick_mid_threshold: f32,
}

impl AnalyzerConfig {
    /// Smallest window that still yields one spectral bin.
    pub const MIN_CHUNK_SIZE: usize = 2;

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.chunk_size < Self::MIN_CHUNK_SIZE {
            return Err(ConfigurationError::InvalidChunkSize(self.chunk_size));
        }
        Ok(())
    }
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            bass_bins: BASS_BINS,
            bass_normalization: BASS_NORMALIZATION,
            kick_low_bins: KICK_LOW_BINS,
            kick_mid_bins: KICK_MID_BINS,
            kick_low_threshold: KICK_LOW_THRESHOLD,
            kick_mid_threshold: KICK_MID_THRESHOLD,
        }
    }
}

/// Causal, window-at-a-time spectral analysis.
///
/// The FFT plan and scratch buffers are allocated once for the configured
/// chunk size and reused for every window.
pub struct SpectralAnalyzer {
    config: AnalyzerConfig,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(config.chunk_size);
        let half = config.chunk_size / 2;

        log::debug!(
            "Spectral analyzer: chunk={} bins={} bass={:?} low={:?} mid={:?}",
            config.chunk_size,
            half,
            config.bass_bins,
            config.kick_low_bins,
            config.kick_mid_bins
        );

        Ok(Self {
            fft,
            buffer: vec![Complex::new(0.0, 0.0); config.chunk_size],
            magnitudes: vec![0.0; half],
            config,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    /// Analyze one window. Short tail windows yield neutral features.
    pub fn analyze(&mut self, window: &AudioWindow<'_>) -> SpectralFeatures {
        if !window.is_complete(self.config.chunk_size) {
            return SpectralFeatures::default();
        }

        let samples = &window.samples()[..self.config.chunk_size];
        for (slot, &s) in self.buffer.iter_mut().zip(samples) {
            *slot = Complex::new(s as f32, 0.0);
        }
        self.fft.process(&mut self.buffer);

        // Real input: the upper half mirrors the lower half.
        let half = self.magnitudes.len();
        for (mag, c) in self.magnitudes.iter_mut().zip(&self.buffer[..half]) {
            *mag = c.norm();
        }

        let bass_energy =
            band_mean(&self.magnitudes, &self.config.bass_bins) / self.config.bass_normalization;
        let low = band_mean(&self.magnitudes, &self.config.kick_low_bins);
        let mids = band_mean(&self.magnitudes, &self.config.kick_mid_bins);

        SpectralFeatures {
            bass_energy,
            kick_detected: low > self.config.kick_low_threshold
                && mids < self.config.kick_mid_threshold,
        }
    }

    /// Slice the window at `offset` and analyze it. `None` marks a tail too
    /// short for a full window; callers substitute neutral features.
    pub fn analyze_at(&mut self, track: &[i16], offset: usize) -> Option<SpectralFeatures> {
        let window = AudioWindow::extract(track, offset, self.config.chunk_size);
        if window.is_complete(self.config.chunk_size) {
            Some(self.analyze(&window))
        } else {
            None
        }
    }
}

/// Mean of `bins[range]`, clamped to the available bins. Empty ranges give 0.
fn band_mean(bins: &[f32], range: &Range<usize>) -> f32 {
    let end = range.end.min(bins.len());
    let start = range.start.min(end);
    if start == end {
        return 0.0;
    }
    bins[start..end].iter().sum::<f32>() / (end - start) as f32
}
