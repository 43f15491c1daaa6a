/// A contiguous slice of mono 16-bit samples handed to the analyzer.
///
/// Windows borrow from the decoded track and are dropped after one analysis
/// pass. A window taken near the end of the track may be shorter than the
/// configured chunk size; such tail windows are never analyzed.
#[derive(Clone, Copy, Debug)]
pub struct AudioWindow<'a> {
    samples: &'a [i16],
}

impl<'a> AudioWindow<'a> {
    pub fn new(samples: &'a [i16]) -> Self {
        Self { samples }
    }

    /// Slice up to `chunk_size` samples starting at `offset`.
    pub fn extract(track: &'a [i16], offset: usize, chunk_size: usize) -> Self {
        let start = offset.min(track.len());
        let end = offset.saturating_add(chunk_size).min(track.len());
        Self {
            samples: &track[start..end],
        }
    }

    pub fn samples(&self) -> &'a [i16] {
        self.samples
    }

    /// True when the window carries a full chunk of samples.
    pub fn is_complete(&self, chunk_size: usize) -> bool {
        self.samples.len() >= chunk_size
    }
}

/// Per-window energy features fed to the shader.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SpectralFeatures {
    /// Mean low-band magnitude divided by the bass normalization constant.
    pub bass_energy: f32,
    /// Low-frequency transient: strong low band with quiet mids.
    pub kick_detected: bool,
}
