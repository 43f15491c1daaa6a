use crate::error::ConfigurationError;

/// Blend units per second; one full crossfade takes 20 seconds.
pub const DEFAULT_FADE_RATE: f64 = 0.05;

/// Fade rates must be finite and non-negative so the blend stays in `[0, 1)`.
pub fn validate_fade_rate(rate: f64) -> Result<(), ConfigurationError> {
    if !(rate.is_finite() && rate >= 0.0) {
        return Err(ConfigurationError::InvalidFadeRate(rate));
    }
    Ok(())
}

/// Snapshot of the crossfade between two neighbouring scenes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaderState {
    pub current_index: usize,
    pub next_index: usize,
    /// Weight of the next scene, in `[0, 1)`.
    pub blend: f64,
}

/// Timed crossfade over a cyclic sequence of scene textures.
///
/// Generic over the texture handle so the timing logic is independent of the
/// GPU backend that owns the pixels.
pub struct SceneFader<T> {
    textures: Vec<T>,
    state: FaderState,
    fade_rate: f64,
}

impl<T> SceneFader<T> {
    pub fn new(textures: Vec<T>, fade_rate: f64) -> Result<Self, ConfigurationError> {
        if textures.is_empty() {
            return Err(ConfigurationError::EmptySceneSequence);
        }
        validate_fade_rate(fade_rate)?;
        let next_index = 1 % textures.len();
        Ok(Self {
            textures,
            state: FaderState {
                current_index: 0,
                next_index,
                blend: 0.0,
            },
            fade_rate,
        })
    }

    /// Advance the blend by `delta_time * fade_rate`, stepping to the next
    /// scene each time the blend crosses 1. A single scene never advances.
    pub fn update(&mut self, delta_time: f64) {
        let count = self.textures.len();
        if count < 2 || delta_time <= 0.0 {
            return;
        }

        let mut blend = self.state.blend + delta_time * self.fade_rate;
        if blend >= 1.0 {
            let steps = blend.floor();
            blend -= steps;
            let steps = steps as usize % count;
            self.state.current_index = (self.state.current_index + steps) % count;
            self.state.next_index = (self.state.current_index + 1) % count;
            log::debug!(
                "Scene advance: now {} -> {}",
                self.state.current_index,
                self.state.next_index
            );
        }
        self.state.blend = blend;
    }

    pub fn state(&self) -> FaderState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    pub fn current_texture(&self) -> &T {
        &self.textures[self.state.current_index]
    }

    pub fn next_texture(&self) -> &T {
        &self.textures[self.state.next_index]
    }

}
