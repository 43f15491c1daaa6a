pub mod frame;
pub mod gpu;
pub mod pipeline;
pub mod renderer;
pub mod texture;

use anyhow::Result;

use crate::capture::Frame;
use crate::scene::fader::{FaderState, SceneFader};

/// Everything the shader sees for one frame. Built fresh every iteration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderParameters {
    pub elapsed_time: f64,
    pub resolution: (u32, u32),
    pub bass_energy: f32,
    pub kick_detected: bool,
    pub fader: FaderState,
}

/// Draws one frame from the current parameters and scene pair.
pub trait FrameRenderer {
    type Texture;

    fn render_frame(&mut self, params: &RenderParameters, scenes: &SceneFader<Self::Texture>) -> Result<Frame>;
}
