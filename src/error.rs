use std::path::PathBuf;

/// Fatal setup failures. All of these surface before the render loop starts.
#[derive(thiserror::Error, Debug)]
pub enum ConfigurationError {
    #[error("shader source not found: {}", .0.display())]
    ShaderNotFound(PathBuf),

    #[error("shader '{style}' failed to compile: {message}")]
    ShaderCompile { style: String, message: String },

    #[error("unknown shader style '{0}' (expected one of: fractal_blob, tunnel_wave, grid_glitch, storm_warp)")]
    UnknownShaderStyle(String),

    #[error("scene sequence is empty; at least one scene image is required")]
    EmptySceneSequence,

    #[error("audio file not found: {}", .0.display())]
    AudioNotFound(PathBuf),

    #[error("invalid resolution {width}x{height}: dimensions must be non-zero and even")]
    InvalidResolution { width: u32, height: u32 },

    #[error("invalid frame rate {0}: must be non-zero")]
    InvalidFrameRate(u32),

    #[error("resolution {width}x{height} exceeds the GPU limit of {max} pixels per side")]
    ResolutionTooLarge { width: u32, height: u32, max: u32 },

    #[error("invalid fade rate {0}: must be finite and non-negative")]
    InvalidFadeRate(f64),

    #[error("invalid analysis chunk size {0}: must be at least 2 samples")]
    InvalidChunkSize(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failing_input() {
        let err = ConfigurationError::ShaderNotFound(PathBuf::from("shaders/storm_warp.frag.wgsl"));
        assert!(err.to_string().contains("storm_warp.frag.wgsl"));

        let err = ConfigurationError::ShaderCompile {
            style: "grid_glitch".into(),
            message: "expected ';'".into(),
        };
        assert!(err.to_string().contains("grid_glitch"));
        assert!(err.to_string().contains("expected ';'"));

        let err = ConfigurationError::AudioNotFound(PathBuf::from("missing.wav"));
        assert!(err.to_string().contains("missing.wav"));

        let err = ConfigurationError::ResolutionTooLarge {
            width: 40000,
            height: 720,
            max: 16384,
        };
        assert!(err.to_string().contains("40000x720"));
        assert!(err.to_string().contains("16384"));
    }
}
