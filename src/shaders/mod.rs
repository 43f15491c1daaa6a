pub mod embedded;
pub mod loader;
pub mod reflect;

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;

/// Built-in fragment styles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ShaderStyle {
    #[value(name = "fractal_blob")]
    FractalBlob,
    #[value(name = "tunnel_wave")]
    TunnelWave,
    #[value(name = "grid_glitch")]
    GridGlitch,
    #[value(name = "storm_warp")]
    StormWarp,
}

impl ShaderStyle {
    pub const ALL: [ShaderStyle; 4] = [
        ShaderStyle::FractalBlob,
        ShaderStyle::TunnelWave,
        ShaderStyle::GridGlitch,
        ShaderStyle::StormWarp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ShaderStyle::FractalBlob => "fractal_blob",
            ShaderStyle::TunnelWave => "tunnel_wave",
            ShaderStyle::GridGlitch => "grid_glitch",
            ShaderStyle::StormWarp => "storm_warp",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ShaderStyle::FractalBlob => "Kaleidoscopic blob field that swells with the bass",
            ShaderStyle::TunnelWave => "Scenes wrapped onto a tunnel whose speed follows the bass",
            ShaderStyle::GridGlitch => "Row jitter, channel split and a pulsing grid on kicks",
            ShaderStyle::StormWarp => "Domain-warped noise storm with bass lightning",
        }
    }

    /// File name of the fragment stage inside a shader directory.
    pub fn fragment_file(self) -> String {
        format!("{}.frag.wgsl", self.name())
    }
}

impl fmt::Display for ShaderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ShaderStyle {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ShaderStyle::ALL
            .into_iter()
            .find(|style| style.name() == wanted)
            .ok_or_else(|| ConfigurationError::UnknownShaderStyle(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for style in ShaderStyle::ALL {
            assert_eq!(style.name().parse::<ShaderStyle>().unwrap(), style);
        }
        assert_eq!(" grid_glitch ".parse::<ShaderStyle>().unwrap(), ShaderStyle::GridGlitch);
    }

    #[test]
    fn unknown_style_is_rejected() {
        let err = "vaporwave".parse::<ShaderStyle>().unwrap_err();
        assert!(matches!(err, ConfigurationError::UnknownShaderStyle(ref s) if s == "vaporwave"));
    }
}
