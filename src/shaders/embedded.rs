use super::ShaderStyle;

pub const COMMON_VERTEX_WGSL: &str = include_str!("../../shaders/common.vert.wgsl");

/// Fragment sources compiled into the binary, used when no shader directory
/// is found on disk.
pub fn embedded_fragment(style: ShaderStyle) -> &'static str {
    match style {
        ShaderStyle::FractalBlob => include_str!("../../shaders/fractal_blob.frag.wgsl"),
        ShaderStyle::TunnelWave => include_str!("../../shaders/tunnel_wave.frag.wgsl"),
        ShaderStyle::GridGlitch => include_str!("../../shaders/grid_glitch.frag.wgsl"),
        ShaderStyle::StormWarp => include_str!("../../shaders/storm_warp.frag.wgsl"),
    }
}
