use std::path::{Path, PathBuf};

use super::embedded::{embedded_fragment, COMMON_VERTEX_WGSL};
use super::ShaderStyle;
use crate::error::ConfigurationError;

pub const COMMON_VERTEX_FILE: &str = "common.vert.wgsl";

/// Vertex and fragment text for one style.
#[derive(Clone, Debug)]
pub struct ShaderSource {
    pub style: ShaderStyle,
    pub vertex: String,
    pub fragment: String,
}

impl ShaderSource {
    /// Single WGSL module: the shared vertex stage followed by the style's
    /// fragment stage.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.vertex, self.fragment)
    }
}

/// Locate a `shaders` directory next to the executable or its parents,
/// falling back to the crate root in development builds.
pub fn find_shaders_dir() -> Option<PathBuf> {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()));

    if let Some(ref dir) = exe_dir {
        for candidate in dir.ancestors().take(3) {
            let shaders_dir = candidate.join("shaders");
            if shaders_dir.join(COMMON_VERTEX_FILE).exists() {
                return Some(shaders_dir);
            }
        }
    }

    let dev_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders");
    if dev_dir.join(COMMON_VERTEX_FILE).exists() {
        return Some(dev_dir);
    }
    None
}

/// Read a style's sources from `dir`. Both files must exist.
pub fn load_shader_from_dir(style: ShaderStyle, dir: &Path) -> Result<ShaderSource, ConfigurationError> {
    let vertex_path = dir.join(COMMON_VERTEX_FILE);
    let fragment_path = dir.join(style.fragment_file());

    let vertex = std::fs::read_to_string(&vertex_path)
        .map_err(|_| ConfigurationError::ShaderNotFound(vertex_path))?;
    let fragment = std::fs::read_to_string(&fragment_path)
        .map_err(|_| ConfigurationError::ShaderNotFound(fragment_path))?;

    Ok(ShaderSource {
        style,
        vertex,
        fragment,
    })
}

pub fn embedded_shader(style: ShaderStyle) -> ShaderSource {
    ShaderSource {
        style,
        vertex: COMMON_VERTEX_WGSL.to_string(),
        fragment: embedded_fragment(style).to_string(),
    }
}

/// Resolve a style's sources: an explicit directory must contain them;
/// otherwise a discovered directory is used, then the embedded copies.
pub fn load_shader(style: ShaderStyle, dir: Option<&Path>) -> Result<ShaderSource, ConfigurationError> {
    if let Some(dir) = dir {
        log::info!("Loading shader '{}' from {}", style, dir.display());
        return load_shader_from_dir(style, dir);
    }

    if let Some(dir) = find_shaders_dir() {
        match load_shader_from_dir(style, &dir) {
            Ok(source) => {
                log::info!("Loaded shader '{}' from {}", style, dir.display());
                return Ok(source);
            }
            Err(err) => log::warn!("{}; using built-in copy", err),
        }
    }

    log::info!("Using built-in shader '{}'", style);
    Ok(embedded_shader(style))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pulsefade-shaders-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn explicit_dir_reads_both_stages() {
        let dir = temp_dir("ok");
        std::fs::write(dir.join(COMMON_VERTEX_FILE), "// vert").unwrap();
        std::fs::write(dir.join("tunnel_wave.frag.wgsl"), "// frag").unwrap();

        let source = load_shader(ShaderStyle::TunnelWave, Some(&dir)).unwrap();
        assert_eq!(source.vertex, "// vert");
        assert_eq!(source.fragment, "// frag");
        assert_eq!(source.combined(), "// vert\n// frag");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_fragment_is_not_found() {
        let dir = temp_dir("missing");
        std::fs::write(dir.join(COMMON_VERTEX_FILE), "// vert").unwrap();

        let err = load_shader(ShaderStyle::StormWarp, Some(&dir)).unwrap_err();
        match err {
            ConfigurationError::ShaderNotFound(path) => {
                assert!(path.ends_with("storm_warp.frag.wgsl"));
            }
            other => panic!("unexpected error: {other}"),
        }

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_vertex_is_not_found() {
        let dir = temp_dir("novert");
        let err = load_shader(ShaderStyle::FractalBlob, Some(&dir)).unwrap_err();
        assert!(matches!(err, ConfigurationError::ShaderNotFound(ref p) if p.ends_with(COMMON_VERTEX_FILE)));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn every_style_has_an_embedded_source() {
        for style in ShaderStyle::ALL {
            let source = embedded_shader(style);
            assert!(source.vertex.contains("fn vs_main"));
            assert!(source.fragment.contains("fn fs_main"));
        }
    }
}
