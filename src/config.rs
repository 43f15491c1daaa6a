use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::analysis::{self, AnalyzerConfig};
use crate::scene::fader::DEFAULT_FADE_RATE;

pub const LOCAL_CONFIG_NAME: &str = "pulsefade.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub fader: FaderConfig,
    #[serde(default)]
    pub scenes: ScenesConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

/// Band edges are `[start, end)` bin pairs.
#[derive(Debug, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_bass_bins")]
    pub bass_bins: [usize; 2],
    #[serde(default = "default_bass_norm")]
    pub bass_norm: f32,
    #[serde(default = "default_kick_low_bins")]
    pub kick_low_bins: [usize; 2],
    #[serde(default = "default_kick_mid_bins")]
    pub kick_mid_bins: [usize; 2],
    #[serde(default = "default_kick_low_threshold")]
    pub kick_low_threshold: f32,
    #[serde(default = "default_kick_mid_threshold")]
    pub kick_mid_threshold: f32,
}

#[derive(Debug, Deserialize)]
pub struct FaderConfig {
    #[serde(default = "default_fade_rate")]
    pub rate: f64,
}

#[derive(Debug, Deserialize)]
pub struct ScenesConfig {
    #[serde(default = "default_scenes_dir")]
    pub dir: PathBuf,
    /// Text-to-image HTTP endpoint. Without one only pre-rendered scenes load.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_scene_width")]
    pub width: u32,
    #[serde(default = "default_scene_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct CaptureConfig {
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            bass_bins: default_bass_bins(),
            bass_norm: default_bass_norm(),
            kick_low_bins: default_kick_low_bins(),
            kick_mid_bins: default_kick_mid_bins(),
            kick_low_threshold: default_kick_low_threshold(),
            kick_mid_threshold: default_kick_mid_threshold(),
        }
    }
}

impl Default for FaderConfig {
    fn default() -> Self {
        Self {
            rate: default_fade_rate(),
        }
    }
}

impl Default for ScenesConfig {
    fn default() -> Self {
        Self {
            dir: default_scenes_dir(),
            endpoint: None,
            api_key_env: default_api_key_env(),
            width: default_scene_width(),
            height: default_scene_height(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}

impl AnalysisConfig {
    pub fn analyzer_config(&self, chunk_size: usize) -> AnalyzerConfig {
        AnalyzerConfig {
            chunk_size,
            bass_bins: self.bass_bins[0]..self.bass_bins[1],
            bass_normalization: self.bass_norm,
            kick_low_bins: self.kick_low_bins[0]..self.kick_low_bins[1],
            kick_mid_bins: self.kick_mid_bins[0]..self.kick_mid_bins[1],
            kick_low_threshold: self.kick_low_threshold,
            kick_mid_threshold: self.kick_mid_threshold,
        }
    }
}

fn default_width() -> u32 { 1280 }
fn default_height() -> u32 { 720 }
fn default_fps() -> u32 { 30 }
fn default_crf() -> u32 { 18 }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_chunk_size() -> usize { analysis::DEFAULT_CHUNK_SIZE }
fn default_bass_bins() -> [usize; 2] { [analysis::BASS_BINS.start, analysis::BASS_BINS.end] }
fn default_bass_norm() -> f32 { analysis::BASS_NORMALIZATION }
fn default_kick_low_bins() -> [usize; 2] { [analysis::KICK_LOW_BINS.start, analysis::KICK_LOW_BINS.end] }
fn default_kick_mid_bins() -> [usize; 2] { [analysis::KICK_MID_BINS.start, analysis::KICK_MID_BINS.end] }
fn default_kick_low_threshold() -> f32 { analysis::KICK_LOW_THRESHOLD }
fn default_kick_mid_threshold() -> f32 { analysis::KICK_MID_THRESHOLD }
fn default_fade_rate() -> f64 { DEFAULT_FADE_RATE }
fn default_scenes_dir() -> PathBuf { PathBuf::from("generated_scenes") }
fn default_api_key_env() -> String { "PULSEFADE_IMAGE_API_KEY".into() }
fn default_scene_width() -> u32 { 1024 }
fn default_scene_height() -> u32 { 1024 }
fn default_queue_depth() -> usize { 8 }

/// Explicit path, else `./pulsefade.toml`, else the user config directory.
pub fn discover_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG_NAME);
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("pulsefade").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("pulsefade").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).context("Invalid config file")
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    parse_config(&content).with_context(|| format!("Failed to parse config: {}", path.display()))
}
