use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::error::ConfigurationError;
use crate::orchestrator::TerminationSignal;
use crate::scene::generator::parse_prompts;
use crate::shaders::ShaderStyle;

#[derive(Parser, Debug)]
#[command(name = "pulsefade", about = "Audio-reactive shader video renderer with crossfading AI scenes")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG). Prompted for when omitted.
    pub input: Option<PathBuf>,

    /// Shader style. Prompted for when omitted.
    #[arg(short, long, value_enum)]
    pub style: Option<ShaderStyle>,

    /// Scene prompts (comma-separated). Prompted for when omitted.
    #[arg(short, long, value_delimiter = ',')]
    pub prompts: Vec<String>,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// H.264 CRF quality (0-51, lower = better)
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,

    /// Directory for generated scene images
    #[arg(long, default_value = "generated_scenes")]
    pub scenes_dir: PathBuf,

    /// Directory holding `common.vert.wgsl` and `<style>.frag.wgsl`
    #[arg(long)]
    pub shaders_dir: Option<PathBuf>,

    /// Config file (default: ./pulsefade.toml or ~/.config/pulsefade/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for output_video.mp4 and final_output.mp4
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// List available shader styles and exit
    #[arg(long)]
    pub list_styles: bool,

    /// Crossfade speed in blend units per second
    #[arg(long, default_value_t = 0.05)]
    pub fade_rate: f64,

    /// Samples per analysis window
    #[arg(long, default_value_t = 1024)]
    pub chunk_size: usize,
}

const AUDIO_PROMPT: &str = "Enter path to your input audio file (.wav or .mp3): ";
const STYLE_PROMPT: &str = "Choose shader style (fractal_blob / tunnel_wave / grid_glitch / storm_warp): ";
const SCENES_PROMPT: &str = "Enter comma-separated prompts for scenes (ex: 'psychedelic mushrooms, cosmic desert'): ";

/// Non-interactive check used by every entry point.
pub fn validate_audio_path(raw: &str) -> Result<PathBuf, ConfigurationError> {
    let path = PathBuf::from(raw.trim());
    if raw.trim().is_empty() || !path.is_file() {
        return Err(ConfigurationError::AudioNotFound(path));
    }
    Ok(path)
}

/// Print `prompt` and read one trimmed line; `None` at end of input.
fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, prompt: &str) -> Result<Option<String>> {
    write!(output, "{}", prompt)?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line).context("Failed to read from stdin")? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask until an existing file is named. Running out of input is
/// `AudioNotFound` for the last answer given.
pub fn prompt_audio_path<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<PathBuf> {
    let mut last = String::new();
    while let Some(answer) = ask(input, output, AUDIO_PROMPT)? {
        match validate_audio_path(&answer) {
            Ok(path) => return Ok(path),
            Err(_) => writeln!(output, "File not found, try again.")?,
        }
        last = answer;
    }
    Err(ConfigurationError::AudioNotFound(PathBuf::from(last)).into())
}

pub fn prompt_style<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<ShaderStyle> {
    let mut last = String::new();
    while let Some(answer) = ask(input, output, STYLE_PROMPT)? {
        match answer.parse::<ShaderStyle>() {
            Ok(style) => return Ok(style),
            Err(e) => writeln!(output, "{}", e)?,
        }
        last = answer;
    }
    Err(ConfigurationError::UnknownShaderStyle(last).into())
}

pub fn prompt_scene_prompts<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<Vec<String>> {
    while let Some(answer) = ask(input, output, SCENES_PROMPT)? {
        let prompts = parse_prompts(&answer);
        if !prompts.is_empty() {
            return Ok(prompts);
        }
        writeln!(output, "At least one prompt is required.")?;
    }
    Err(ConfigurationError::EmptySceneSequence.into())
}

/// True for the words that stop a running capture.
pub fn is_quit_command(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "q" | "quit")
}

/// Watch stdin on a background thread and raise `signal` on "q"/"quit".
/// End of input ends the watcher without stopping the capture.
pub fn spawn_quit_watcher(signal: TerminationSignal) -> Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("quit-watcher".into())
        .spawn(move || watch_for_quit(std::io::stdin().lock(), &signal))
        .context("Failed to spawn stdin watcher")
}

fn watch_for_quit<R: BufRead>(input: R, signal: &TerminationSignal) {
    for line in input.lines() {
        match line {
            Ok(line) if is_quit_command(&line) => {
                log::info!("Quit requested");
                signal.request();
                return;
            }
            Ok(_) => {}
            Err(e) => {
                log::debug!("stdin watcher stopped: {}", e);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn temp_audio(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pulsefade-cli-{}-{}.wav", name, std::process::id()));
        std::fs::write(&path, b"RIFF").unwrap();
        path
    }

    #[test]
    fn validate_rejects_missing_and_blank_paths() {
        assert!(matches!(
            validate_audio_path("  "),
            Err(ConfigurationError::AudioNotFound(_))
        ));
        assert!(validate_audio_path("/definitely/not/here.mp3").is_err());

        let audio = temp_audio("validate");
        let raw = format!("  {}  ", audio.display());
        assert_eq!(validate_audio_path(&raw).unwrap(), audio);
        std::fs::remove_file(audio).unwrap();
    }

    #[test]
    fn audio_prompt_reasks_until_file_exists() {
        let audio = temp_audio("reprompt");
        let answers = format!("missing.mp3\n\n{}\n", audio.display());
        let mut out = Vec::new();

        let path = prompt_audio_path(&mut Cursor::new(answers), &mut out).unwrap();
        assert_eq!(path, audio);
        let shown = String::from_utf8(out).unwrap();
        assert_eq!(shown.matches("File not found").count(), 2);
        assert_eq!(shown.matches(AUDIO_PROMPT).count(), 3);
        std::fs::remove_file(audio).unwrap();
    }

    #[test]
    fn audio_prompt_fails_at_end_of_input() {
        let err = prompt_audio_path(&mut Cursor::new("nope.wav\n"), &mut Vec::new()).unwrap_err();
        match err.downcast_ref::<ConfigurationError>() {
            Some(ConfigurationError::AudioNotFound(path)) => assert_eq!(path, &PathBuf::from("nope.wav")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn style_prompt_accepts_known_names_only() {
        let mut out = Vec::new();
        let style = prompt_style(&mut Cursor::new("plasma\ngrid_glitch\n"), &mut out).unwrap();
        assert_eq!(style, ShaderStyle::GridGlitch);
        assert!(String::from_utf8(out).unwrap().contains("plasma"));

        assert!(prompt_style(&mut Cursor::new(""), &mut Vec::new()).is_err());
    }

    #[test]
    fn scene_prompt_splits_on_commas() {
        let prompts =
            prompt_scene_prompts(&mut Cursor::new(" , \nneon jungle, cosmic desert\n"), &mut Vec::new()).unwrap();
        assert_eq!(prompts, vec!["neon jungle", "cosmic desert"]);
    }

    #[test]
    fn quit_watcher_raises_signal() {
        assert!(is_quit_command(" Q "));
        assert!(is_quit_command("quit"));
        assert!(!is_quit_command("queue"));

        let signal = TerminationSignal::new();
        watch_for_quit(Cursor::new("hello\nquit\n"), &signal);
        assert!(signal.is_requested());

        let signal = TerminationSignal::new();
        watch_for_quit(Cursor::new("hello\n"), &signal);
        assert!(!signal.is_requested());
    }

    #[test]
    fn flags_parse() {
        let cli = Cli::try_parse_from([
            "pulsefade",
            "song.mp3",
            "--style",
            "storm_warp",
            "--prompts",
            "a,b",
            "--fps",
            "24",
        ])
        .unwrap();
        assert_eq!(cli.style, Some(ShaderStyle::StormWarp));
        assert_eq!(cli.prompts, vec!["a", "b"]);
        assert_eq!(cli.fps, 24);
        assert_eq!(cli.width, 1280);
        assert!(Cli::try_parse_from(["pulsefade", "--style", "plasma"]).is_err());
    }
}
