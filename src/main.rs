mod audio;
mod capture;
mod cli;
mod config;
mod encode;
mod error;
mod orchestrator;
mod pipeline;
mod playback;
mod render;
mod scene;
mod shaders;

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::time::Duration;

use audio::playback::PlaybackTransport;
use cli::Cli;
use encode::ffmpeg::{EncodeSettings, FfmpegEncoder};
use encode::VideoSpec;
use orchestrator::TerminationSignal;
use pipeline::CaptureRequest;
use playback::clock::MonotonicTime;
use render::gpu::GpuContext;
use render::renderer::GpuRenderer;
use scene::generator::{HttpImageGenerator, ImageGenerator, MissingImageService, SceneGenerator};
use shaders::ShaderStyle;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();

    let mut cfg = config::Config::default();
    if let Some(path) = config::discover_config_path(cli.config.as_deref()) {
        match config::load_config(&path) {
            Ok(loaded) => {
                log::info!("Loaded config from {}", path.display());
                cfg = loaded;
            }
            Err(err) => log::warn!("{:#}", err),
        }
    }
    // Merge: config values apply only when CLI is at its default
    if cli.width == 1280 { cli.width = cfg.output.width; }
    if cli.height == 720 { cli.height = cfg.output.height; }
    if cli.fps == 30 { cli.fps = cfg.output.fps; }
    if cli.crf == 18 { cli.crf = cfg.output.crf; }
    if cli.codec == "libx264" { cli.codec = cfg.output.codec.clone(); }
    if cli.pix_fmt == "yuv420p" { cli.pix_fmt = cfg.output.pix_fmt.clone(); }
    if cli.chunk_size == 1024 { cli.chunk_size = cfg.audio.chunk_size; }
    if cli.fade_rate == 0.05 { cli.fade_rate = cfg.fader.rate; }
    if cli.scenes_dir.as_os_str() == "generated_scenes" {
        cli.scenes_dir = cfg.scenes.dir.clone();
    }

    if cli.list_styles {
        println!("Available shader styles:");
        for style in ShaderStyle::ALL {
            println!("  {:<16} {}", style.name(), style.description());
        }
        return Ok(());
    }

    let video = VideoSpec {
        width: cli.width,
        height: cli.height,
        fps: cli.fps,
    };
    video.validate()?;
    let analyzer = cfg.analysis.analyzer_config(cli.chunk_size);
    analyzer.validate()?;
    scene::fader::validate_fade_rate(cli.fade_rate)?;

    // Interactive prompts only for what the command line left out
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    let input = match cli.input.as_deref() {
        Some(path) => cli::validate_audio_path(&path.to_string_lossy())?,
        None => cli::prompt_audio_path(&mut stdin.lock(), &mut stdout)?,
    };
    let style = match cli.style {
        Some(style) => style,
        None => cli::prompt_style(&mut stdin.lock(), &mut stdout)?,
    };
    let prompts = if cli.prompts.is_empty() {
        cli::prompt_scene_prompts(&mut stdin.lock(), &mut stdout)?
    } else {
        scene::generator::parse_prompts(&cli.prompts.join(","))
    };

    log::info!("pulsefade - audio-reactive shader renderer");
    log::info!("Input: {}", input.display());
    log::info!("Style: {}", style);
    log::info!("Resolution: {}x{} @ {}fps", cli.width, cli.height, cli.fps);

    // 1. Scenes
    let image_service: Box<dyn ImageGenerator> = match cfg.scenes.endpoint {
        Some(ref endpoint) => {
            let api_key = std::env::var(&cfg.scenes.api_key_env).ok();
            Box::new(HttpImageGenerator::new(endpoint, api_key, cfg.scenes.width, cfg.scenes.height)?)
        }
        None => Box::new(MissingImageService),
    };
    let scene_paths = SceneGenerator::new(image_service, &cli.scenes_dir)
        .generate_all(&prompts)
        .context("Scene generation failed")?;
    log::info!("{} scenes ready in {}", scene_paths.len(), cli.scenes_dir.display());

    // 2. Decode audio
    log::info!("Decoding audio...");
    let audio_data = audio::decode::decode_audio(&input)?;
    let duration = audio_data.duration_secs();

    // 3. GPU, shader and scene textures
    log::info!("Initializing GPU...");
    let gpu = GpuContext::new()?;
    let shader = shaders::loader::load_shader(style, cli.shaders_dir.as_deref()).context("Failed to load shader")?;
    let renderer = GpuRenderer::new(gpu, &shader, cli.width, cli.height)?;
    let scenes = renderer.upload_scenes(&scene_paths)?;

    // 4. Encoder
    let mut encoder = FfmpegEncoder::new(EncodeSettings {
        codec: cli.codec.clone(),
        pix_fmt: cli.pix_fmt.clone(),
        crf: cli.crf,
        queue_depth: cfg.capture.queue_depth,
    })?;

    // 5. Playback and stop handling
    let time = MonotonicTime::new();
    let transport = open_transport(&input, time, Duration::from_secs_f64(duration))?;
    let termination = TerminationSignal::new();
    if stdin.is_terminal() {
        cli::spawn_quit_watcher(termination.clone())?;
        log::info!("Type 'q' and Enter to stop early");
    }

    // 6. Render, encode, mux
    let request = CaptureRequest {
        audio_path: &input,
        track: &audio_data.samples,
        output_dir: &cli.output_dir,
        video,
        analyzer,
        fade_rate: cli.fade_rate,
    };
    let outcome = pipeline::run_capture(renderer, scenes, &mut encoder, time, transport, termination, &request)
        .context("Video encoding failed")?;

    log::info!("Silent video: {}", outcome.silent_path.display());
    log::info!("Done! Output: {}", outcome.final_path.display());
    Ok(())
}

#[cfg(feature = "device-audio")]
fn open_transport(input: &std::path::Path, _time: MonotonicTime, _duration: Duration) -> Result<Box<dyn PlaybackTransport>> {
    Ok(Box::new(audio::playback::DevicePlayback::open(input)?))
}

#[cfg(not(feature = "device-audio"))]
fn open_transport(_input: &std::path::Path, time: MonotonicTime, duration: Duration) -> Result<Box<dyn PlaybackTransport>> {
    log::info!("No audio device support compiled in; pacing playback on the system clock");
    Ok(Box::new(audio::playback::TimedTransport::new(time, duration)))
}
