use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigurationError;

/// External text-to-image service: writes one image for `prompt` at `dest`.
pub trait ImageGenerator {
    fn generate(&self, prompt: &str, dest: &Path) -> Result<()>;
}

impl<G: ImageGenerator + ?Sized> ImageGenerator for Box<G> {
    fn generate(&self, prompt: &str, dest: &Path) -> Result<()> {
        (**self).generate(prompt, dest)
    }
}

/// Stand-in used when no image service is configured. Pre-rendered scenes
/// still load; any prompt that needs a new image fails.
pub struct MissingImageService;

impl ImageGenerator for MissingImageService {
    fn generate(&self, prompt: &str, dest: &Path) -> Result<()> {
        anyhow::bail!(
            "No image service configured for prompt '{}'; set [scenes] endpoint or place an image at {}",
            prompt,
            dest.display()
        )
    }
}

/// Fixed on-disk name of the scene generated for prompt `idx`.
pub fn scene_path(dir: &Path, idx: usize) -> PathBuf {
    dir.join(format!("scene_{}.png", idx))
}

/// Split a comma-separated prompt list, dropping blank entries.
pub fn parse_prompts(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Produces one scene image per prompt, skipping any that already exist.
pub struct SceneGenerator<G: ImageGenerator> {
    generator: G,
    output_dir: PathBuf,
}

impl<G: ImageGenerator> SceneGenerator<G> {
    pub fn new(generator: G, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            generator,
            output_dir: output_dir.into(),
        }
    }

    pub fn generate_all(&self, prompts: &[String]) -> Result<Vec<PathBuf>> {
        if prompts.is_empty() {
            return Err(ConfigurationError::EmptySceneSequence.into());
        }

        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create scene directory: {}", self.output_dir.display())
        })?;

        let pb = ProgressBar::new(prompts.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.magenta/blue} {pos}/{len} scenes {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        let mut paths = Vec::with_capacity(prompts.len());
        for (idx, prompt) in prompts.iter().enumerate() {
            let path = scene_path(&self.output_dir, idx);
            if path.exists() {
                log::info!("Scene {} exists, skipping: {}", idx + 1, path.display());
            } else {
                log::info!("Generating scene {}: {}", idx + 1, prompt);
                pb.set_message(prompt.clone());
                self.generator
                    .generate(prompt, &path)
                    .with_context(|| format!("Image generation failed for prompt '{}'", prompt))?;
            }
            paths.push(path);
            pb.inc(1);
        }
        pb.finish_and_clear();

        Ok(paths)
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
}

/// Image service reached over HTTP. The endpoint answers a JSON
/// `{prompt, width, height}` POST with encoded image bytes.
pub struct HttpImageGenerator {
    client: reqwest::blocking::Client,
    endpoint: String,
    api_key: Option<String>,
    width: u32,
    height: u32,
}

impl HttpImageGenerator {
    pub fn new(endpoint: &str, api_key: Option<String>, width: u32, height: u32) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            api_key,
            width,
            height,
        })
    }
}

impl ImageGenerator for HttpImageGenerator {
    fn generate(&self, prompt: &str, dest: &Path) -> Result<()> {
        let body = serde_json::to_vec(&GenerateRequest {
            prompt,
            width: self.width,
            height: self.height,
        })?;

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .with_context(|| format!("Failed to reach image service at {}", self.endpoint))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            anyhow::bail!("Image service returned {}: {}", status, text);
        }
        let bytes = response.bytes().context("Failed to read image response")?;

        save_scene_image(&bytes, dest)
    }
}

/// Decode `bytes` and write them as PNG at `dest`. The image lands under a
/// temporary name first so an interrupted write never looks like a finished
/// scene.
pub fn save_scene_image(bytes: &[u8], dest: &Path) -> Result<()> {
    let img = image::load_from_memory(bytes).context("Image service returned undecodable data")?;
    let partial = dest.with_extension("png.partial");
    img.save_with_format(&partial, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write scene image: {}", partial.display()))?;
    std::fs::rename(&partial, dest)
        .with_context(|| format!("Failed to move scene image into place: {}", dest.display()))?;
    Ok(())
}
