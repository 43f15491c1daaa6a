use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::RgbaImage;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use wgpu;

use super::frame::TEXTURE_FORMAT;
use super::gpu::GpuContext;

/// A scene image resident on the GPU with its full mip chain.
pub struct SceneTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub source: PathBuf,
}

/// Halve the image repeatedly down to 1x1. Level 0 is the image itself.
pub fn build_mip_chain(base: RgbaImage) -> Vec<RgbaImage> {
    let mut levels = vec![base];
    loop {
        let last = &levels[levels.len() - 1];
        let (w, h) = last.dimensions();
        if w <= 1 && h <= 1 {
            break;
        }
        let next = image::imageops::resize(last, (w / 2).max(1), (h / 2).max(1), FilterType::Triangle);
        levels.push(next);
    }
    levels
}

/// Shrink `img` so neither side exceeds `max_side`, keeping the aspect ratio.
pub fn fit_within(img: RgbaImage, max_side: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w <= max_side && h <= max_side {
        return img;
    }
    let scale = max_side as f64 / w.max(h) as f64;
    let nw = ((w as f64 * scale).round() as u32).clamp(1, max_side);
    let nh = ((h as f64 * scale).round() as u32).clamp(1, max_side);
    image::imageops::resize(&img, nw, nh, FilterType::Triangle)
}

pub fn decode_scene(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path).with_context(|| format!("Failed to decode scene image: {}", path.display()))?;
    Ok(img.to_rgba8())
}

/// Decode and mip every scene in parallel, then upload in order.
pub fn upload_scenes(gpu: &GpuContext, paths: &[PathBuf]) -> Result<Vec<SceneTexture>> {
    let max_side = gpu.device.limits().max_texture_dimension_2d;
    let chains: Vec<Vec<RgbaImage>> = paths
        .par_iter()
        .map(|path| -> Result<Vec<RgbaImage>> {
            let img = decode_scene(path)?;
            let (w, h) = img.dimensions();
            if w > max_side || h > max_side {
                log::warn!(
                    "Scene {} is {}x{}; downscaling to fit the GPU limit of {}",
                    path.display(),
                    w,
                    h,
                    max_side
                );
            }
            Ok(build_mip_chain(fit_within(img, max_side)))
        })
        .collect::<Result<_>>()?;

    let textures: Vec<SceneTexture> = paths
        .iter()
        .zip(chains)
        .map(|(path, levels)| upload_mip_chain(gpu, path, &levels))
        .collect();

    for tex in &textures {
        log::info!("Scene texture {}x{}: {}", tex.width, tex.height, tex.source.display());
    }
    Ok(textures)
}

fn upload_mip_chain(gpu: &GpuContext, path: &Path, levels: &[RgbaImage]) -> SceneTexture {
    let (width, height) = levels[0].dimensions();
    let texture = gpu.device.create_texture(&wgpu::TextureDescriptor {
        label: Some("scene_texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: levels.len() as u32,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TEXTURE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    for (mip_level, level) in levels.iter().enumerate() {
        let (w, h) = level.dimensions();
        gpu.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: mip_level as u32,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            level.as_raw(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * w),
                rows_per_image: Some(h),
            },
            wgpu::Extent3d {
                width: w,
                height: h,
                depth_or_array_layers: 1,
            },
        );
    }

    log::debug!("{} mip levels for {}", levels.len(), path.display());

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    SceneTexture {
        texture,
        view,
        width,
        height,
        source: path.to_path_buf(),
    }
}
