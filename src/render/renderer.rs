use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use wgpu;
use wgpu::util::DeviceExt;

use super::frame::{padded_bytes_per_row, RenderTarget, TEXTURE_FORMAT};
use super::gpu::GpuContext;
use super::pipeline::{ScenePipeline, QUAD_VERTICES};
use super::texture::{self, SceneTexture};
use super::{FrameRenderer, RenderParameters};
use crate::capture::Frame;
use crate::error::ConfigurationError;
use crate::scene::fader::SceneFader;
use crate::shaders::loader::ShaderSource;
use crate::shaders::reflect::{InputKind, ShaderInput};

/// Host-side value written into a uniform slot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec2([f32; 2]),
}

impl UniformValue {
    pub fn bytes(&self) -> &[u8] {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v),
            UniformValue::Vec2(v) => bytemuck::cast_slice(v),
        }
    }
}

/// Value of a buffer-backed input for this frame.
pub fn uniform_value(input: ShaderInput, params: &RenderParameters) -> Option<UniformValue> {
    let value = match input {
        ShaderInput::Time => UniformValue::Float(params.elapsed_time as f32),
        ShaderInput::Resolution => {
            UniformValue::Vec2([params.resolution.0 as f32, params.resolution.1 as f32])
        }
        ShaderInput::Bass => UniformValue::Float(params.bass_energy),
        ShaderInput::Kick => UniformValue::Float(if params.kick_detected { 1.0 } else { 0.0 }),
        ShaderInput::MixFactor => UniformValue::Float(params.fader.blend as f32),
        ShaderInput::SceneCurrent | ShaderInput::SceneNext | ShaderInput::SceneSampler => return None,
    };
    Some(value)
}

/// Reject output sizes the device cannot hold as a render target or read
/// back in one staging buffer.
pub fn check_target_limits(width: u32, height: u32, limits: &wgpu::Limits) -> Result<(), ConfigurationError> {
    let max = limits.max_texture_dimension_2d;
    let readback = padded_bytes_per_row(width) as u64 * height as u64;
    if width > max || height > max || readback > limits.max_buffer_size {
        return Err(ConfigurationError::ResolutionTooLarge { width, height, max });
    }
    Ok(())
}

/// wgpu renderer for one shader style at a fixed resolution.
pub struct GpuRenderer {
    gpu: GpuContext,
    pipeline: ScenePipeline,
    target: RenderTarget,
    vertex_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    uniform_buffers: Vec<(ShaderInput, wgpu::Buffer)>,
    // Keyed by (current, next) scene index; the scene set never changes.
    bind_groups: HashMap<(usize, usize), wgpu::BindGroup>,
}

impl GpuRenderer {
    pub fn new(gpu: GpuContext, source: &ShaderSource, width: u32, height: u32) -> Result<Self, ConfigurationError> {
        check_target_limits(width, height, &gpu.device.limits())?;
        let pipeline = ScenePipeline::new(&gpu, source, TEXTURE_FORMAT)?;
        let target = RenderTarget::new(&gpu, width, height);

        let vertex_buffer = gpu.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_vertices"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let sampler = gpu.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("scene_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        // One small buffer per declared scalar/vector input.
        let uniform_buffers = pipeline
            .slots
            .iter()
            .filter(|(input, _)| matches!(input.kind(), InputKind::Float | InputKind::Vec2))
            .map(|(input, _)| {
                let buffer = gpu.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(input.name()),
                    size: 16,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                (input, buffer)
            })
            .collect();

        Ok(Self {
            gpu,
            pipeline,
            target,
            vertex_buffer,
            sampler,
            uniform_buffers,
            bind_groups: HashMap::new(),
        })
    }

    /// Decode, mipmap and upload scene images for this renderer's device.
    pub fn upload_scenes(&self, paths: &[PathBuf]) -> Result<Vec<SceneTexture>> {
        texture::upload_scenes(&self.gpu, paths)
    }

    fn ensure_bind_group(&mut self, scenes: &SceneFader<SceneTexture>) {
        let state = scenes.state();
        let key = (state.current_index, state.next_index);
        let Self {
            ref gpu,
            ref pipeline,
            ref sampler,
            ref uniform_buffers,
            ref mut bind_groups,
            ..
        } = *self;

        bind_groups.entry(key).or_insert_with(|| {
            let current = scenes.current_texture();
            let next = scenes.next_texture();
            let entries: Vec<wgpu::BindGroupEntry> = pipeline
                .slots
                .iter()
                .filter_map(|(input, binding)| {
                    let resource = match input {
                        ShaderInput::SceneCurrent => wgpu::BindingResource::TextureView(&current.view),
                        ShaderInput::SceneNext => wgpu::BindingResource::TextureView(&next.view),
                        ShaderInput::SceneSampler => wgpu::BindingResource::Sampler(sampler),
                        _ => uniform_buffers
                            .iter()
                            .find(|(i, _)| *i == input)?
                            .1
                            .as_entire_binding(),
                    };
                    Some(wgpu::BindGroupEntry { binding, resource })
                })
                .collect();

            log::debug!(
                "Creating bind group for {} -> {}",
                current.source.display(),
                next.source.display()
            );
            gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("scene_bind_group"),
                layout: &pipeline.bind_group_layout,
                entries: &entries,
            })
        });
    }
}

impl FrameRenderer for GpuRenderer {
    type Texture = SceneTexture;

    fn render_frame(&mut self, params: &RenderParameters, scenes: &SceneFader<SceneTexture>) -> Result<Frame> {
        for (input, buffer) in &self.uniform_buffers {
            if let Some(value) = uniform_value(*input, params) {
                self.gpu.queue.write_buffer(buffer, 0, value.bytes());
            }
        }

        self.ensure_bind_group(scenes);
        let state = scenes.state();
        let bind_group = &self.bind_groups[&(state.current_index, state.next_index)];

        self.target.draw_and_readback(
            &self.gpu,
            &self.pipeline.pipeline,
            bind_group,
            &self.vertex_buffer,
            QUAD_VERTICES.len() as u32,
        )
    }
}
