use bytemuck::{Pod, Zeroable};
use wgpu;

use super::gpu::GpuContext;
use crate::error::ConfigurationError;
use crate::shaders::loader::ShaderSource;
use crate::shaders::reflect::{self, InputKind, ShaderInput, UniformSlots};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Two triangles covering clip space, UV origin at the bottom-left.
pub const QUAD_VERTICES: [QuadVertex; 6] = [
    QuadVertex { position: [-1.0, -1.0], uv: [0.0, 0.0] },
    QuadVertex { position: [1.0, -1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [-1.0, 1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [-1.0, 1.0], uv: [0.0, 1.0] },
    QuadVertex { position: [1.0, -1.0], uv: [1.0, 0.0] },
    QuadVertex { position: [1.0, 1.0], uv: [1.0, 1.0] },
];

impl QuadVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Linked program for one style plus the slots it declares.
pub struct ScenePipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub slots: UniformSlots,
}

impl ScenePipeline {
    pub fn new(
        gpu: &GpuContext,
        source: &ShaderSource,
        texture_format: wgpu::TextureFormat,
    ) -> Result<Self, ConfigurationError> {
        let wgsl = source.combined();
        let slots = reflect::compile_shader(source.style, &wgsl)?;
        log::info!(
            "Shader '{}' declares {} of {} inputs",
            source.style,
            slots.len(),
            ShaderInput::ALL.len()
        );
        for input in ShaderInput::ALL {
            if !slots.contains(input) {
                log::debug!("Shader '{}' ignores '{}'", source.style, input.name());
            }
        }

        let entries: Vec<wgpu::BindGroupLayoutEntry> =
            slots.iter().map(|(input, binding)| layout_entry(input, binding)).collect();

        let built = gpu.validated(|device| {
            let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("scene_shader"),
                source: wgpu::ShaderSource::Wgsl(wgsl.as_str().into()),
            });

            let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("scene_bind_group_layout"),
                entries: &entries,
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("scene_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("scene_render_pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: Some(reflect::VERTEX_ENTRY),
                    buffers: &[QuadVertex::layout()],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some(reflect::FRAGMENT_ENTRY),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: texture_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    unclipped_depth: false,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    conservative: false,
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });

            (pipeline, bind_group_layout)
        });

        let (pipeline, bind_group_layout) = built.map_err(|message| ConfigurationError::ShaderCompile {
            style: source.style.to_string(),
            message,
        })?;

        Ok(Self {
            pipeline,
            bind_group_layout,
            slots,
        })
    }
}

fn layout_entry(input: ShaderInput, binding: u32) -> wgpu::BindGroupLayoutEntry {
    let ty = match input.kind() {
        InputKind::Float | InputKind::Vec2 => wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        InputKind::Texture => wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        InputKind::Sampler => wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
    };

    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty,
        count: None,
    }
}
