use std::mem;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

use crate::renderer::mesh::SceneVertex;

pub const MAX_PASSES_PER_FRAME: u32 = 2;
pub const MAX_DRAWS_PER_PASS: u32 = 64;
const DRAW_SLOT_STRIDE: u64 = 256;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DrawUniform {
    model: [[f32; 4]; 4],
    color: [f32; 4],
    clip_planes: [[f32; 4]; 2],
    clip_flags: [f32; 4],
}

impl DrawUniform {
    pub fn new(model: Mat4, color: [f32; 4], clip_planes: [Option<Vec4>; 2]) -> Self {
        let mut planes = [[0.0; 4]; 2];
        let mut flags = [0.0; 4];
        for (index, plane) in clip_planes.iter().enumerate() {
            if let Some(plane) = plane {
                planes[index] = plane.to_array();
                flags[index] = 1.0;
            }
        }

        Self {
            model: model.to_cols_array_2d(),
            color,
            clip_planes: planes,
            clip_flags: flags,
        }
    }
}

/// Lit, optionally clipped mesh pipeline. Per-draw uniforms live in one
/// buffer addressed by dynamic offset, one slot per (pass, draw) so the two
/// passes of a frame never overwrite each other.
#[derive(Debug)]
pub struct ScenePipeline {
    pipeline: wgpu::RenderPipeline,
    pub camera_bind_group_layout: wgpu::BindGroupLayout,
    draw_buffer: wgpu::Buffer,
    draw_bind_group: wgpu::BindGroup,
}

impl ScenePipeline {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Mesh Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../assets/shaders/scene_mesh.wgsl"
                ))
                .into(),
            ),
        });

        let camera_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Scene Camera Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let draw_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Scene Draw Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(mem::size_of::<DrawUniform>() as u64),
                    },
                    count: None,
                }],
            });

        let draw_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Scene Draw Uniform Buffer"),
            size: DRAW_SLOT_STRIDE * u64::from(MAX_PASSES_PER_FRAME * MAX_DRAWS_PER_PASS),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let draw_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Draw Bind Group"),
            layout: &draw_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &draw_buffer,
                    offset: 0,
                    size: NonZeroU64::new(mem::size_of::<DrawUniform>() as u64),
                }),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Mesh Pipeline Layout"),
            bind_group_layouts: &[&camera_bind_group_layout, &draw_bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Scene Mesh Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[SceneVertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            // Clipping opens closed meshes, so back faces must stay visible.
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: depth_format,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            camera_bind_group_layout,
            draw_buffer,
            draw_bind_group,
        }
    }

    pub fn pipeline(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }

    pub fn draw_bind_group(&self) -> &wgpu::BindGroup {
        &self.draw_bind_group
    }

    /// Writes a draw uniform and returns the dynamic offset to bind it with.
    pub fn write_draw(
        &self,
        queue: &wgpu::Queue,
        pass_slot: u32,
        draw_index: u32,
        uniform: &DrawUniform,
    ) -> Option<u32> {
        let offset = draw_slot_offset(pass_slot, draw_index)?;
        queue.write_buffer(&self.draw_buffer, u64::from(offset), bytemuck::bytes_of(uniform));
        Some(offset)
    }
}

fn draw_slot_offset(pass_slot: u32, draw_index: u32) -> Option<u32> {
    if pass_slot >= MAX_PASSES_PER_FRAME || draw_index >= MAX_DRAWS_PER_PASS {
        return None;
    }
    let slot = u64::from(pass_slot * MAX_DRAWS_PER_PASS + draw_index);
    u32::try_from(slot * DRAW_SLOT_STRIDE).ok()
}
