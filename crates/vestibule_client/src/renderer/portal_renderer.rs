use std::mem;
use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};
use vestibule_core::{OffscreenSurface, PortalFacing};

use crate::renderer::mesh::{GpuMesh, SceneVertex};

const PORTAL_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const PORTAL_TINT: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
pub const MAX_PORTAL_DRAWS: u32 = 4;
const PARAMS_SLOT_STRIDE: u64 = 256;

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct PortalParamsUniform {
    model: [[f32; 4]; 4],
    resolution: [f32; 4],
    tint: [f32; 4],
}

struct PortalRenderTarget {
    _color_texture: wgpu::Texture,
    color_view: wgpu::TextureView,
    _depth_texture: wgpu::Texture,
    depth_view: wgpu::TextureView,
    sample_bind_group: wgpu::BindGroup,
}

/// Owns the offscreen target holding the far side of the portal and the
/// pipelines that composite it back through the portal mesh.
pub struct PortalRenderer {
    front_pipeline: wgpu::RenderPipeline,
    back_pipeline: wgpu::RenderPipeline,
    portal_texture_bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    params_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
    target: PortalRenderTarget,
    target_width: u32,
    target_height: u32,
    target_generation: u64,
    resolution: Vec2,
    color_format: wgpu::TextureFormat,
}

impl PortalRenderer {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
        camera_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Portal Surface Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../assets/shaders/portal_surface.wgsl"
                ))
                .into(),
            ),
        });

        let portal_texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Portal Texture Bind Group Layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: wgpu::TextureViewDimension::D2,
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
            });

        let params_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Portal Params Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(
                            mem::size_of::<PortalParamsUniform>() as u64
                        ),
                    },
                    count: None,
                }],
            });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Portal Offscreen Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Portal Params Buffer"),
            size: PARAMS_SLOT_STRIDE * u64::from(MAX_PORTAL_DRAWS),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let params_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Portal Params Bind Group"),
            layout: &params_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &params_buffer,
                    offset: 0,
                    size: NonZeroU64::new(mem::size_of::<PortalParamsUniform>() as u64),
                }),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Portal Surface Pipeline Layout"),
            bind_group_layouts: &[
                camera_bind_group_layout,
                &portal_texture_bind_group_layout,
                &params_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        let front_pipeline = create_surface_pipeline(
            device,
            &pipeline_layout,
            &shader,
            color_format,
            depth_format,
            PortalFacing::Front,
        );
        let back_pipeline = create_surface_pipeline(
            device,
            &pipeline_layout,
            &shader,
            color_format,
            depth_format,
            PortalFacing::Back,
        );

        let target = create_target(
            device,
            1,
            1,
            color_format,
            &portal_texture_bind_group_layout,
            &sampler,
        );

        Self {
            front_pipeline,
            back_pipeline,
            portal_texture_bind_group_layout,
            params_buffer,
            params_bind_group,
            sampler,
            target,
            target_width: 1,
            target_height: 1,
            target_generation: 0,
            resolution: Vec2::ONE,
            color_format,
        }
    }

    /// Reallocates the offscreen target for the surface's current size. The
    /// old texture and its bind group are dropped here.
    pub fn resize(&mut self, device: &wgpu::Device, surface: &OffscreenSurface) {
        self.resolution = surface.resolution();
        self.target_generation = surface.generation();

        let (width, height) = (surface.width(), surface.height());
        if width == self.target_width && height == self.target_height {
            return;
        }

        self.target = create_target(
            device,
            width,
            height,
            self.color_format,
            &self.portal_texture_bind_group_layout,
            &self.sampler,
        );
        self.target_width = width;
        self.target_height = height;
    }

    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    pub fn target_generation(&self) -> u64 {
        self.target_generation
    }

    pub fn color_view(&self) -> &wgpu::TextureView {
        &self.target.color_view
    }

    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.target.depth_view
    }

    /// Draws the portal meshes into the current pass. Returns the number of
    /// draw calls issued.
    pub fn render_surfaces(
        &self,
        queue: &wgpu::Queue,
        render_pass: &mut wgpu::RenderPass<'_>,
        camera_bind_group: &wgpu::BindGroup,
        quad: &GpuMesh,
        models: &[Mat4],
        facing: PortalFacing,
    ) -> u32 {
        let pipeline = match facing {
            PortalFacing::Front => &self.front_pipeline,
            PortalFacing::Back => &self.back_pipeline,
        };
        render_pass.set_pipeline(pipeline);
        render_pass.set_bind_group(0, camera_bind_group, &[]);
        render_pass.set_bind_group(1, &self.target.sample_bind_group, &[]);
        quad.bind(render_pass);

        let mut draw_calls = 0;
        for (index, model) in models.iter().take(MAX_PORTAL_DRAWS as usize).enumerate() {
            let params = PortalParamsUniform {
                model: model.to_cols_array_2d(),
                resolution: [self.resolution.x, self.resolution.y, 0.0, 0.0],
                tint: PORTAL_TINT,
            };
            let offset = index as u64 * PARAMS_SLOT_STRIDE;
            queue.write_buffer(&self.params_buffer, offset, bytemuck::bytes_of(&params));

            render_pass.set_bind_group(2, &self.params_bind_group, &[offset as u32]);
            render_pass.draw_indexed(0..quad.index_count, 0, 0..1);
            draw_calls += 1;
        }

        draw_calls
    }
}

fn create_surface_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
    depth_format: wgpu::TextureFormat,
    facing: PortalFacing,
) -> wgpu::RenderPipeline {
    let (label, cull_mode) = match facing {
        PortalFacing::Front => ("Portal Surface Pipeline Front", wgpu::Face::Back),
        PortalFacing::Back => ("Portal Surface Pipeline Back", wgpu::Face::Front),
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[SceneVertex::desc()],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: color_format,
                blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(cull_mode),
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: depth_format,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

fn create_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    color_format: wgpu::TextureFormat,
    portal_texture_bind_group_layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
) -> PortalRenderTarget {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let color_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Portal Offscreen Color Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: color_format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

    let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Portal Offscreen Depth Texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: PORTAL_DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

    let sample_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Portal Offscreen Sample Bind Group"),
        layout: portal_texture_bind_group_layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&color_view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    PortalRenderTarget {
        _color_texture: color_texture,
        color_view,
        _depth_texture: depth_texture,
        depth_view,
        sample_bind_group,
    }
}
