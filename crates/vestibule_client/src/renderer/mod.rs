pub mod mesh;
pub mod portal_renderer;
pub mod scene_pipeline;

use std::fmt;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use tracing::{debug, warn};
use vestibule_core::{
    LayerAssignments, LayerMask, MeshId, OffscreenSurface, PassDescriptor, PassTarget,
    RenderBackend, RenderLayer,
};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::camera::Camera;
use crate::renderer::mesh::{MeshBuffers, MeshShape};
use crate::renderer::portal_renderer::PortalRenderer;
use crate::renderer::scene_pipeline::{DrawUniform, ScenePipeline, MAX_PASSES_PER_FRAME};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const INSIDE_CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.08,
    g: 0.06,
    b: 0.10,
    a: 1.0,
};
const OUTSIDE_CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.529,
    g: 0.808,
    b: 0.922,
    a: 1.0,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
}

impl CameraUniform {
    fn from_view_projection(view_proj: Mat4, camera_pos: Vec3) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            camera_pos: [camera_pos.x, camera_pos.y, camera_pos.z, 0.0],
        }
    }
}

/// One mesh instance the scene wants drawn this frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshDraw {
    pub id: MeshId,
    pub shape: MeshShape,
    pub model: Mat4,
    pub color: [f32; 4],
    /// Receives the per-mesh clip half-space of each pass.
    pub clippable: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RenderFrameStats {
    pub scene_draw_calls: u32,
    pub portal_draw_calls: u32,
    pub passes: u32,
}

#[derive(Debug)]
struct DepthTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthTexture {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Vestibule Depth Texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

struct FrameInFlight {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
    draws: Vec<MeshDraw>,
    stats: RenderFrameStats,
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth_texture: DepthTexture,
    scene_pipeline: ScenePipeline,
    portal_renderer: PortalRenderer,
    meshes: MeshBuffers,
    camera_uniform_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    frame: Option<FrameInFlight>,
}

#[derive(Debug)]
pub enum RendererInitError {
    CreateSurface(wgpu::CreateSurfaceError),
    RequestAdapter(wgpu::RequestAdapterError),
    RequestDevice(wgpu::RequestDeviceError),
    UnsupportedSurface,
}

impl fmt::Display for RendererInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateSurface(err) => write!(f, "failed to create surface: {err}"),
            Self::RequestAdapter(err) => write!(f, "failed to request adapter: {err}"),
            Self::RequestDevice(err) => write!(f, "failed to request device: {err}"),
            Self::UnsupportedSurface => write!(f, "adapter does not support this surface"),
        }
    }
}

impl std::error::Error for RendererInitError {}

#[derive(Debug)]
pub enum RenderError {
    Surface(wgpu::SurfaceError),
    FrameNotStarted,
    TooManyPasses,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Surface(err) => write!(f, "surface error: {err}"),
            Self::FrameNotStarted => write!(f, "render pass issued outside of a frame"),
            Self::TooManyPasses => {
                write!(f, "more than {MAX_PASSES_PER_FRAME} passes issued in one frame")
            }
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Surface(err) => Some(err),
            _ => None,
        }
    }
}

impl From<wgpu::SurfaceError> for RenderError {
    fn from(err: wgpu::SurfaceError) -> Self {
        Self::Surface(err)
    }
}

impl Renderer {
    pub fn new(window: Arc<Window>) -> Result<Self, RendererInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(RendererInitError::CreateSurface)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(RendererInitError::RequestAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Vestibule Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(RendererInitError::RequestDevice)?;

        let initial_size = window.inner_size();
        let surface_config = surface
            .get_default_config(&adapter, initial_size.width.max(1), initial_size.height.max(1))
            .ok_or(RendererInitError::UnsupportedSurface)?;

        surface.configure(&device, &surface_config);

        let scene_pipeline = ScenePipeline::new(&device, surface_config.format, DEPTH_FORMAT);
        let portal_renderer = PortalRenderer::new(
            &device,
            surface_config.format,
            DEPTH_FORMAT,
            &scene_pipeline.camera_bind_group_layout,
        );
        let meshes = MeshBuffers::new(&device);

        let initial_camera_uniform =
            CameraUniform::from_view_projection(Mat4::IDENTITY, Vec3::ZERO);
        let camera_uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Camera Uniform Buffer"),
            contents: bytemuck::bytes_of(&initial_camera_uniform),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene Camera Bind Group"),
            layout: &scene_pipeline.camera_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_uniform_buffer.as_entire_binding(),
            }],
        });
        let depth_texture = DepthTexture::new(&device, surface_config.width, surface_config.height);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            depth_texture,
            scene_pipeline,
            portal_renderer,
            meshes,
            camera_uniform_buffer,
            camera_bind_group,
            frame: None,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.surface_config.width, self.surface_config.height)
    }

    /// Swapchain and main depth buffer. The offscreen target follows through
    /// `RenderBackend::resize_offscreen`.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_texture = DepthTexture::new(&self.device, width, height);
    }

    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.surface_config);
    }

    pub fn update_camera(&mut self, camera: &Camera) {
        let uniform =
            CameraUniform::from_view_projection(camera.view_projection_matrix(), camera.position);
        self.queue
            .write_buffer(&self.camera_uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    /// Acquires the swapchain image. Passes issued until `end_frame` record
    /// into one command encoder.
    pub fn begin_frame(&mut self, draws: Vec<MeshDraw>) -> Result<(), RenderError> {
        let surface_texture = self.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Vestibule Command Encoder"),
            });

        self.frame = Some(FrameInFlight {
            surface_texture,
            view,
            encoder,
            draws,
            stats: RenderFrameStats::default(),
        });
        Ok(())
    }

    pub fn end_frame(&mut self) -> Result<RenderFrameStats, RenderError> {
        let frame = self.frame.take().ok_or(RenderError::FrameNotStarted)?;
        self.queue.submit(std::iter::once(frame.encoder.finish()));
        frame.surface_texture.present();
        Ok(frame.stats)
    }

    /// Drops a frame that failed midway without presenting it.
    pub fn abandon_frame(&mut self) {
        self.frame = None;
    }
}

impl RenderBackend for Renderer {
    type Error = RenderError;

    fn resize_offscreen(&mut self, surface: &OffscreenSurface) -> Result<(), Self::Error> {
        self.portal_renderer.resize(&self.device, surface);
        let (width, height) = self.portal_renderer.target_size();
        debug!(
            width,
            height,
            generation = self.portal_renderer.target_generation(),
            "portal offscreen target ready"
        );
        Ok(())
    }

    fn render_pass(
        &mut self,
        pass: &PassDescriptor,
        layers: &LayerAssignments,
    ) -> Result<(), Self::Error> {
        let mut frame = self.frame.take().ok_or(RenderError::FrameNotStarted)?;
        let pass_slot = frame.stats.passes;
        if pass_slot >= MAX_PASSES_PER_FRAME {
            self.frame = Some(frame);
            return Err(RenderError::TooManyPasses);
        }

        let (color_view, depth_view, label) = match pass.target {
            PassTarget::Offscreen => (
                self.portal_renderer.color_view(),
                self.portal_renderer.depth_view(),
                "Portal Offscreen Pass",
            ),
            PassTarget::Screen => (&frame.view, &self.depth_texture.view, "Vestibule Main Pass"),
        };
        let clear_color = if pass.layers.contains(LayerMask::INSIDE) {
            INSIDE_CLEAR_COLOR
        } else {
            OUTSIDE_CLEAR_COLOR
        };

        {
            let mut render_pass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(self.scene_pipeline.pipeline());
            render_pass.set_bind_group(0, &self.camera_bind_group, &[]);

            let global = pass.clip.global.map(|clip| clip.as_vec4());
            let scene_clip = pass.clip.scene_meshes.map(|clip| clip.as_vec4());
            let mut portal_models = Vec::new();
            let mut draw_index = 0;
            for draw in &frame.draws {
                if !layers.is_visible(draw.id, pass.layers) {
                    continue;
                }
                if layers.layer_of(draw.id) == Some(RenderLayer::Portal) {
                    portal_models.push(draw.model);
                    continue;
                }

                let mesh_clip = if draw.clippable { scene_clip } else { None };
                let uniform = DrawUniform::new(draw.model, draw.color, [global, mesh_clip]);
                let Some(offset) =
                    self.scene_pipeline
                        .write_draw(&self.queue, pass_slot, draw_index, &uniform)
                else {
                    warn!(mesh = %draw.id, "per-pass draw limit reached, skipping remaining meshes");
                    break;
                };

                let mesh = self.meshes.get(draw.shape);
                render_pass.set_bind_group(1, self.scene_pipeline.draw_bind_group(), &[offset]);
                mesh.bind(&mut render_pass);
                render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                draw_index += 1;
            }
            frame.stats.scene_draw_calls += draw_index;

            if !portal_models.is_empty() {
                frame.stats.portal_draw_calls += self.portal_renderer.render_surfaces(
                    &self.queue,
                    &mut render_pass,
                    &self.camera_bind_group,
                    self.meshes.get(MeshShape::Quad),
                    &portal_models,
                    pass.portal_facing,
                );
            }
        }

        frame.stats.passes += 1;
        self.frame = Some(frame);
        Ok(())
    }
}
