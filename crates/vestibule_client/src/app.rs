use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use tracing::{debug, error, info, warn};
use vestibule_core::events::{self, EventReceiver, EventSender, SceneEvent, SessionConfirmation};
use vestibule_core::{
    FrameInput, OffscreenSurface, PortalCompositor, PortalConfigError, PortalState, RenderBackend,
    VestibuleConfig,
};
use winit::application::ApplicationHandler;
use winit::error::OsError;
use winit::event::{DeviceEvent, ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Fullscreen, Window, WindowId};

use crate::camera::Camera;
use crate::controller::EmulatedController;
use crate::input::InputState;
use crate::renderer::{RenderError, Renderer, RendererInitError};
use crate::scene::DemoScene;

const DEFAULT_CONFIG_PATH: &str = "vestibule.toml";
const MAX_FRAME_DELTA_SECONDS: f32 = 0.1;

#[derive(Debug)]
enum StartupError {
    CreateWindow(OsError),
    Renderer(RendererInitError),
    Portal(PortalConfigError),
    Offscreen(RenderError),
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateWindow(err) => write!(f, "failed to create window: {err}"),
            Self::Renderer(err) => write!(f, "failed to initialize renderer: {err}"),
            Self::Portal(err) => write!(f, "failed to set up portal: {err}"),
            Self::Offscreen(err) => write!(f, "failed to allocate portal surface: {err}"),
        }
    }
}

impl std::error::Error for StartupError {}

impl From<PortalConfigError> for StartupError {
    fn from(err: PortalConfigError) -> Self {
        Self::Portal(err)
    }
}

struct Session {
    window: Arc<Window>,
    renderer: Renderer,
    compositor: PortalCompositor,
    scene: DemoScene,
}

pub struct VestibuleApp {
    config: VestibuleConfig,
    session: Option<Session>,
    portal_state: PortalState,
    camera: Camera,
    input: InputState,
    controllers: [EmulatedController; 2],
    confirmation: SessionConfirmation,
    events_tx: EventSender<SceneEvent>,
    events_rx: EventReceiver<SceneEvent>,
    xr_session: bool,
    start_time: Option<Instant>,
    last_frame: Option<Instant>,
}

impl VestibuleApp {
    pub fn new(config: VestibuleConfig) -> Self {
        let (events_tx, events_rx) = events::channel();
        Self {
            portal_state: PortalState::new(config.portal.initial_inside),
            camera: Camera::from_settings(&config.camera, 16.0 / 9.0),
            config,
            session: None,
            input: InputState::default(),
            controllers: [EmulatedController::right(), EmulatedController::left()],
            confirmation: SessionConfirmation::default(),
            events_tx,
            events_rx,
            xr_session: false,
            start_time: None,
            last_frame: None,
        }
    }

    fn start_session(&self, event_loop: &ActiveEventLoop) -> Result<Session, StartupError> {
        let attrs = Window::default_attributes().with_title(self.window_title());
        let window = Arc::new(
            event_loop
                .create_window(attrs)
                .map_err(StartupError::CreateWindow)?,
        );
        let mut renderer = Renderer::new(window.clone()).map_err(StartupError::Renderer)?;

        let plane = self.config.portal_plane()?;
        let scene = DemoScene::build(&plane)?;
        let (width, height) = renderer.size();
        let surface = OffscreenSurface::new(width, height, self.config.render.offscreen_scale)?;
        let compositor = PortalCompositor::new(
            plane,
            scene.layers().clone(),
            self.config.render.main_pass_clip,
            surface,
        )?;
        renderer
            .resize_offscreen(compositor.surface())
            .map_err(StartupError::Offscreen)?;

        Ok(Session {
            window,
            renderer,
            compositor,
            scene,
        })
    }

    fn window_title(&self) -> String {
        let side = if self.portal_state.inside_portal() {
            "inside"
        } else {
            "outside"
        };
        if self.confirmation.is_awaiting() {
            format!("Vestibule ({side}) - end session? J confirms, any other button cancels")
        } else {
            format!("Vestibule ({side})")
        }
    }

    fn toggle_xr_session(&mut self) {
        let Some(session) = self.session.as_ref() else {
            return;
        };

        self.xr_session = !self.xr_session;
        if self.xr_session {
            info!("entering immersive session");
            session
                .window
                .set_fullscreen(Some(Fullscreen::Borderless(None)));
        } else {
            info!("leaving immersive session");
            session.window.set_fullscreen(None);
        }
    }

    fn poll_controllers(&mut self) {
        for controller in self.controllers {
            let clicked = controller.clicked_buttons(&self.input);
            let pose = controller.pose(&self.camera);
            if let Some(event) = self.confirmation.poll(controller.hand(), &clicked, pose) {
                if self.events_tx.send(event).is_err() {
                    warn!("scene event channel closed, dropping {event:?}");
                }
            }
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = self
            .last_frame
            .map(|last| (now - last).as_secs_f32())
            .unwrap_or(0.0)
            .min(MAX_FRAME_DELTA_SECONDS);
        self.last_frame = Some(now);
        let elapsed = self
            .start_time
            .get_or_insert(now)
            .elapsed()
            .as_secs_f32();

        self.camera
            .update_look(self.input.mouse_delta, self.config.camera.look_sensitivity);
        let movement = self.camera.horizontal_movement_dir(&self.input);
        self.camera.position += movement * self.config.camera.move_speed * dt;

        if self.input.was_clicked(KeyCode::KeyP) {
            self.toggle_xr_session();
        }
        let was_awaiting = self.confirmation.is_awaiting();
        self.poll_controllers();
        let events = self.events_rx.drain();

        let frame_input = FrameInput {
            camera_position: self.camera.position,
            camera_orientation: self.camera.orientation(),
            delta_seconds: dt,
            elapsed_seconds: elapsed,
            entered_xr_session: self.xr_session,
        };

        let Some(session) = self.session.as_mut() else {
            return;
        };
        let swapchain_size = session.renderer.size();
        if let Err(err) =
            retry_offscreen_resize(&mut session.compositor, &mut session.renderer, swapchain_size)
        {
            error!("portal surface still unallocated after retry: {err}; shutting down");
            event_loop.exit();
            return;
        }
        let clipped = session.scene.update(&frame_input, &events);
        session.renderer.update_camera(&self.camera);

        let renderer = &mut session.renderer;
        let result = renderer
            .begin_frame(session.scene.draws(&clipped))
            .and_then(|()| {
                session
                    .compositor
                    .run_frame(&mut self.portal_state, &frame_input, &mut *renderer)
            })
            .and_then(|report| renderer.end_frame().map(|stats| (report, stats)));

        let mut title_changed = was_awaiting != self.confirmation.is_awaiting();
        match result {
            Ok((report, stats)) => {
                title_changed |= report.toggled;
                debug!(
                    scene_draws = stats.scene_draw_calls,
                    portal_draws = stats.portal_draw_calls,
                    passes = stats.passes,
                    inside = report.inside_portal,
                    "frame rendered"
                );
            }
            Err(RenderError::Surface(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost)) => {
                renderer.abandon_frame();
                renderer.reconfigure();
            }
            Err(RenderError::Surface(wgpu::SurfaceError::OutOfMemory)) => {
                error!("out of GPU memory; shutting down");
                event_loop.exit();
            }
            Err(err) => {
                renderer.abandon_frame();
                warn!("frame skipped: {err}");
            }
        }

        if title_changed {
            let title = self.window_title();
            if let Some(session) = self.session.as_ref() {
                session.window.set_title(&title);
            }
        }
        if events.iter().any(SceneEvent::ends_session) {
            info!("session ended by controller");
            event_loop.exit();
        }

        self.input.clear_frame();
    }

    fn resize(&mut self, width: u32, height: u32) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if width == 0 || height == 0 {
            return;
        }

        self.camera.aspect = width as f32 / height as f32;
        session.renderer.resize(width, height);
        if let Err(err) = session
            .compositor
            .resize(width, height, &mut session.renderer)
        {
            warn!("failed to resize portal surface, retrying next frame: {err}");
        }
    }
}

/// Resizes the offscreen surface when it lags behind the swapchain, which
/// only happens after a failed resize.
fn retry_offscreen_resize<B: RenderBackend>(
    compositor: &mut PortalCompositor,
    backend: &mut B,
    (width, height): (u32, u32),
) -> Result<(), B::Error> {
    if compositor.surface().viewport() == (width, height) {
        return Ok(());
    }
    compositor.resize(width, height, backend).map(|_| ())
}

impl ApplicationHandler for VestibuleApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.session.is_some() {
            return;
        }

        match self.start_session(event_loop) {
            Ok(session) => {
                let size = session.window.inner_size();
                if size.width > 0 && size.height > 0 {
                    self.camera.aspect = size.width as f32 / size.height as f32;
                }
                info!(
                    inside = self.portal_state.inside_portal(),
                    "window, renderer and portal initialized"
                );
                self.session = Some(session);
                self.last_frame = Some(Instant::now());
            }
            Err(err) => {
                error!("{err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.session.as_ref().map(|session| session.window.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("close requested; shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::Focused(false) => self.input.release_all(),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.input.press_key(code),
                        ElementState::Released => self.input.release_key(code),
                    }
                }
            }
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => {
                self.input.look_drag = state == ElementState::Pressed;
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if let DeviceEvent::MouseMotion { delta } = event {
            self.input
                .add_mouse_delta(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(session) = self.session.as_ref() {
            session.window.request_redraw();
        }
    }
}

pub fn run() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = match VestibuleConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(err) => {
            error!("{err}");
            return;
        }
    };
    info!(
        config = %config_path.display(),
        main_pass_clip = ?config.render.main_pass_clip,
        "vestibule starting"
    );

    let event_loop = match EventLoop::new() {
        Ok(loop_handle) => loop_handle,
        Err(err) => {
            error!("failed to create event loop: {err}");
            return;
        }
    };

    let mut app = VestibuleApp::new(config);
    if let Err(err) = event_loop.run_app(&mut app) {
        error!("event loop exited with error: {err}");
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};
    use vestibule_core::{
        LayerAssignments, MainPassClip, MeshId, OffscreenSurface, PassDescriptor,
        PortalCompositor, PortalPlane, RenderBackend, RenderLayer,
    };

    use super::{retry_offscreen_resize, StartupError};
    use crate::renderer::RenderError;

    #[derive(Default)]
    struct FlakyBackend {
        failures_left: u32,
        allocations: Vec<(u32, u32)>,
    }

    impl RenderBackend for FlakyBackend {
        type Error = &'static str;

        fn resize_offscreen(&mut self, surface: &OffscreenSurface) -> Result<(), Self::Error> {
            if self.failures_left > 0 {
                self.failures_left -= 1;
                return Err("out of memory");
            }
            self.allocations.push(surface.viewport());
            Ok(())
        }

        fn render_pass(
            &mut self,
            _pass: &PassDescriptor,
            _layers: &LayerAssignments,
        ) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    fn compositor() -> PortalCompositor {
        let plane = PortalPlane::new(Vec3::ZERO, Quat::IDENTITY, 1.0).unwrap();
        let mut layers = LayerAssignments::new();
        layers.assign(MeshId(0), RenderLayer::Portal).unwrap();
        let surface = OffscreenSurface::new(800, 600, 1.0).unwrap();
        PortalCompositor::new(plane, layers, MainPassClip::Complementary, surface).unwrap()
    }

    #[test]
    fn failed_window_resize_is_retried_on_the_next_frame() {
        let mut compositor = compositor();
        let mut backend = FlakyBackend {
            failures_left: 1,
            ..FlakyBackend::default()
        };

        assert!(compositor.resize(1280, 720, &mut backend).is_err());
        assert_eq!(retry_offscreen_resize(&mut compositor, &mut backend, (1280, 720)), Ok(()));
        assert_eq!(compositor.surface().viewport(), (1280, 720));
        assert_eq!(backend.allocations, vec![(1280, 720)]);

        assert_eq!(retry_offscreen_resize(&mut compositor, &mut backend, (1280, 720)), Ok(()));
        assert_eq!(backend.allocations.len(), 1);
    }

    #[test]
    fn retry_failure_is_reported() {
        let mut compositor = compositor();
        let mut backend = FlakyBackend {
            failures_left: 2,
            ..FlakyBackend::default()
        };

        assert!(compositor.resize(1280, 720, &mut backend).is_err());
        assert_eq!(
            retry_offscreen_resize(&mut compositor, &mut backend, (1280, 720)),
            Err("out of memory")
        );
        assert_eq!(compositor.surface().viewport(), (800, 600));
    }

    #[test]
    fn startup_reports_unallocated_offscreen_surface() {
        let err = StartupError::Offscreen(RenderError::FrameNotStarted);
        assert!(err.to_string().starts_with("failed to allocate portal surface"));
    }
}
