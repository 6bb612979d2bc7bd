use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PortalConfigError;
use crate::layers::{LayerAssignments, LayerMask, RenderLayer};
use crate::portal::{ClippingHalfSpace, ClippingPlanes, HalfSpace, PortalFacing, PortalPlane, PortalState};
use crate::surface::OffscreenSurface;

/// Clipping applied to environment meshes while drawing to the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MainPassClip {
    None,
    #[default]
    Complementary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Offscreen,
    Main,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTarget {
    Offscreen,
    Screen,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClipSet {
    /// Applied to every draw in the pass.
    pub global: Option<ClippingHalfSpace>,
    /// Applied to the meshes the scene reported as clippable this frame.
    pub scene_meshes: Option<ClippingHalfSpace>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassDescriptor {
    pub kind: PassKind,
    pub target: PassTarget,
    pub clip: ClipSet,
    pub layers: LayerMask,
    pub portal_facing: PortalFacing,
}

/// Host-supplied inputs for one display refresh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    pub camera_position: Vec3,
    pub camera_orientation: Quat,
    pub delta_seconds: f32,
    pub elapsed_seconds: f32,
    pub entered_xr_session: bool,
}

impl Default for FrameInput {
    fn default() -> Self {
        Self {
            camera_position: Vec3::ZERO,
            camera_orientation: Quat::IDENTITY,
            delta_seconds: 0.0,
            elapsed_seconds: 0.0,
            entered_xr_session: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub toggled: bool,
    pub inside_portal: bool,
}

/// Executes planned passes. Implementations own the GPU resources; the
/// compositor only decides what each pass draws.
pub trait RenderBackend {
    type Error;

    fn resize_offscreen(&mut self, surface: &OffscreenSurface) -> Result<(), Self::Error>;

    fn render_pass(
        &mut self,
        pass: &PassDescriptor,
        layers: &LayerAssignments,
    ) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone)]
pub struct PortalCompositor {
    plane: PortalPlane,
    clipping: ClippingPlanes,
    layers: LayerAssignments,
    main_pass_clip: MainPassClip,
    surface: OffscreenSurface,
}

impl PortalCompositor {
    pub fn new(
        plane: PortalPlane,
        layers: LayerAssignments,
        main_pass_clip: MainPassClip,
        surface: OffscreenSurface,
    ) -> Result<Self, PortalConfigError> {
        layers.validate()?;
        Ok(Self {
            clipping: ClippingPlanes::for_portal(&plane),
            plane,
            layers,
            main_pass_clip,
            surface,
        })
    }

    pub fn plane(&self) -> &PortalPlane {
        &self.plane
    }

    pub fn clipping(&self) -> &ClippingPlanes {
        &self.clipping
    }

    pub fn layers(&self) -> &LayerAssignments {
        &self.layers
    }

    pub fn surface(&self) -> &OffscreenSurface {
        &self.surface
    }

    pub fn resolution(&self) -> Vec2 {
        self.surface.resolution()
    }

    /// Offscreen pass: the side the viewer is not on, clipped to what lies
    /// beyond the portal plane.
    pub fn plan_offscreen_pass(&self, inside_portal: bool) -> PassDescriptor {
        let active = if inside_portal {
            HalfSpace::Inside
        } else {
            HalfSpace::Outside
        };
        let clip = self.clipping.get(active);

        PassDescriptor {
            kind: PassKind::Offscreen,
            target: PassTarget::Offscreen,
            clip: ClipSet {
                global: Some(clip),
                scene_meshes: Some(clip),
            },
            layers: RenderLayer::for_side(!inside_portal).mask(),
            portal_facing: PortalFacing::for_side(inside_portal),
        }
    }

    /// Main pass: the viewer's own side plus the portal mesh.
    pub fn plan_main_pass(&self, inside_portal: bool) -> PassDescriptor {
        let scene_meshes = match self.main_pass_clip {
            MainPassClip::None => None,
            MainPassClip::Complementary => {
                let complement = if inside_portal {
                    HalfSpace::Outside
                } else {
                    HalfSpace::Inside
                };
                Some(self.clipping.get(complement))
            }
        };

        PassDescriptor {
            kind: PassKind::Main,
            target: PassTarget::Screen,
            clip: ClipSet {
                global: None,
                scene_meshes,
            },
            layers: RenderLayer::for_side(inside_portal).mask() | LayerMask::PORTAL,
            portal_facing: PortalFacing::for_side(inside_portal),
        }
    }

    pub fn render_offscreen_pass<B: RenderBackend>(
        &self,
        inside_portal: bool,
        backend: &mut B,
    ) -> Result<(), B::Error> {
        let pass = self.plan_offscreen_pass(inside_portal);
        debug_assert!(pass.layers.has_single_environment());
        debug_assert!(!pass.layers.contains(LayerMask::PORTAL));
        backend.render_pass(&pass, &self.layers)
    }

    pub fn render_main_pass<B: RenderBackend>(
        &self,
        inside_portal: bool,
        backend: &mut B,
    ) -> Result<(), B::Error> {
        let pass = self.plan_main_pass(inside_portal);
        debug_assert!(pass.layers.has_single_environment());
        debug_assert!(pass.layers.contains(LayerMask::PORTAL));
        backend.render_pass(&pass, &self.layers)
    }

    /// Both passes for one frame, reading a single `inside_portal` value.
    pub fn render_frame<B: RenderBackend>(
        &self,
        state: &PortalState,
        backend: &mut B,
    ) -> Result<(), B::Error> {
        let inside_portal = state.inside_portal();
        self.render_offscreen_pass(inside_portal, backend)?;
        self.render_main_pass(inside_portal, backend)
    }

    /// Advances the viewer side once, then renders the frame.
    pub fn run_frame<B: RenderBackend>(
        &self,
        state: &mut PortalState,
        input: &FrameInput,
        backend: &mut B,
    ) -> Result<FrameReport, B::Error> {
        let toggled = state.advance(input.camera_position, &self.plane);
        self.render_frame(state, backend)?;
        Ok(FrameReport {
            toggled,
            inside_portal: state.inside_portal(),
        })
    }

    /// Returns `Ok(false)` when the size did not change. The new size is only
    /// recorded once the backend has allocated it, so a failed resize can be
    /// retried with the same dimensions.
    pub fn resize<B: RenderBackend>(
        &mut self,
        width: u32,
        height: u32,
        backend: &mut B,
    ) -> Result<bool, B::Error> {
        let mut next = self.surface;
        if !next.resize(width, height) {
            return Ok(false);
        }

        info!(
            width,
            height,
            target_width = next.width(),
            target_height = next.height(),
            "resizing portal offscreen surface"
        );
        backend.resize_offscreen(&next)?;
        self.surface = next;
        Ok(true)
    }
}
