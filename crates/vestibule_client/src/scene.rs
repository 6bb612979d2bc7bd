use glam::{Mat4, Quat, Vec3};
use tracing::{debug, info};
use vestibule_core::events::{ControllerPose, Hand, SceneEvent};
use vestibule_core::{FrameInput, LayerAssignments, MeshId, PortalConfigError, PortalPlane, RenderLayer};

use crate::renderer::mesh::MeshShape;
use crate::renderer::MeshDraw;

const PORTAL_COLOR: [f32; 4] = [1.0, 1.0, 1.0, 1.0];
const PORTAL_GAZE_COLOR: [f32; 4] = [1.0, 0.93, 0.78, 1.0];
const INSIDE_FLOOR_COLOR: [f32; 4] = [0.32, 0.24, 0.38, 1.0];
const OUTSIDE_FLOOR_COLOR: [f32; 4] = [0.30, 0.55, 0.25, 1.0];
const PILLAR_COLOR: [f32; 4] = [0.75, 0.72, 0.68, 1.0];
const BOX_COLOR: [f32; 4] = [0.80, 0.52, 0.28, 1.0];
const WARNING_COLOR: [f32; 4] = [0.90, 0.15, 0.12, 1.0];
const CUBE_PALETTE: [[f32; 4]; 4] = [
    [0.20, 0.70, 0.90, 1.0],
    [0.95, 0.80, 0.20, 1.0],
    [0.60, 0.30, 0.85, 1.0],
    [0.25, 0.85, 0.50, 1.0],
];
const FLOOR_EXTENT: f32 = 24.0;
const MARKER_SIZE: f32 = 0.08;
const MARKER_REACH: f32 = 0.6;
/// cos(12 degrees): the portal warms up when the view is this close to it.
const GAZE_COS: f32 = 0.978;

#[derive(Debug, Clone, Copy)]
struct SceneObject {
    id: MeshId,
    shape: MeshShape,
    model: Mat4,
    color: [f32; 4],
    clipped: bool,
}

/// Inside room with a spinning cube and pillars, an outside yard with crates,
/// and the portal quad between them.
pub struct DemoScene {
    objects: Vec<SceneObject>,
    layers: LayerAssignments,
    portal: usize,
    portal_center: Vec3,
    spinner: usize,
    spinner_origin: Mat4,
    spin_seconds: f32,
    palette_index: usize,
    marker: usize,
    marker_placed: bool,
    awaiting_confirmation: bool,
    session_started_at: Option<f32>,
}

impl DemoScene {
    pub fn build(plane: &PortalPlane) -> Result<Self, PortalConfigError> {
        let mut scene = Self {
            objects: Vec::new(),
            layers: LayerAssignments::new(),
            portal: 0,
            portal_center: plane.position(),
            spinner: 0,
            spinner_origin: Mat4::IDENTITY,
            spin_seconds: 0.0,
            palette_index: 0,
            marker: 0,
            marker_placed: false,
            awaiting_confirmation: false,
            session_started_at: None,
        };

        let portal_position = plane.position();
        // Ground-level frame whose +Z points to the outside.
        let ground = Mat4::from_rotation_translation(
            plane.orientation(),
            Vec3::new(portal_position.x, 0.0, portal_position.z),
        );
        let placed = |scale: Vec3, translation: Vec3| {
            ground * Mat4::from_scale_rotation_translation(scale, Quat::IDENTITY, translation)
        };

        scene.portal = scene.spawn(
            MeshShape::Quad,
            Mat4::from_scale_rotation_translation(
                Vec3::new(plane.radius(), plane.radius(), 1.0),
                plane.orientation(),
                portal_position,
            ),
            PORTAL_COLOR,
            Some(RenderLayer::Portal),
            false,
        )?;

        // Both floors span the whole plane and rely on clipping to stay on
        // their own side of the portal.
        let floor = placed(
            Vec3::new(FLOOR_EXTENT, 0.1, FLOOR_EXTENT),
            Vec3::new(0.0, -0.05, 0.0),
        );
        scene.spawn(MeshShape::Cube, floor, INSIDE_FLOOR_COLOR, Some(RenderLayer::Inside), true)?;
        scene.spawn(MeshShape::Cube, floor, OUTSIDE_FLOOR_COLOR, Some(RenderLayer::Outside), true)?;

        scene.spinner_origin = placed(Vec3::splat(0.7), Vec3::new(0.0, 1.2, -3.0));
        scene.spinner = scene.spawn(
            MeshShape::Cube,
            scene.spinner_origin,
            CUBE_PALETTE[0],
            Some(RenderLayer::Inside),
            false,
        )?;

        for (x, z) in [(-2.5, -2.0), (2.5, -2.0), (-2.5, -5.0), (2.5, -5.0)] {
            scene.spawn(
                MeshShape::Cube,
                placed(Vec3::new(0.4, 3.0, 0.4), Vec3::new(x, 1.5, z)),
                PILLAR_COLOR,
                Some(RenderLayer::Inside),
                false,
            )?;
        }

        for (x, z, size) in [(-2.0, 2.5, 1.0), (2.0, 2.5, 1.0), (0.0, 6.0, 1.5)] {
            scene.spawn(
                MeshShape::Cube,
                placed(Vec3::splat(size), Vec3::new(x, size * 0.5, z)),
                BOX_COLOR,
                Some(RenderLayer::Outside),
                false,
            )?;
        }

        // No layer: visible from both sides and in both passes.
        scene.marker = scene.spawn(
            MeshShape::Cube,
            Mat4::from_scale(Vec3::splat(MARKER_SIZE)),
            PORTAL_COLOR,
            None,
            false,
        )?;

        scene.layers.validate()?;
        info!(meshes = scene.objects.len(), "demo scene built");
        Ok(scene)
    }

    fn spawn(
        &mut self,
        shape: MeshShape,
        model: Mat4,
        color: [f32; 4],
        layer: Option<RenderLayer>,
        clipped: bool,
    ) -> Result<usize, PortalConfigError> {
        let index = self.objects.len();
        let id = MeshId(index as u32);
        if let Some(layer) = layer {
            self.layers.assign(id, layer)?;
        }
        self.objects.push(SceneObject {
            id,
            shape,
            model,
            color,
            clipped,
        });
        Ok(index)
    }

    pub fn layers(&self) -> &LayerAssignments {
        &self.layers
    }

    #[cfg(test)]
    pub fn awaiting_confirmation(&self) -> bool {
        self.awaiting_confirmation
    }

    /// Applies this frame's events and animation. Returns the meshes that
    /// need the per-mesh clip half-space this frame.
    pub fn update(&mut self, frame: &FrameInput, events: &[SceneEvent]) -> Vec<MeshId> {
        if frame.entered_xr_session && self.session_started_at.is_none() {
            info!(elapsed = frame.elapsed_seconds, "immersive session entered");
            self.session_started_at = Some(frame.elapsed_seconds);
            self.spin_seconds = 0.0;
        }

        for event in events {
            match *event {
                SceneEvent::Trigger { hand, pose } => self.place_marker(hand, pose),
                SceneEvent::ButtonPressed { hand, button } => {
                    debug!(?hand, ?button, "controller button");
                    self.palette_index = (self.palette_index + 1) % CUBE_PALETTE.len();
                }
                SceneEvent::EndSessionRequested => self.awaiting_confirmation = true,
                SceneEvent::EndSessionCancelled | SceneEvent::EndSessionConfirmed => {
                    self.awaiting_confirmation = false;
                }
            }
        }

        // The cube holds still while an end-session confirmation is pending.
        if !self.awaiting_confirmation {
            self.spin_seconds += frame.delta_seconds;
        }
        let t = self.spin_seconds;
        let spin = Quat::from_rotation_y(t * 0.8) * Quat::from_rotation_x(t * 0.5);
        let spinner = &mut self.objects[self.spinner];
        spinner.model = self.spinner_origin * Mat4::from_quat(spin);
        spinner.color = if self.awaiting_confirmation {
            WARNING_COLOR
        } else {
            CUBE_PALETTE[self.palette_index]
        };

        let gaze = frame.camera_orientation * Vec3::NEG_Z;
        let to_portal = (self.portal_center - frame.camera_position).normalize_or_zero();
        self.objects[self.portal].color = if gaze.dot(to_portal) > GAZE_COS {
            PORTAL_GAZE_COLOR
        } else {
            PORTAL_COLOR
        };

        self.objects
            .iter()
            .filter(|object| object.clipped)
            .map(|object| object.id)
            .collect()
    }

    fn place_marker(&mut self, hand: Hand, pose: ControllerPose) {
        let position = pose.position + pose.orientation * Vec3::new(0.0, 0.0, -MARKER_REACH);
        let marker = &mut self.objects[self.marker];
        marker.model = Mat4::from_scale_rotation_translation(
            Vec3::splat(MARKER_SIZE),
            pose.orientation,
            position,
        );
        marker.color = match hand {
            Hand::Left => [0.95, 0.45, 0.10, 1.0],
            Hand::Right => [0.10, 0.55, 0.95, 1.0],
        };
        self.marker_placed = true;
        debug!(?hand, x = position.x, y = position.y, z = position.z, "marker placed");
    }

    pub fn draws(&self, clipped: &[MeshId]) -> Vec<MeshDraw> {
        self.objects
            .iter()
            .enumerate()
            .filter(|(index, _)| *index != self.marker || self.marker_placed)
            .map(|(_, object)| MeshDraw {
                id: object.id,
                shape: object.shape,
                model: object.model,
                color: object.color,
                clippable: clipped.contains(&object.id),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};
    use vestibule_core::events::{ControllerPose, Hand, SceneEvent};
    use vestibule_core::{FrameInput, PortalPlane, RenderLayer};

    use super::{DemoScene, PORTAL_COLOR, PORTAL_GAZE_COLOR, WARNING_COLOR};

    fn plane() -> PortalPlane {
        PortalPlane::new(Vec3::new(0.0, 1.2, 0.0), Quat::IDENTITY, 1.0).unwrap()
    }

    #[test]
    fn scene_assigns_exactly_one_portal_mesh() {
        let scene = DemoScene::build(&plane()).unwrap();
        assert_eq!(scene.layers().meshes_on(RenderLayer::Portal).count(), 1);
        assert!(scene.layers().meshes_on(RenderLayer::Inside).count() > 0);
        assert!(scene.layers().meshes_on(RenderLayer::Outside).count() > 0);
    }

    #[test]
    fn only_floors_are_clipped() {
        let mut scene = DemoScene::build(&plane()).unwrap();
        let clipped = scene.update(&FrameInput::default(), &[]);
        assert_eq!(clipped.len(), 2);

        let draws = scene.draws(&clipped);
        assert_eq!(draws.iter().filter(|draw| draw.clippable).count(), 2);
    }

    #[test]
    fn marker_appears_after_trigger() {
        let mut scene = DemoScene::build(&plane()).unwrap();
        let clipped = scene.update(&FrameInput::default(), &[]);
        let before = scene.draws(&clipped).len();

        let pose = ControllerPose {
            position: Vec3::new(0.0, 1.5, 2.0),
            orientation: Quat::IDENTITY,
        };
        let clipped = scene.update(
            &FrameInput::default(),
            &[SceneEvent::Trigger {
                hand: Hand::Right,
                pose,
            }],
        );
        let draws = scene.draws(&clipped);
        assert_eq!(draws.len(), before + 1);

        let marker = draws.last().unwrap();
        let position = marker.model.w_axis.truncate();
        assert!((position - Vec3::new(0.0, 1.5, 1.4)).length() < 1.0e-5);
        assert_eq!(scene.layers().layer_of(marker.id), None);
    }

    #[test]
    fn confirmation_flow_tracks_awaiting_state() {
        let mut scene = DemoScene::build(&plane()).unwrap();
        scene.update(&FrameInput::default(), &[SceneEvent::EndSessionRequested]);
        assert!(scene.awaiting_confirmation());
        scene.update(&FrameInput::default(), &[SceneEvent::EndSessionCancelled]);
        assert!(!scene.awaiting_confirmation());
    }

    #[test]
    fn spinner_advances_by_frame_delta_and_pauses_for_confirmation() {
        let mut scene = DemoScene::build(&plane()).unwrap();
        let frame = FrameInput {
            delta_seconds: 0.5,
            ..FrameInput::default()
        };

        scene.update(&frame, &[]);
        scene.update(&frame, &[]);
        assert!((scene.spin_seconds - 1.0).abs() < 1.0e-6);

        scene.update(&frame, &[SceneEvent::EndSessionRequested]);
        assert!((scene.spin_seconds - 1.0).abs() < 1.0e-6);
        assert_eq!(scene.objects[scene.spinner].color, WARNING_COLOR);
    }

    #[test]
    fn portal_is_tinted_while_looked_at() {
        let mut scene = DemoScene::build(&plane()).unwrap();
        let facing_portal = FrameInput {
            camera_position: Vec3::new(0.0, 1.2, 3.0),
            ..FrameInput::default()
        };
        scene.update(&facing_portal, &[]);
        assert_eq!(scene.objects[scene.portal].color, PORTAL_GAZE_COLOR);

        let looking_away = FrameInput {
            camera_orientation: Quat::from_rotation_y(std::f32::consts::PI),
            ..facing_portal
        };
        scene.update(&looking_away, &[]);
        assert_eq!(scene.objects[scene.portal].color, PORTAL_COLOR);
    }
}
