use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec2, Vec3};
use vestibule_core::config::CameraSettings;
use winit::keyboard::KeyCode;

use crate::input::InputState;

const PITCH_LIMIT: f32 = 89.0 * std::f32::consts::PI / 180.0;

/// (key, forward, strafe) contributions on the ground plane.
const MOVE_KEYS: [(KeyCode, f32, f32); 8] = [
    (KeyCode::ArrowUp, 1.0, 0.0),
    (KeyCode::KeyW, 1.0, 0.0),
    (KeyCode::ArrowDown, -1.0, 0.0),
    (KeyCode::KeyS, -1.0, 0.0),
    (KeyCode::ArrowRight, 0.0, 1.0),
    (KeyCode::KeyD, 0.0, 1.0),
    (KeyCode::ArrowLeft, 0.0, -1.0),
    (KeyCode::KeyA, 0.0, -1.0),
];

#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 1.6, 3.0),
            // Looking down -Z, toward the portal.
            yaw: -FRAC_PI_2,
            pitch: 0.0,
            fov: 50.0_f32.to_radians(),
            aspect: 16.0 / 9.0,
            near: 0.05,
            far: 200.0,
        }
    }
}

impl Camera {
    pub fn from_settings(settings: &CameraSettings, aspect: f32) -> Self {
        Self {
            position: settings.position,
            fov: settings.fov_degrees.to_radians(),
            aspect,
            ..Self::default()
        }
    }

    /// Drag delta in pixels. Dragging up tilts the view up.
    pub fn update_look(&mut self, drag: Vec2, sensitivity: f32) {
        let turn = drag * sensitivity;
        self.yaw += turn.x;
        self.pitch = (self.pitch - turn.y).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Unit direction from the held movement keys, flattened onto the ground.
    pub fn horizontal_movement_dir(&self, input: &InputState) -> Vec3 {
        let axes = MOVE_KEYS
            .iter()
            .filter(|(key, _, _)| input.is_pressed(*key))
            .fold(Vec2::ZERO, |acc, (_, forward, strafe)| acc + Vec2::new(*forward, *strafe));
        if axes == Vec2::ZERO {
            return Vec3::ZERO;
        }

        let look = self.forward_direction();
        let ahead = Vec3::new(look.x, 0.0, look.z).normalize_or_zero();
        let right = ahead.cross(Vec3::Y);
        (ahead * axes.x + right * axes.y).normalize_or_zero()
    }

    /// Yaw about +Y then pitch about the camera's X axis, starting from a
    /// -Z forward. `yaw = -pi/2` is the identity.
    pub fn orientation(&self) -> Quat {
        Quat::from_rotation_y(-(self.yaw + FRAC_PI_2)) * Quat::from_rotation_x(self.pitch)
    }

    pub fn forward_direction(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        let view = Mat4::look_to_rh(self.position, self.forward_direction(), Vec3::Y);
        let projection = Mat4::perspective_rh(
            self.fov,
            self.aspect.max(0.0001),
            self.near.max(0.0001),
            self.far.max(self.near + 0.0001),
        );

        projection * view
    }
}
