use glam::Vec3;
use vestibule_core::events::{ControllerButton, ControllerPose, Hand};
use winit::keyboard::KeyCode;

use crate::camera::Camera;
use crate::input::InputState;

const RIGHT_BINDINGS: [(KeyCode, ControllerButton); 5] = [
    (KeyCode::Space, ControllerButton::Trigger),
    (KeyCode::KeyJ, ControllerButton::Primary),
    (KeyCode::KeyK, ControllerButton::Secondary),
    (KeyCode::KeyL, ControllerButton::Squeeze),
    (KeyCode::KeyU, ControllerButton::Thumbstick),
];

const LEFT_BINDINGS: [(KeyCode, ControllerButton); 5] = [
    (KeyCode::KeyF, ControllerButton::Trigger),
    (KeyCode::KeyV, ControllerButton::Primary),
    (KeyCode::KeyB, ControllerButton::Secondary),
    (KeyCode::KeyC, ControllerButton::Squeeze),
    (KeyCode::KeyG, ControllerButton::Thumbstick),
];

/// Keyboard stand-in for one tracked controller. The pose rides along with
/// the camera at a fixed hand offset.
#[derive(Debug, Clone, Copy)]
pub struct EmulatedController {
    hand: Hand,
    bindings: &'static [(KeyCode, ControllerButton)],
    offset: Vec3,
}

impl EmulatedController {
    pub fn right() -> Self {
        Self {
            hand: Hand::Right,
            bindings: &RIGHT_BINDINGS,
            offset: Vec3::new(0.25, -0.3, -0.4),
        }
    }

    pub fn left() -> Self {
        Self {
            hand: Hand::Left,
            bindings: &LEFT_BINDINGS,
            offset: Vec3::new(-0.25, -0.3, -0.4),
        }
    }

    pub fn hand(&self) -> Hand {
        self.hand
    }

    pub fn clicked_buttons(&self, input: &InputState) -> Vec<ControllerButton> {
        self.bindings
            .iter()
            .filter(|(key, _)| input.was_clicked(*key))
            .map(|(_, button)| *button)
            .collect()
    }

    pub fn pose(&self, camera: &Camera) -> ControllerPose {
        let orientation = camera.orientation();
        ControllerPose {
            position: camera.position + orientation * self.offset,
            orientation,
        }
    }
}

#[cfg(test)]
mod tests {
    use vestibule_core::events::{ControllerButton, Hand};
    use winit::keyboard::KeyCode;

    use super::EmulatedController;
    use crate::camera::Camera;
    use crate::input::InputState;

    #[test]
    fn bindings_are_per_hand() {
        let mut input = InputState::default();
        input.press_key(KeyCode::KeyK);
        input.press_key(KeyCode::KeyF);

        let right = EmulatedController::right();
        let left = EmulatedController::left();
        assert_eq!(right.hand(), Hand::Right);
        assert_eq!(right.clicked_buttons(&input), vec![ControllerButton::Secondary]);
        assert_eq!(left.clicked_buttons(&input), vec![ControllerButton::Trigger]);
    }

    #[test]
    fn pose_sits_in_front_of_the_camera() {
        let camera = Camera::default();
        let pose = EmulatedController::right().pose(&camera);
        assert!(pose.position.z < camera.position.z);
        assert!(pose.position.x > camera.position.x);
        assert!(pose.position.y < camera.position.y);
    }
}
