use glam::Vec2;
use rustc_hash::FxHashSet;
use winit::keyboard::KeyCode;

#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: FxHashSet<KeyCode>,
    /// Keys that went down since the last `clear_frame`, ignoring repeats.
    clicked_keys: FxHashSet<KeyCode>,
    pub mouse_delta: Vec2,
    pub look_drag: bool,
}

impl InputState {
    pub fn press_key(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.clicked_keys.insert(key);
        }
    }

    pub fn release_key(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn was_clicked(&self, key: KeyCode) -> bool {
        self.clicked_keys.contains(&key)
    }

    pub fn add_mouse_delta(&mut self, delta: Vec2) {
        if self.look_drag {
            self.mouse_delta += delta;
        }
    }

    pub fn clear_frame(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.clicked_keys.clear();
    }

    pub fn release_all(&mut self) {
        self.pressed_keys.clear();
        self.clicked_keys.clear();
        self.look_drag = false;
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;
    use winit::keyboard::KeyCode;

    use super::InputState;

    #[test]
    fn held_keys_click_once() {
        let mut input = InputState::default();
        input.press_key(KeyCode::Space);
        assert!(input.was_clicked(KeyCode::Space));

        input.clear_frame();
        input.press_key(KeyCode::Space);
        assert!(input.is_pressed(KeyCode::Space));
        assert!(!input.was_clicked(KeyCode::Space));

        input.release_key(KeyCode::Space);
        input.press_key(KeyCode::Space);
        assert!(input.was_clicked(KeyCode::Space));
    }

    #[test]
    fn mouse_motion_only_counts_while_dragging() {
        let mut input = InputState::default();
        input.add_mouse_delta(Vec2::new(4.0, 2.0));
        assert_eq!(input.mouse_delta, Vec2::ZERO);

        input.look_drag = true;
        input.add_mouse_delta(Vec2::new(4.0, 2.0));
        assert_eq!(input.mouse_delta, Vec2::new(4.0, 2.0));
    }
}
