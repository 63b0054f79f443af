use std::collections::HashSet;
use winit::event::{ElementState, KeyEvent, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

#[derive(Default)]
pub struct InputState {
    keys_down: HashSet<KeyCode>,
    pub mouse_wheel_delta_y: f32,
}

impl InputState {
    pub fn process_window_events(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput {
                event: KeyEvent {
                    physical_key: PhysicalKey::Code(code),
                    state,
                    ..
                },
                ..
            } => {
                match state {
                    ElementState::Pressed => {
                        self.keys_down.insert(*code);
                    }
                    ElementState::Released => {
                        self.keys_down.remove(code);
                    }
                }
            }
            WindowEvent::MouseWheel {
                delta,
                ..
            } => {
                match delta {
                    MouseScrollDelta::LineDelta(_x, y) => {
                        self.mouse_wheel_delta_y = y.signum();
                    }
                    MouseScrollDelta::PixelDelta(pos) => {
                        self.mouse_wheel_delta_y = pos.y.signum() as f32;
                    }
                }
            }
            // Keys released while unfocused never report a release
            WindowEvent::Focused(false) => {
                self.keys_down.clear();
            }
            _ => {}
        }
    }

    pub fn is_down(&self, key: KeyCode) -> bool {
        self.keys_down.contains(&key)
    }

    /// -1, 0 or 1 depending on which of the two keys is held
    pub fn axis(&self, negative: KeyCode, positive: KeyCode) -> f32 {
        let mut value = 0.0;
        if self.is_down(negative) {
            value -= 1.0;
        }
        if self.is_down(positive) {
            value += 1.0;
        }
        value
    }

    /// Reset the per-frame input states for the next frame.
    pub fn reset_frame(&mut self) {
        self.mouse_wheel_delta_y = 0.0;
    }

    #[cfg(test)]
    pub(crate) fn press(&mut self, key: KeyCode) {
        self.keys_down.insert(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opposite_keys_cancel() {
        let mut input = InputState::default();
        assert_eq!(input.axis(KeyCode::KeyA, KeyCode::KeyD), 0.0);
        input.press(KeyCode::KeyD);
        assert_eq!(input.axis(KeyCode::KeyA, KeyCode::KeyD), 1.0);
        input.press(KeyCode::KeyA);
        assert_eq!(input.axis(KeyCode::KeyA, KeyCode::KeyD), 0.0);
    }

    #[test]
    fn losing_focus_releases_everything() {
        let mut input = InputState::default();
        input.press(KeyCode::KeyW);
        input.process_window_events(&WindowEvent::Focused(false));
        assert!(!input.is_down(KeyCode::KeyW));
    }
}
