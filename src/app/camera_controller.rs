use glam::FloatExt;
use winit::keyboard::KeyCode;
use crate::app::input_state::InputState;
use crate::renderer::camera::Camera;
use crate::renderer::util::{calculate_direction, calculate_pitch, calculate_yaw};

/// Orbits the camera around its pivot. A/D spin it horizontally, W/S tilt it, the wheel zooms.
pub struct CameraController {
    camera: Camera,

    rotation_speed: f32,
    yaw: f32,
    pitch: f32,
    rotation_max_angle_y: f32,

    zoom_sensitivity: f32,
    zoom_smoothing_speed: f32,
    zoom_desired_distance: f32,
    zoom_current_distance: f32,
}

impl CameraController {
    pub fn new(camera: Camera) -> Self {
        let pivot_to_eye = camera.get_position() - camera.get_pivot();
        let zoom_current_distance = pivot_to_eye.length();
        Self {
            camera,

            rotation_speed: 1.5,
            yaw: calculate_yaw(pivot_to_eye),
            pitch: calculate_pitch(pivot_to_eye),
            rotation_max_angle_y: 80.0_f32.to_radians(),

            zoom_sensitivity: 2.0,
            zoom_smoothing_speed: 4.0,
            zoom_desired_distance: zoom_current_distance,
            zoom_current_distance,
        }
    }

    pub fn get_camera(&self) -> &Camera {
        &self.camera
    }

    pub fn process_input(&mut self, input_state: &InputState, delta_time: f32) {
        let horizontal = input_state.axis(KeyCode::KeyA, KeyCode::KeyD);
        let vertical = input_state.axis(KeyCode::KeyS, KeyCode::KeyW);

        self.yaw += horizontal * self.rotation_speed * delta_time;
        self.pitch = (self.pitch + vertical * self.rotation_speed * delta_time)
            .clamp(-self.rotation_max_angle_y, self.rotation_max_angle_y);

        self.set_desired_zoom_distance(input_state.mouse_wheel_delta_y * self.zoom_sensitivity);
        self.update_zoom_lerp(delta_time);

        let pivot_to_eye = calculate_direction(self.pitch, self.yaw) * self.zoom_current_distance;
        self.camera.set_position(self.camera.get_pivot() + pivot_to_eye);
    }

    fn set_desired_zoom_distance(&mut self, delta: f32) {
        if delta == 0.0 {
            return;
        }

        let cam = &self.camera;
        // Scale delta by the current distance to make zooming speed independent of distance
        let delta = delta * self.zoom_current_distance * 0.1;
        self.zoom_desired_distance = (self.zoom_current_distance - delta)
            .max(cam.get_near() + 0.1)
            .min(cam.get_far() - 0.1);
    }

    fn update_zoom_lerp(&mut self, delta_time: f32) {
        let t = 1.0 - (-self.zoom_smoothing_speed * delta_time).exp();
        self.zoom_current_distance = self.zoom_current_distance.lerp(
            self.zoom_desired_distance,
            t,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn idle_input_keeps_the_camera_in_place() {
        let mut controller = CameraController::new(Camera::new());
        controller.process_input(&InputState::default(), 0.016);
        let position = controller.get_camera().get_position();
        assert!(position.distance(Vec3::new(0.0, 6.0, 10.0)) < 1e-4);
    }

    #[test]
    fn zoom_is_clamped_to_the_depth_range() {
        let mut controller = CameraController::new(Camera::new());
        for _ in 0..200 {
            controller.set_desired_zoom_distance(-10.0);
            controller.update_zoom_lerp(1.0);
        }
        assert!(controller.zoom_current_distance < 200.0);

        for _ in 0..200 {
            controller.set_desired_zoom_distance(10.0);
            controller.update_zoom_lerp(1.0);
        }
        assert!(controller.zoom_current_distance > 0.1);
    }

    #[test]
    fn pitch_never_passes_the_pole() {
        let mut controller = CameraController::new(Camera::new());
        let mut input = InputState::default();
        input.press(KeyCode::KeyW);
        for _ in 0..100 {
            controller.process_input(&input, 0.1);
        }
        assert!((controller.pitch - 80.0_f32.to_radians()).abs() < 1e-6);
        let eye = controller.get_camera().get_position().normalize();
        assert!(eye.y < 1.0);
    }
}
