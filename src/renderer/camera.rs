use glam::{Mat4, Vec3};
use crate::renderer::shader_data::GpuCameraData;

/// Perspective camera that always looks at its pivot
pub struct Camera {
    position: Vec3,
    forward: Vec3,
    up: Vec3,
    right: Vec3,
    world_up: Vec3,
    fov_y_deg: f32,
    near: f32,
    far: f32,
    pivot: Vec3,
}

impl Camera {
    const DEFAULT_FOV_Y_DEG: f32 = 70.0;

    pub fn new() -> Self {
        let mut camera = Self {
            position: Vec3::new(0.0, 6.0, 10.0),
            forward: Vec3::NEG_Z,
            up: Vec3::Y,
            right: Vec3::X,
            world_up: Vec3::Y,
            fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            near: 0.1,
            far: 200.0,
            pivot: Vec3::ZERO,
        };
        camera.look_at(Vec3::ZERO);
        camera
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.look_at(self.pivot);
    }

    pub fn look_at(&mut self, target: Vec3) {
        if target == self.position {
            return;
        }
        self.pivot = target;
        self.forward = (target - self.position).normalize();
        self.right = self.forward.cross(self.world_up).normalize();
        self.up = self.right.cross(self.forward).normalize();
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward, self.up)
    }

    /// Vulkan clip space has Y pointing down, so the projection flips it
    pub fn projection_matrix(&self, aspect_ratio: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            aspect_ratio,
            self.near,
            self.far,
        );
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn gpu_data(&self, aspect_ratio: f32) -> GpuCameraData {
        let view = self.view_matrix();
        let proj = self.projection_matrix(aspect_ratio);
        GpuCameraData {
            view,
            proj,
            viewproj: proj * view,
        }
    }

    pub fn get_position(&self) -> Vec3 {
        self.position
    }

    pub fn get_pivot(&self) -> Vec3 {
        self.pivot
    }

    pub fn get_near(&self) -> f32 {
        self.near
    }

    pub fn get_far(&self) -> f32 {
        self.far
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn starts_above_and_behind_the_origin() {
        let camera = Camera::new();
        assert_eq!(camera.get_position(), Vec3::new(0.0, 6.0, 10.0));
        // The pivot lands in the middle of the screen
        let clip = camera.gpu_data(16.0 / 9.0).viewproj * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert!((clip.x / clip.w).abs() < 1e-5);
        assert!((clip.y / clip.w).abs() < 1e-5);
    }

    #[test]
    fn projection_flips_y() {
        let camera = Camera::new();
        let unflipped = Mat4::perspective_rh(70f32.to_radians(), 1.0, 0.1, 200.0);
        let proj = camera.projection_matrix(1.0);
        assert_eq!(proj.y_axis.y, -unflipped.y_axis.y);
        assert_eq!(proj.x_axis.x, unflipped.x_axis.x);
    }

    #[test]
    fn viewproj_is_proj_times_view() {
        let camera = Camera::new();
        let data = camera.gpu_data(2.0);
        assert_eq!(data.viewproj, data.proj * data.view);
    }
}
