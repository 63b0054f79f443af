use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};

/// Camera matrices written to each frame's uniform buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct GpuCameraData {
    pub view: Mat4,
    pub proj: Mat4,
    // proj * view, saves the multiply per vertex
    pub viewproj: Mat4,
}

/// Scene-wide lighting parameters, one padded slot per frame in a shared dynamic uniform buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct GpuSceneData {
    pub fog_color: Vec4,
    // x: min, y: max, zw: unused
    pub fog_distances: Vec4,
    pub ambient_color: Vec4,
    // w is sun power
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

/// Data unique to each object passed as elements into a storage buffer
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct GpuObjectData {
    pub model: Mat4,
}

/// Per-draw push constant block for the mesh pipelines
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub data: Vec4,
    pub render_matrix: Mat4,
}

/// Effect parameters for the background compute shaders
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct ComputePushConstants {
    pub data1: Vec4,
    pub data2: Vec4,
    pub data3: Vec4,
    pub data4: Vec4,
}

impl GpuSceneData {
    /// Ambient colour cycles slowly with the frame counter
    pub fn animated(frame_number: u64) -> Self {
        let framed = frame_number as f32 / 120.0;
        Self {
            ambient_color: Vec4::new(framed.sin(), 0.0, framed.cos(), 1.0),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_constants_fit_the_guaranteed_minimum() {
        // Vulkan guarantees at least 128 bytes of push constants
        assert!(size_of::<MeshPushConstants>() <= 128);
        assert!(size_of::<ComputePushConstants>() <= 128);
    }

    #[test]
    fn gpu_layouts_have_no_padding() {
        assert_eq!(size_of::<GpuCameraData>(), 3 * 64);
        assert_eq!(size_of::<GpuSceneData>(), 5 * 16);
        assert_eq!(size_of::<GpuObjectData>(), 64);
        assert_eq!(size_of::<MeshPushConstants>(), 16 + 64);
    }

    #[test]
    fn scene_ambient_starts_blue() {
        let scene = GpuSceneData::animated(0);
        assert_eq!(scene.ambient_color, Vec4::new(0.0, 0.0, 1.0, 1.0));
    }
}
