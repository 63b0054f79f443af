use std::path::PathBuf;

/// Contains configuration options for the renderer like the resolution, vsync, and other settings
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub vsync: bool,
    /// Enables the Khronos validation layer and the debug messenger when available
    pub validation: bool,
    pub window_extent: (u32, u32),
    /// Capacity of each frame's object buffer
    pub max_objects: usize,
    pub shader_dir: PathBuf,
    pub asset_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        Self {
            vsync: true,
            validation: cfg!(debug_assertions),
            window_extent: (1700, 900),
            max_objects: 10_000,
            shader_dir: root.join("shaders-built"),
            asset_dir: root.join("assets"),
        }
    }
}
