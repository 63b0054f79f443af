use ash::vk;
use color_eyre::Result;

/// What an overlay needs from the renderer to create its own pipelines
#[derive(Debug, Clone, Copy)]
pub struct OverlayInitInfo {
    pub descriptor_pool: vk::DescriptorPool,
    pub color_format: vk::Format,
    pub image_count: u32,
}

/// A UI layer drawn on top of the blitted scene, straight into the swapchain image.
///
/// `record` is called inside a dynamic rendering scope that targets `target_view`
/// in COLOR_ATTACHMENT_OPTIMAL with its contents loaded.
pub trait UiOverlay {
    fn init(&mut self, _info: &OverlayInitInfo) -> Result<()> {
        Ok(())
    }

    /// Once per loop iteration, before the application declares its UI
    fn begin_frame(&mut self);

    fn record(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        target_view: vk::ImageView,
        extent: vk::Extent2D,
    ) -> Result<()>;
}

/// Draws nothing
#[derive(Debug, Default)]
pub struct NullOverlay;

impl UiOverlay for NullOverlay {
    fn begin_frame(&mut self) {}

    fn record(
        &mut self,
        _device: &ash::Device,
        _cmd: vk::CommandBuffer,
        _target_view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> Result<()> {
        Ok(())
    }
}
